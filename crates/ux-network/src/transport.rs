//! TCP transport: listening, dialing, and canonical addresses.

use crate::{NetworkError, NetworkResult};
use futures::SinkExt;
use futures::StreamExt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, error, info};
use ux_wire::{EnvelopeCodec, Message, WireError};

/// Canonical byte form of an IP address: the 16 octets of its
/// IPv6-mapped representation. Stable across runs; the identity key of
/// the address book is built from it.
pub fn canonical_address(ip: IpAddr) -> Vec<u8> {
    let v6: Ipv6Addr = match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    v6.octets().to_vec()
}

/// Parse a host string into canonical address bytes.
pub fn str_to_address(s: &str) -> NetworkResult<Vec<u8>> {
    let ip: IpAddr = s
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(s.to_string()))?;
    Ok(canonical_address(ip))
}

/// Render canonical address bytes back into an IP address string.
pub fn address_to_string(bytes: &[u8]) -> NetworkResult<String> {
    let octets: [u8; 16] = bytes
        .try_into()
        .map_err(|_| NetworkError::InvalidAddress(hex::encode(bytes)))?;
    let v6 = Ipv6Addr::from(octets);
    match v6.to_ipv4_mapped() {
        Some(v4) => Ok(v4.to_string()),
        None => Ok(v6.to_string()),
    }
}

/// Rebuild a socket address from canonical bytes and a port.
pub fn socket_addr_of(bytes: &[u8], port: u16) -> NetworkResult<SocketAddr> {
    let octets: [u8; 16] = bytes
        .try_into()
        .map_err(|_| NetworkError::InvalidAddress(hex::encode(bytes)))?;
    let v6 = Ipv6Addr::from(octets);
    let ip = match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    };
    Ok(SocketAddr::new(ip, port))
}

/// Codec wrapper that counts bytes moved in each direction, feeding the
/// per-peer byte budget.
///
/// Recoverable payload failures (unknown tag, bad payload) are yielded
/// as `Err` items so the stream keeps running; the framed stream would
/// fuse on a decoder error, and those failures must only cost the peer a
/// misbehavior point, not the connection. Framing-level failures (bad
/// magic, oversized frame, I/O) stay stream errors and end the
/// connection.
pub(crate) struct CountingCodec {
    inner: EnvelopeCodec,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
}

impl Decoder for CountingCodec {
    type Item = Result<Message, WireError>;
    type Error = WireError;

    fn decode(
        &mut self,
        src: &mut bytes::BytesMut,
    ) -> Result<Option<Result<Message, WireError>>, WireError> {
        let before = src.len();
        let result = self.inner.decode(src);
        let consumed = (before - src.len()) as u64;
        if consumed > 0 {
            self.bytes_in.fetch_add(consumed, Ordering::Relaxed);
        }
        match result {
            Ok(Some(message)) => Ok(Some(Ok(message))),
            Ok(None) => Ok(None),
            // The frame was fully consumed; only its payload is bad
            Err(e @ (WireError::UnknownMessageType(_) | WireError::Decode(_))) => {
                Ok(Some(Err(e)))
            }
            Err(fatal) => Err(fatal),
        }
    }
}

impl Encoder<Message> for CountingCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut bytes::BytesMut) -> Result<(), WireError> {
        let before = dst.len();
        self.inner.encode(item, dst)?;
        self.bytes_out
            .fetch_add((dst.len() - before) as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// A framed P2P connection.
pub struct Connection {
    framed: Framed<TcpStream, CountingCodec>,
    peer_addr: SocketAddr,
    bytes_in: Arc<AtomicU64>,
    bytes_out: Arc<AtomicU64>,
}

impl Connection {
    fn new(stream: TcpStream, peer_addr: SocketAddr, magic: u32) -> Self {
        let bytes_in = Arc::new(AtomicU64::new(0));
        let bytes_out = Arc::new(AtomicU64::new(0));
        let codec = CountingCodec {
            inner: EnvelopeCodec::new(magic),
            bytes_in: Arc::clone(&bytes_in),
            bytes_out: Arc::clone(&bytes_out),
        };
        Self {
            framed: Framed::new(stream, codec),
            peer_addr,
            bytes_in,
            bytes_out,
        }
    }

    /// The remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Shared byte counters `(in, out)` surviving the connection split.
    pub fn byte_counters(&self) -> (Arc<AtomicU64>, Arc<AtomicU64>) {
        (Arc::clone(&self.bytes_in), Arc::clone(&self.bytes_out))
    }

    /// Send a single frame.
    pub async fn send(&mut self, message: Message) -> NetworkResult<()> {
        self.framed.send(message).await?;
        Ok(())
    }

    /// Receive the next frame.
    pub async fn next(&mut self) -> Option<Result<Message, WireError>> {
        match self.framed.next().await {
            Some(Ok(item)) => Some(item),
            Some(Err(e)) => Some(Err(e)),
            None => None,
        }
    }

    pub(crate) fn split(
        self,
    ) -> (
        futures::stream::SplitSink<Framed<TcpStream, CountingCodec>, Message>,
        futures::stream::SplitStream<Framed<TcpStream, CountingCodec>>,
    ) {
        self.framed.split()
    }
}

pub(crate) type ConnectionSink =
    futures::stream::SplitSink<Framed<TcpStream, CountingCodec>, Message>;
pub(crate) type ConnectionStream = futures::stream::SplitStream<Framed<TcpStream, CountingCodec>>;

/// Byte-level transport: listens for inbound connections and dials
/// outbound ones.
#[derive(Debug, Clone)]
pub struct Transport {
    magic: u32,
    connect_timeout: Duration,
}

impl Transport {
    /// Create a transport for the given network magic.
    pub fn new(magic: u32, connect_timeout: Duration) -> Self {
        Self {
            magic,
            connect_timeout,
        }
    }

    /// Begin accepting connections on the bind address.
    ///
    /// Each accepted connection is emitted to the subscriber channel.
    /// Returns the actual local address, which differs from `bind` when
    /// an ephemeral port was requested.
    pub async fn listen(
        &self,
        bind: SocketAddr,
        subscriber: mpsc::Sender<Connection>,
    ) -> NetworkResult<SocketAddr> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Listening for peers");

        let magic = self.magic;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "Incoming connection");
                        let connection = Connection::new(stream, addr, magic);
                        if subscriber.send(connection).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Accept error");
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Dial a remote peer.
    ///
    /// Fails with [`NetworkError::Unreachable`] when the TCP handshake
    /// does not complete within the connection timeout.
    pub async fn connect(&self, addr: SocketAddr) -> NetworkResult<Connection> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Unreachable(format!("{}: connect timeout", addr)))?
            .map_err(|e| NetworkError::Unreachable(format!("{}: {}", addr, e)))?;
        debug!(addr = %addr, "Connected to peer");
        Ok(Connection::new(stream, addr, self.magic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NETWORK_MAGIC;

    #[test]
    fn test_canonical_address_stable() {
        let a = str_to_address("10.0.0.1").unwrap();
        let b = str_to_address("10.0.0.1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        assert_eq!(address_to_string(&a).unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_ipv6_roundtrip() {
        let a = str_to_address("2001:db8::1").unwrap();
        assert_eq!(address_to_string(&a).unwrap(), "2001:db8::1");
        let sock = socket_addr_of(&a, 8223).unwrap();
        assert_eq!(sock.port(), 8223);
    }

    #[test]
    fn test_bad_address_rejected() {
        assert!(str_to_address("not-an-ip").is_err());
        assert!(address_to_string(&[1, 2, 3]).is_err());
    }

    #[tokio::test]
    async fn test_listen_and_connect() {
        let transport = Transport::new(NETWORK_MAGIC, Duration::from_secs(1));
        let (tx, mut rx) = mpsc::channel(4);
        let addr = transport
            .listen("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let mut outbound = transport.connect(addr).await.unwrap();
        let mut inbound = rx.recv().await.unwrap();

        outbound.send(Message::Ping).await.unwrap();
        let received = inbound.next().await.unwrap().unwrap();
        assert_eq!(received, Message::Ping);

        // Byte counters saw the frame in both directions
        assert!(outbound.bytes_out.load(Ordering::Relaxed) > 0);
        assert!(inbound.bytes_in.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let transport = Transport::new(NETWORK_MAGIC, Duration::from_millis(200));
        // Reserved TEST-NET address; nothing listens there
        let result = transport.connect("192.0.2.1:8223".parse().unwrap()).await;
        assert!(matches!(result, Err(NetworkError::Unreachable(_))));
    }
}
