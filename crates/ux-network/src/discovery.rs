//! Peer discovery: DNS-assisted bootstrap.
//!
//! Seeds are resolved in parallel under one query timeout; individual
//! resolver failures are logged and dropped, so a partial result is
//! always usable.

use crate::{NetworkError, NetworkResult};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{info, warn};

/// Name resolution seam. The production implementation queries DNS;
/// tests inject stubs.
pub trait Resolver: Send + Sync {
    /// Resolve a seed name (host or host:port) to socket addresses.
    fn resolve(&self, name: &str) -> BoxFuture<'static, NetworkResult<Vec<SocketAddr>>>;
}

/// DNS resolver backed by the system lookup on a blocking task.
#[derive(Debug, Default, Clone)]
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve(&self, name: &str) -> BoxFuture<'static, NetworkResult<Vec<SocketAddr>>> {
        let name = name.to_string();
        async move {
            let looked_up = tokio::task::spawn_blocking(move || {
                name.to_socket_addrs().map(|iter| iter.collect::<Vec<_>>())
            })
            .await
            .map_err(|e| NetworkError::Resolve(format!("join error: {}", e)))?;
            looked_up.map_err(|e| NetworkError::Resolve(e.to_string()))
        }
        .boxed()
    }
}

/// Resolve every seed in parallel, bounding the whole pass by the query
/// timeout. Failed or timed-out seeds are logged and skipped; the
/// surviving addresses are returned deduplicated.
pub async fn resolve_seeds(
    resolver: &dyn Resolver,
    seeds: &[String],
    query_timeout: Duration,
) -> Vec<SocketAddr> {
    let lookups = seeds.iter().map(|seed| {
        let future = resolver.resolve(seed);
        let seed = seed.clone();
        async move {
            match tokio::time::timeout(query_timeout, future).await {
                Ok(Ok(addrs)) => {
                    info!(seed = %seed, count = addrs.len(), "Resolved seed");
                    addrs
                }
                Ok(Err(e)) => {
                    warn!(seed = %seed, error = %e, "Seed resolution failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(seed = %seed, "Seed resolution timed out");
                    Vec::new()
                }
            }
        }
    });

    let mut addrs: Vec<SocketAddr> = join_all(lookups).await.into_iter().flatten().collect();
    addrs.sort();
    addrs.dedup();
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubResolver;

    impl Resolver for StubResolver {
        fn resolve(&self, name: &str) -> BoxFuture<'static, NetworkResult<Vec<SocketAddr>>> {
            let name = name.to_string();
            async move {
                match name.as_str() {
                    "good.seed" => Ok(vec!["10.0.0.1:8223".parse().unwrap()]),
                    "slow.seed" => {
                        // Never resolves
                        futures::future::pending::<()>().await;
                        unreachable!()
                    }
                    _ => Err(NetworkError::Resolve("no such host".to_string())),
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_partial_results_kept() {
        let seeds = vec![
            "good.seed".to_string(),
            "slow.seed".to_string(),
            "bad.seed".to_string(),
        ];
        let addrs = resolve_seeds(&StubResolver, &seeds, Duration::from_millis(100)).await;
        assert_eq!(addrs, vec!["10.0.0.1:8223".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_duplicates_removed() {
        let seeds = vec!["good.seed".to_string(), "good.seed".to_string()];
        let addrs = resolve_seeds(&StubResolver, &seeds, Duration::from_millis(100)).await;
        assert_eq!(addrs.len(), 1);
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty() {
        let seeds = vec!["bad.seed".to_string()];
        let addrs = resolve_seeds(&StubResolver, &seeds, Duration::from_millis(100)).await;
        assert!(addrs.is_empty());
    }
}
