use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use moka::future::Cache as MokaCache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{MintOptions, Token, TokenKind, TokenMinter};
use crate::error::TokenError;

type SharedMint = Shared<BoxFuture<'static, Result<Token, TokenError>>>;

struct InFlight {
    seq: u64,
    forced: bool,
    future: SharedMint,
}

/// Front door to the minting subsystem.
///
/// At most one mint per identifier runs at a time; concurrent callers await
/// the same shared result. Successful mints are cached for `ttl`.
#[derive(Clone)]
pub struct TokenManager {
    minter: Arc<dyn TokenMinter>,
    cache: MokaCache<String, Token>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
    /// Bumped by `invalidate`; mints started under an older epoch are not cached
    epoch: Arc<AtomicU64>,
    next_seq: Arc<AtomicU64>,
    mint_timeout: Duration,
}

impl TokenManager {
    pub fn new(minter: Arc<dyn TokenMinter>, mint_timeout: Duration, ttl: Duration) -> Self {
        let mut builder = MokaCache::builder().max_capacity(1024);
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl);
        }

        Self {
            minter,
            cache: builder.build(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            epoch: Arc::new(AtomicU64::new(0)),
            next_seq: Arc::new(AtomicU64::new(0)),
            mint_timeout,
        }
    }

    /// Returns a minted token, reusing a cached one unless `force_refresh` is set.
    pub async fn mint(&self, identifier: &str, options: MintOptions) -> Result<Token, TokenError> {
        if !options.force_refresh {
            if let Some(token) = self.cache.get(identifier).await {
                debug!(identifier, "Using cached token");
                return Ok(token);
            }
        }
        self.join_or_start(identifier, options).await
    }

    /// Mints a replacement for a token the server just rejected.
    pub async fn rotate(&self, identifier: &str, force_refresh: bool) -> Result<Token, TokenError> {
        self.cache.invalidate(identifier).await;
        self.join_or_start(identifier, MintOptions { force_refresh })
            .await
    }

    pub fn placeholder(&self, identifier: &str) -> Token {
        Token {
            value: self.minter.placeholder(identifier),
            kind: TokenKind::Placeholder,
            minted_for: identifier.to_string(),
        }
    }

    /// Drops every cached and in-flight token and resets the minting subsystem.
    pub async fn invalidate(&self) -> Result<(), TokenError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.in_flight.lock().clear();
        self.cache.invalidate_all();
        info!("Token caches invalidated");
        tokio::time::timeout(self.mint_timeout, self.minter.invalidate())
            .await
            .map_err(|_| TokenError::InvalidateTimeout(self.mint_timeout))?
    }

    fn join_or_start(&self, identifier: &str, options: MintOptions) -> SharedMint {
        let mut in_flight = self.in_flight.lock();

        let mut previous = None;
        if let Some(existing) = in_flight.get(identifier) {
            if existing.forced || !options.force_refresh {
                debug!(identifier, "Joining in-flight mint");
                return existing.future.clone();
            }
            // A forced request never settles for a running non-forced mint,
            // but it only starts once that one has finished.
            previous = Some(existing.future.clone());
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let task = self.mint_task(identifier.to_string(), options, seq);
        let future = match previous {
            Some(previous) => {
                debug!(identifier, "Queueing forced mint behind in-flight mint");
                async move {
                    let _ = previous.await;
                    task.await
                }
                .boxed()
                .shared()
            }
            None => task.boxed().shared(),
        };
        in_flight.insert(
            identifier.to_string(),
            InFlight {
                seq,
                forced: options.force_refresh,
                future: future.clone(),
            },
        );
        future
    }

    fn mint_task(
        &self,
        identifier: String,
        options: MintOptions,
        seq: u64,
    ) -> impl Future<Output = Result<Token, TokenError>> + Send + 'static {
        let minter = self.minter.clone();
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();
        let epoch = self.epoch.clone();
        let started_epoch = epoch.load(Ordering::SeqCst);
        let mint_timeout = self.mint_timeout;

        async move {
            debug!(%identifier, force_refresh = options.force_refresh, "Minting token");

            let result = match tokio::time::timeout(mint_timeout, minter.mint(&identifier, options)).await
            {
                Ok(Ok(value)) => Ok(Token {
                    value,
                    kind: TokenKind::Minted,
                    minted_for: identifier.clone(),
                }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TokenError::MintTimeout(mint_timeout)),
            };

            {
                let mut in_flight = in_flight.lock();
                if in_flight.get(&identifier).is_some_and(|f| f.seq == seq) {
                    in_flight.remove(&identifier);
                }
            }

            match &result {
                Ok(token) if epoch.load(Ordering::SeqCst) == started_epoch => {
                    cache.insert(identifier.clone(), token.clone()).await;
                    debug!(%identifier, "Token minted");
                }
                Ok(_) => debug!(%identifier, "Discarding token minted before invalidation"),
                Err(e) => warn!(%identifier, error = %e, "Token mint failed"),
            }

            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockMinter;

    fn manager(minter: Arc<MockMinter>) -> TokenManager {
        TokenManager::new(minter, Duration::from_secs(45), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_concurrent_mints_share_one_solve() {
        let minter = Arc::new(MockMinter::new().with_delay(Duration::from_millis(50)));
        let manager = manager(minter.clone());

        let (a, b) = tokio::join!(
            manager.mint("abc123", MintOptions::default()),
            manager.mint("abc123", MintOptions::default())
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(minter.mint_calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused_until_forced() {
        let minter = Arc::new(MockMinter::new());
        let manager = manager(minter.clone());

        let first = manager.mint("abc123", MintOptions::default()).await.unwrap();
        let second = manager.mint("abc123", MintOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(minter.mint_calls(), 1);

        let forced = manager
            .mint("abc123", MintOptions { force_refresh: true })
            .await
            .unwrap();
        assert_ne!(first.value, forced.value);
        assert_eq!(minter.mint_calls(), 2);
        assert_eq!(minter.force_flags(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_rotate_bypasses_cache() {
        let minter = Arc::new(MockMinter::new());
        let manager = manager(minter.clone());

        manager.mint("abc123", MintOptions::default()).await.unwrap();
        let rotated = manager.rotate("abc123", false).await.unwrap();
        assert!(rotated.is_minted());
        assert_eq!(minter.mint_calls(), 2);
    }

    #[tokio::test]
    async fn test_forced_rotation_waits_for_plain_mint() {
        let minter = Arc::new(MockMinter::new().with_delay(Duration::from_millis(50)));
        let manager = manager(minter.clone());

        let (plain, forced) = tokio::join!(manager.rotate("abc123", false), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.rotate("abc123", true).await
        });

        assert_ne!(plain.unwrap().value, forced.unwrap().value);
        assert_eq!(minter.force_flags(), vec![false, true]);
        assert_eq!(minter.max_concurrent_mints(), 1);
    }

    #[tokio::test]
    async fn test_forced_rotations_join_each_other() {
        let minter = Arc::new(MockMinter::new().with_delay(Duration::from_millis(50)));
        let manager = manager(minter.clone());

        let forced = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            manager.rotate("abc123", true).await
        };
        let (plain, first, second) =
            tokio::join!(manager.rotate("abc123", false), forced(), forced());

        assert!(plain.is_ok());
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(minter.mint_calls(), 2);
        assert_eq!(minter.max_concurrent_mints(), 1);
    }

    #[tokio::test]
    async fn test_mint_timeout() {
        let minter = Arc::new(MockMinter::new().with_delay(Duration::from_secs(5)));
        let manager = TokenManager::new(minter, Duration::from_millis(20), Duration::ZERO);

        let err = manager
            .mint("abc123", MintOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::MintTimeout(_)));
    }

    #[tokio::test]
    async fn test_failed_mint_is_not_cached() {
        let minter = Arc::new(MockMinter::new().failing(1));
        let manager = manager(minter.clone());

        assert!(manager.mint("abc123", MintOptions::default()).await.is_err());
        assert!(manager.mint("abc123", MintOptions::default()).await.is_ok());
        assert_eq!(minter.mint_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent_and_clears_cache() {
        let minter = Arc::new(MockMinter::new());
        let manager = manager(minter.clone());

        manager.mint("abc123", MintOptions::default()).await.unwrap();
        manager.invalidate().await.unwrap();
        manager.invalidate().await.unwrap();
        assert_eq!(minter.invalidate_calls(), 2);

        manager.mint("abc123", MintOptions::default()).await.unwrap();
        assert_eq!(minter.mint_calls(), 2);
    }

    #[tokio::test]
    async fn test_hanging_invalidate_times_out() {
        let minter = Arc::new(MockMinter::new().with_hanging_invalidate());
        let manager = TokenManager::new(minter.clone(), Duration::from_millis(20), Duration::ZERO);

        let err = manager.invalidate().await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidateTimeout(_)));
        assert_eq!(minter.invalidate_calls(), 1);
    }

    #[test]
    fn test_placeholder_kind() {
        let manager = manager(Arc::new(MockMinter::new()));
        let token = manager.placeholder("abc123");
        assert_eq!(token.kind, TokenKind::Placeholder);
        assert_eq!(token.minted_for, "abc123");
        assert!(!token.value.is_empty());
    }
}
