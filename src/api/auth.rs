//! API Authentication
//!
//! Bearer-token credentials with a TTL-bounded cache. The token itself comes
//! from a [`TokenProvider`]: a literal value from configuration or a secret
//! file that is re-read whenever the cache expires.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token supplied up front
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// A token read from a secret file
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenProvider for FileToken {
    async fn token(&self) -> Result<String> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read token file {:?}", self.path))?;
        let token = content.trim();
        if token.is_empty() {
            anyhow::bail!("Token file {:?} is empty", self.path);
        }
        Ok(token.to_string())
    }
}

/// Credentials holder with token caching
#[derive(Clone)]
pub struct Credentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Shorthand for credentials backed by a literal token
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticToken::new(token)))
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token()
            .await
            .context("Failed to get access token")?;

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider(AtomicUsize);

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn token(&self) -> Result<String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{}", n))
        }
    }

    #[test]
    fn test_static_token() {
        let creds = Credentials::from_token("abc");
        let token = tokio_test::block_on(creds.get_token()).unwrap();
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn test_token_is_cached_until_refresh() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let creds = Credentials::new(provider.clone());

        assert_eq!(creds.get_token().await.unwrap(), "token-0");
        assert_eq!(creds.get_token().await.unwrap(), "token-0");
        assert_eq!(creds.refresh_token().await.unwrap(), "token-1");
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_file_token_trims_whitespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let provider = FileToken::new(file.path());
        assert_eq!(provider.token().await.unwrap(), "secret-token");
    }

    #[tokio::test]
    async fn test_file_token_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let provider = FileToken::new(file.path());
        assert!(provider.token().await.is_err());
    }
}
