// Token acquisition boundary.
//
// The Miele API uses OAuth2 bearer tokens with short lifetimes. This crate
// never manages the credential lifecycle itself -- the caller supplies a
// [`TokenProvider`] that yields a currently valid token on demand, and the
// client asks for a fresh one before every request and every stream connect.

use futures_util::future::BoxFuture;
use secrecy::SecretString;

use crate::error::Error;

/// Caller-supplied capability producing a current bearer token on demand.
///
/// Implementations typically wrap an OAuth2 refresh flow. They must fail
/// with [`Error::Authentication`] when no valid token can be produced;
/// the event listener treats that as a recoverable error and retries,
/// while single-shot calls propagate it to the caller.
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid access token.
    fn access_token(&self) -> BoxFuture<'_, Result<SecretString, Error>>;
}

/// A [`TokenProvider`] that always returns the same token.
///
/// Suitable for short-lived tools and tests. Long-running applications
/// should implement [`TokenProvider`] over a real refresh flow instead,
/// since Miele access tokens expire.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> BoxFuture<'_, Result<SecretString, Error>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[tokio::test]
    async fn static_provider_returns_token() {
        let provider = StaticTokenProvider::new("abc123");
        let token = provider.access_token().await.unwrap();
        assert_eq!(token.expose_secret(), "abc123");
    }
}
