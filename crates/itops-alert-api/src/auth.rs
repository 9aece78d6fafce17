use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::Error;

type TokenFn = dyn Fn() -> Option<SecretString> + Send + Sync;

/// Supplies the `Authorization` header value for platform calls.
///
/// The closure is invoked on every request so a hot-reloaded token is
/// picked up without rebuilding clients.
#[derive(Clone)]
pub struct AuthProvider {
    token: Arc<TokenFn>,
}

impl AuthProvider {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Option<SecretString> + Send + Sync + 'static,
    {
        Self { token: Arc::new(f) }
    }

    /// A provider that always returns the same token.
    pub fn fixed(token: SecretString) -> Self {
        Self::new(move || Some(token.clone()))
    }

    /// A provider that never sends an `Authorization` header.
    pub fn anonymous() -> Self {
        Self::new(|| None)
    }

    /// Resolve the current header value. Empty tokens are treated as absent.
    pub(crate) fn header_value(&self) -> Result<Option<HeaderValue>, Error> {
        let Some(token) = (self.token)() else {
            return Ok(None);
        };
        let raw = token.expose_secret().trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let mut value =
            HeaderValue::from_str(raw).map_err(|e| Error::InvalidAuthorization(e.to_string()))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProvider").finish_non_exhaustive()
    }
}

/// Username/password pair for basic auth against the search index.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_token_is_sensitive() {
        let provider = AuthProvider::fixed(SecretString::from("Bearer abc"));
        let value = provider.header_value().unwrap().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn blank_token_is_absent() {
        let provider = AuthProvider::fixed(SecretString::from("   "));
        assert!(provider.header_value().unwrap().is_none());
        assert!(AuthProvider::anonymous().header_value().unwrap().is_none());
    }

    #[test]
    fn provider_is_read_on_every_call() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let provider = AuthProvider::new(move || {
            let n = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(SecretString::from(format!("token-{n}")))
        });
        assert_eq!(
            provider.header_value().unwrap().unwrap().to_str().unwrap(),
            "token-0"
        );
        assert_eq!(
            provider.header_value().unwrap().unwrap().to_str().unwrap(),
            "token-1"
        );
    }

    #[test]
    fn control_characters_are_rejected() {
        let provider = AuthProvider::fixed(SecretString::from("bad\ntoken"));
        assert!(matches!(
            provider.header_value(),
            Err(Error::InvalidAuthorization(_))
        ));
    }
}
