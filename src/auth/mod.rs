//! Authentication module
//!
//! Bearer token verification behind a small trait so the gateway can be
//! exercised with locally minted tokens.

mod jwt;

pub use jwt::JwtVerifier;

use async_trait::async_trait;
use serde::Serialize;

/// Claims the gateway relies on after a token has been verified
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    /// Stable external principal id (`sub`)
    pub subject: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email_verified: Option<bool>,
}

impl TokenClaims {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// "Given Family", or whichever half is present
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Token verification failures. All of them end in a 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Token rejected: {0}")]
    InvalidToken(String),

    #[error("Token has no subject")]
    MissingSubject,
}

/// Verifies a bearer token and extracts its claims
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_token(Some("bearer  abc ")).unwrap(), "abc");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
        assert!(matches!(
            bearer_token(Some("Basic dXNlcg==")),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(bearer_token(Some("Bearer")), Err(AuthError::MalformedHeader)));
    }

    #[test]
    fn test_display_name() {
        let mut claims = TokenClaims::new("auth0|1");
        assert_eq!(claims.display_name(), None);
        claims.given_name = Some("Ana".into());
        assert_eq!(claims.display_name().as_deref(), Some("Ana"));
        claims.family_name = Some("Gómez".into());
        assert_eq!(claims.display_name().as_deref(), Some("Ana Gómez"));
    }
}
