//! HS256 JWT verifier
//!
//! Validates signature, issuer, audience and expiry. Profile claims are read
//! either bare (`email`) or under a namespace (`https://claims.example.com/email`),
//! bare names first.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{AuthError, TokenClaims, TokenVerifier};
use crate::config::JwtSettings;

/// Clock skew leeway for expiry validation
const LEEWAY_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    claim_namespace: Option<String>,
}

impl JwtVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = LEEWAY_SECS;

        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            claim_namespace: settings
                .claim_namespace
                .as_ref()
                .map(|ns| ns.trim_end_matches('/').to_string()),
        }
    }

    fn claim<'a>(&self, extra: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
        extra.get(name).filter(|v| !v.is_null()).or_else(|| {
            self.claim_namespace
                .as_ref()
                .and_then(|ns| extra.get(&format!("{}/{}", ns, name)))
                .filter(|v| !v.is_null())
        })
    }

    fn string_claim(&self, extra: &Map<String, Value>, name: &str) -> Option<String> {
        self.claim(extra, name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let data = decode::<RawClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let raw = data.claims;

        let subject = raw
            .sub
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(TokenClaims {
            subject,
            email: self.string_claim(&raw.extra, "email"),
            given_name: self.string_claim(&raw.extra, "given_name"),
            family_name: self.string_claim(&raw.extra, "family_name"),
            email_verified: self.claim(&raw.extra, "email_verified").and_then(Value::as_bool),
        })
    }
}
