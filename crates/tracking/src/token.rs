//! Compact signed tracking tokens.
//!
//! A token is `base64url(header).base64url(payload).base64url(signature)`
//! where the payload is the JSON encoding of [`TokenClaims`] and the
//! signature is HMAC-SHA256 over the first two segments, keyed with the
//! server secret. Nothing needs to be stored to check an unrevoked,
//! unexpired token.

use std::{collections::BTreeMap, sync::Arc};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use time::Duration;

use crate::{Clock, Result, TrackingError};

pub const DEFAULT_TTL: Duration = Duration::days(14);

/// Upper bound for configured and requested token lifetimes.
pub const MAX_TTL_DAYS: i64 = 3650;

pub const NEWSLETTER_ID: &str = "newsletter_id";
pub const ARTICLE_ID: &str = "article_id";
pub const CLASS_ID: &str = "class_id";

/// Named fields carried opaquely inside a token.
pub type Context = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ctx: Context,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.ctx.get(key).and_then(|value| value.as_str())
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // expiry is judged against the injected clock by the verifier
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            default_ttl: DEFAULT_TTL,
            clock,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn encode(
        &self,
        subject: impl Into<String>,
        context: Context,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let now = self.clock.now_secs();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let Some(exp) = now.checked_add(ttl.whole_seconds()) else {
            crate::invalid!("token lifetime {ttl} is out of range");
        };

        let claims = TokenClaims {
            sub: subject.into(),
            ctx: context,
            iat: now,
            exp,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TrackingError::Encoding(err.to_string()))
    }

    /// Reads the payload without checking the signature.
    pub fn decode(token: &str) -> Result<TokenClaims> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TrackingError::Malformed);
        };

        let header = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| TrackingError::Malformed)?;
        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&header)
            .map_err(|_| TrackingError::Malformed)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TrackingError::Malformed)?;

        serde_json::from_slice(&payload).map_err(|_| TrackingError::Malformed)
    }

    /// Structural check followed by a constant-time signature comparison.
    pub fn verify_signature(&self, token: &str) -> Result<TokenClaims> {
        Self::decode(token)?;

        match jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    Err(TrackingError::Malformed)
                }
                _ => Err(TrackingError::SignatureInvalid),
            },
        }
    }
}

/// One-way hash of the full token string, hex encoded.
pub fn token_hash(token: &str) -> String {
    Sha3_256::digest(token.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Short prefix of [`token_hash`], safe to put in logs.
pub fn fingerprint(token: &str) -> String {
    token_hash(token)[..12].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            "unit-test-secret-with-at-least-32-chars",
            Arc::new(ManualClock::at_secs(1_700_000_000)),
        )
    }

    #[test]
    fn encode_produces_three_segments_with_default_lifetime() {
        let token = codec().encode("user-1", Context::new(), None).unwrap();

        assert_eq!(token.split('.').count(), 3);

        let claims = TokenCodec::decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp - claims.iat, 14 * 24 * 60 * 60);
    }

    #[test]
    fn decode_rejects_wrong_segment_count() {
        assert!(matches!(
            TokenCodec::decode("only.two"),
            Err(TrackingError::Malformed)
        ));
        assert!(matches!(
            TokenCodec::decode("a.b.c.d"),
            Err(TrackingError::Malformed)
        ));
    }

    #[test]
    fn decode_rejects_non_json_payload() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        let token = format!("{header}.{payload}.c2ln");

        assert!(matches!(
            TokenCodec::decode(&token),
            Err(TrackingError::Malformed)
        ));
    }

    #[test]
    fn signature_is_deterministic() {
        let codec = codec();
        let mut ctx = Context::new();
        ctx.insert(NEWSLETTER_ID.to_owned(), "n1".into());

        let first = codec.encode("user-1", ctx.clone(), None).unwrap();
        let second = codec.encode("user-1", ctx, None).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn wrong_secret_is_signature_invalid() {
        let token = codec().encode("user-1", Context::new(), None).unwrap();
        let other = TokenCodec::new(
            "another-secret-with-at-least-32-characters",
            Arc::new(ManualClock::at_secs(1_700_000_000)),
        );

        assert!(matches!(
            other.verify_signature(&token),
            Err(TrackingError::SignatureInvalid)
        ));
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let hash = token_hash("a.b.c");

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, token_hash("a.b.c"));
        assert_ne!(hash, token_hash("a.b.d"));
        assert_eq!(fingerprint("a.b.c"), hash[..12]);
    }
}
