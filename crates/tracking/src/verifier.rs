use std::sync::Arc;

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::{
    Clock, Context, Result, RevokedToken, TokenClaims, TokenCodec, TrackingError,
    storage::RevocationStorage,
    token::{fingerprint, token_hash},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Malformed,
    SignatureInvalid,
    TokenExpired,
    TokenRevoked,
    StorageUnavailable,
}

impl From<&TrackingError> for RejectReason {
    fn from(value: &TrackingError) -> Self {
        match value {
            TrackingError::SignatureInvalid => RejectReason::SignatureInvalid,
            TrackingError::TokenExpired => RejectReason::TokenExpired,
            TrackingError::TokenRevoked => RejectReason::TokenRevoked,
            TrackingError::Storage(_) => RejectReason::StorageUnavailable,
            _ => RejectReason::Malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Valid {
        subject: String,
        context: Context,
        expires_at: i64,
    },
    Invalid {
        reason: RejectReason,
    },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid { .. })
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verification::Valid { .. } => None,
            Verification::Invalid { reason } => Some(*reason),
        }
    }
}

pub struct TokenVerifier {
    codec: Arc<TokenCodec>,
    revocations: Arc<dyn RevocationStorage>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(
        codec: Arc<TokenCodec>,
        revocations: Arc<dyn RevocationStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            revocations,
            clock,
        }
    }

    /// Never fails: every rejection is folded into [`Verification::Invalid`].
    pub async fn verify(&self, token: &str) -> Verification {
        match self.check(token).await {
            Ok(claims) => Verification::Valid {
                subject: claims.sub,
                context: claims.ctx,
                expires_at: claims.exp,
            },
            Err(err) => {
                let reason = RejectReason::from(&err);
                match reason {
                    RejectReason::SignatureInvalid => {
                        tracing::warn!(token = %fingerprint(token), "tracking token signature mismatch")
                    }
                    RejectReason::StorageUnavailable => {
                        tracing::error!(err = %err, "revocation lookup failed, rejecting token")
                    }
                    _ => tracing::debug!(%reason, "tracking token rejected"),
                }

                Verification::Invalid { reason }
            }
        }
    }

    /// Structure, signature, expiry, then revocation. Storage is only
    /// touched once the cheaper checks have passed.
    pub async fn check(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.codec.verify_signature(token)?;
        let now = self.clock.now_secs();

        if now > claims.exp {
            return Err(TrackingError::TokenExpired);
        }

        let hash = token_hash(token);
        match self.revocations.find_revocation(&hash).await? {
            Some(record) if record.is_revoked => return Err(TrackingError::TokenRevoked),
            Some(_) => {}
            None => {
                let known = RevokedToken {
                    token_hash: hash,
                    user_id: claims.sub.to_owned(),
                    is_revoked: false,
                    expires_at: claims.exp,
                    created_at: now,
                };

                if let Err(err) = self.revocations.insert_known_token(&known).await {
                    tracing::warn!(err = %err, "failed to register verified token");
                }
            }
        }

        Ok(claims)
    }
}
