use std::sync::Arc;

use serde::Serialize;
use sqlx::prelude::FromRow;

use crate::{
    Clock, Result, TokenClaims, TokenCodec, storage::RevocationStorage,
    token::{fingerprint, token_hash},
};

/// Revocation row keyed by the token hash. Rows are flagged, never deleted,
/// until the token they describe has expired.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RevokedToken {
    pub token_hash: String,
    pub user_id: String,
    pub is_revoked: bool,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevokeAllOutcome {
    pub revoked_count: u64,
}

pub struct RevocationStore {
    codec: Arc<TokenCodec>,
    storage: Arc<dyn RevocationStorage>,
    clock: Arc<dyn Clock>,
}

impl RevocationStore {
    pub fn new(
        codec: Arc<TokenCodec>,
        storage: Arc<dyn RevocationStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            storage,
            clock,
        }
    }

    /// Revokes a single token. Revoking twice is not an error.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let claims = self.codec.verify_signature(token)?;
        let record = RevokedToken {
            token_hash: token_hash(token),
            user_id: claims.sub,
            is_revoked: true,
            expires_at: claims.exp,
            created_at: self.clock.now_secs(),
        };

        self.storage.upsert_revocation(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            token = %fingerprint(token),
            "tracking token revoked"
        );

        Ok(true)
    }

    /// Revokes every known, unexpired token issued to `subject`.
    pub async fn revoke_all_for_subject(&self, subject: &str) -> Result<RevokeAllOutcome> {
        let revoked_count = self
            .storage
            .revoke_for_user(subject, self.clock.now_secs())
            .await?;

        tracing::info!(user_id = %subject, revoked_count, "tracking tokens revoked for user");

        Ok(RevokeAllOutcome { revoked_count })
    }

    /// Deletes rows whose token has expired; the verifier rejects those anyway.
    pub async fn prune(&self) -> Result<u64> {
        let pruned = self
            .storage
            .prune_revocations(self.clock.now_secs())
            .await?;

        tracing::info!(pruned, "expired revocation rows pruned");

        Ok(pruned)
    }

    /// Records an issued token as known so a bulk revoke can find it later.
    pub async fn remember(&self, token: &str, claims: &TokenClaims) -> Result<()> {
        self.storage
            .insert_known_token(&RevokedToken {
                token_hash: token_hash(token),
                user_id: claims.sub.to_owned(),
                is_revoked: false,
                expires_at: claims.exp,
                created_at: self.clock.now_secs(),
            })
            .await?;

        Ok(())
    }
}
