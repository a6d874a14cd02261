mod clock;
mod error;
mod event;
mod outbound;
mod recorder;
mod revocation;
mod session;
pub mod snapshot;
pub mod storage;
pub mod token;
mod verifier;

pub use clock::*;
pub use error::*;
pub use event::*;
pub use outbound::*;
pub use recorder::*;
pub use revocation::*;
pub use session::*;
pub use snapshot::{AnalyticsSnapshot, Metric, SnapshotAggregator, SnapshotScope};
pub use token::{Context, TokenClaims, TokenCodec};
pub use verifier::*;

use std::sync::Arc;

use time::Duration;

use storage::{EventStorage, OutboundStorage, RevocationStorage, SnapshotStorage};

#[derive(Clone)]
pub struct TrackingConfig {
    pub secret: String,
    pub token_ttl: Duration,
    pub dedup_window: Duration,
    pub base_url: String,
}

/// Every tracking component wired to one storage handle and one clock.
pub struct Tracking {
    pub codec: Arc<TokenCodec>,
    pub verifier: TokenVerifier,
    pub revocations: RevocationStore,
    pub recorder: Arc<EventRecorder>,
    pub outbound: Outbound,
    pub snapshots: SnapshotAggregator,
    clock: Arc<dyn Clock>,
}

impl Tracking {
    pub fn new<S>(config: TrackingConfig, storage: S, clock: Arc<dyn Clock>) -> Self
    where
        S: RevocationStorage + EventStorage + SnapshotStorage + OutboundStorage + 'static,
    {
        let storage = Arc::new(storage);
        let codec = Arc::new(
            TokenCodec::new(&config.secret, clock.clone()).with_default_ttl(config.token_ttl),
        );

        Self {
            verifier: TokenVerifier::new(codec.clone(), storage.clone(), clock.clone()),
            revocations: RevocationStore::new(codec.clone(), storage.clone(), clock.clone()),
            recorder: Arc::new(
                EventRecorder::new(storage.clone(), clock.clone())
                    .with_dedup_window(config.dedup_window),
            ),
            outbound: Outbound::new(storage.clone(), clock.clone(), config.base_url),
            snapshots: SnapshotAggregator::new(
                storage.clone(),
                storage.clone(),
                storage,
                clock.clone(),
            ),
            codec,
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Encodes a token and registers it so bulk revocation can find it.
    pub async fn issue_token(
        &self,
        subject: &str,
        context: Context,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let token = self.codec.encode(subject, context, ttl)?;
        let claims = TokenCodec::decode(&token)?;
        self.revocations.remember(&token, &claims).await?;

        Ok(token)
    }

    /// Session tracker submitting straight into this recorder.
    pub fn session_tracker(&self, store: Arc<dyn SessionStore>) -> SessionTracker {
        SessionTracker::new(
            store,
            Arc::new(RecorderSink::new(self.recorder.clone())),
            self.clock.clone(),
        )
    }
}
