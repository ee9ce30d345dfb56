//! Cross-process relay over Postgres LISTEN/NOTIFY.
//!
//! [`PgRelay`] bridges the in-process [`BroadcastBus`](crate::bus::BroadcastBus)
//! with every other worker process sharing the database: locally published
//! messages go out via `pg_notify`, and inbound notifications are replayed
//! onto the local bus. Delivery is lossy: the bus only carries UI
//! notifications, never state.

use std::sync::Arc;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::{BroadcastBus, BroadcastMessage};

/// Notification channel shared by all worker processes.
const NOTIFY_CHANNEL: &str = "mosaic_events";

/// Bridges the local bus with other processes via LISTEN/NOTIFY.
pub struct PgRelay {
    pool: PgPool,
    bus: Arc<BroadcastBus>,
}

impl PgRelay {
    pub fn new(pool: PgPool, bus: Arc<BroadcastBus>) -> Self {
        Self { pool, bus }
    }

    /// Run both relay directions until the cancellation token fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::join!(
            self.run_outbound(cancel.clone()),
            self.run_inbound(cancel),
        );
    }

    /// Forward locally published messages to `pg_notify`.
    async fn run_outbound(&self, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(message) => {
                        // Only forward messages that originated here;
                        // everything else already came over the wire.
                        if message.origin != self.bus.origin() {
                            continue;
                        }
                        if let Err(e) = self.notify(&message).await {
                            tracing::warn!(error = %e, "Failed to relay broadcast message");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Outbound relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Replay inbound notifications from other processes onto the local bus.
    async fn run_inbound(&self, cancel: CancellationToken) {
        let mut listener = match PgListener::connect_with(&self.pool).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open LISTEN connection; cross-process relay disabled");
                return;
            }
        };
        if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
            tracing::error!(error = %e, "LISTEN failed; cross-process relay disabled");
            return;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                notification = listener.recv() => match notification {
                    Ok(n) => {
                        match serde_json::from_str::<BroadcastMessage>(n.payload()) {
                            Ok(message) if message.origin != self.bus.origin() => {
                                self.bus.publish(message);
                            }
                            Ok(_) => {} // our own echo
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping malformed relay payload");
                            }
                        }
                    }
                    Err(e) => {
                        // PgListener reconnects internally; a hard error here
                        // means the pool is gone.
                        tracing::error!(error = %e, "Relay listener failed");
                        break;
                    }
                },
            }
        }
    }

    async fn notify(&self, message: &BroadcastMessage) -> Result<(), sqlx::Error> {
        let payload =
            serde_json::to_string(message).map_err(|e| sqlx::Error::Encode(e.into()))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
