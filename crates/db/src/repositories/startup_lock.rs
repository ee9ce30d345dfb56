//! Host-wide one-time startup coordination.
//!
//! Multiple worker processes may start against the same database. Exactly
//! one of them must run the one-time startup work (migrations, directory
//! seeding, zoo cache build). A Postgres session-level advisory lock picks
//! the winner: the lock is tied to the holding connection, so a winner
//! that crashes before releasing it frees the lock when its session dies.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

/// Fixed advisory lock key for startup coordination. Arbitrary but stable.
const STARTUP_LOCK_KEY: i64 = 0x6d6f_7361_6963_0001;

/// Holds the startup advisory lock for the lifetime of the value.
pub struct StartupLock {
    conn: PoolConnection<Postgres>,
}

impl StartupLock {
    /// Try to become the startup winner.
    ///
    /// Returns `Some(lock)` for exactly one process per host; all others
    /// get `None` and must proceed without performing the startup work.
    pub async fn try_acquire(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(STARTUP_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            Ok(Some(Self { conn }))
        } else {
            Ok(None)
        }
    }

    /// Release the lock after the startup work completed.
    ///
    /// Dropping without calling this also releases the lock once the
    /// connection is returned to the pool and eventually closed; explicit
    /// release makes the hand-off immediate.
    pub async fn release(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(STARTUP_LOCK_KEY)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
