//! Production pipelines: source ingestion, long-context knowledge
//! extraction, structured deck/script/book design, per-item media
//! synthesis, and final video composition.
//!
//! Every pipeline runs as a task target: an async fn taking a
//! [`mosaic_tasks::TaskHandle`] for progress, logs, and cancellation, and
//! returning a JSON result. Stages are at-least-once with idempotent
//! artefact insertion; per-step failures are logged and skipped rather
//! than aborting the whole run.

pub mod actions;
pub mod compose;
pub mod design;
pub mod error;
pub mod ingest;
pub mod lcp;
pub mod media;
pub mod produce;

pub use error::PipelineError;

use sqlx::PgPool;

use mosaic_clients::{ClientSettings, ModelClients};
use mosaic_core::paths::DataRoot;

use crate::lcp::LcpConfig;

/// Timeout for source fetches (scrape, transcript, encyclopedia, papers).
const FETCH_TIMEOUT_SECS: u64 = 60;

/// Everything a pipeline target needs besides its task handle.
///
/// Built once per submission (the clients reflect the user's configuration
/// at that moment) and shared via `Arc` with chained tasks.
pub struct PipelineContext {
    pub pool: PgPool,
    pub data_root: DataRoot,
    pub clients: ModelClients,
    pub settings: ClientSettings,
    pub lcp: LcpConfig,
    /// Plain HTTP client for source acquisition, separate from the model
    /// backends' clients and their generous generation timeouts.
    pub http: reqwest::Client,
}

impl PipelineContext {
    pub fn new(
        pool: PgPool,
        data_root: DataRoot,
        settings: ClientSettings,
        lcp: LcpConfig,
    ) -> Result<Self, PipelineError> {
        let clients = ModelClients::from_settings(&settings)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            pool,
            data_root,
            clients,
            settings,
            lcp,
            http,
        })
    }
}
