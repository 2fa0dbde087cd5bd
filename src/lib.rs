//! RxStock: pharmacy bill ingestion.
//!
//! A photographed pharmacy bill goes through OCR, an ownership check
//! against the uploading pharmacy, structured line-item extraction, and
//! reconciliation into that pharmacy's inventory, with lifecycle events
//! published along the way. The embedding application (HTTP gate, desktop
//! shell) owns transport and authentication; this crate owns the pipeline.

pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod pipeline;

pub use events::{EventSubscriber, Notifier, PipelineEvent};
pub use models::{Bill, BillStatus, InventoryFilter, InventoryItem, PharmacyProfile};
pub use pipeline::{BillProcessor, ProcessingError, UploadOutcome};

use tracing_subscriber::EnvFilter;

/// Install a tracing subscriber for embedding applications that do not
/// bring their own. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
