// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod context;
pub mod discovery;
pub mod filter;
pub mod http;
pub mod identity;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod runner;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::config::settings::{Settings, SourceSpec};
pub use crate::context::RunContext;
pub use crate::filter::Denylist;
pub use crate::identity::identity_key;
pub use crate::ingest::types::{Delivery, Enrichment, Item, SourceAdapter};
pub use crate::notify::{Notifier, NotifierCfg, Transport, TransportError};
pub use crate::runner::{run_all, run_source, RunSummary, SourceReport};
pub use crate::state::{SourceMeta, State, StateStore};
