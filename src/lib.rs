//! shopshot — AI product-shot studio engine.
//!
//! Takes one product photo plus seller-supplied text and drives it through
//! four stages: intake, visual analysis + scene planning, scene selection,
//! and batched image generation against interchangeable model backends.
//! The presentation layer (browser UI or desktop shell) is an external
//! consumer of [`session::StudioSession`] and the job snapshots it exposes.

pub mod catalog;
pub mod config;
pub mod imagegen;
pub mod orchestrator;
pub mod planning;
pub mod product;
pub mod session;
pub mod utils;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect. Filter defaults to `shopshot=info`
/// and can be overridden via `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shopshot=info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}
