//! The courier gateway: webhook ingestion, handoff gating, outbound
//! dispatch, the internal automation-engine API, and the minimal operator
//! surface.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod forward;
pub mod hooks;
pub mod ingest;
pub mod internal;
pub mod operator;
pub mod server;
pub mod state;

pub use {
    server::{build_router, start_gateway},
    state::AppState,
};
