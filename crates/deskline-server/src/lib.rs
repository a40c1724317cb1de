//! Deskline server: an HTTP shell and data tooling around the orchestrator.

pub mod import;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
