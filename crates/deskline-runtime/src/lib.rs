//! Runtime: the per-request deadline, tiered response generation and the
//! orchestrator that sequences lookup, correction and response.
//!
//! Every request gets exactly one [`Reply`], whichever path it takes.

pub mod budget;
pub mod intent;
pub mod orchestrator;
pub mod respond;
pub mod types;

pub use budget::{Allocation, Budget};
pub use intent::QueryIntent;
pub use orchestrator::{Orchestrator, FAULT_MESSAGE, PROMPT_FOR_NAME};
pub use respond::{template_answer, ResponseCandidate, ResponseTier, TieredResponder};
pub use types::*;
