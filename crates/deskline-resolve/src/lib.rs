//! Resolvers: record lookup by approximate name, with a backend-assisted
//! correction pass when the mechanical match misses.
//!
//! The resolver never corrects spelling itself. Transpositions and phonetic
//! variants go through [`CorrectionAdvisor`], whose answer is scraped from free
//! text by [`extract`].

pub mod advisor;
pub mod extract;
pub mod resolver;

pub use advisor::{CorrectionAdvisor, CorrectionOutcome, CorrectionResult};
pub use extract::extract_marked_name;
pub use resolver::{RecordResolver, Resolution};
