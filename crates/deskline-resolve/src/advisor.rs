//! Correction advisor: asks the generative backend which known name the
//! user most likely meant.

use std::sync::Arc;
use std::time::Duration;

use deskline_llm::TextGenerator;
use serde::Serialize;
use tracing::{debug, info};

use crate::extract::{extract_marked_name, marked_spans, MARKER};

/// Advisory text used when there is nothing to compare against.
pub const NO_CANDIDATES_ADVISORY: &str = "no candidates available";

/// How a correction attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// The backend marked a plausible match.
    Suggested,
    /// The backend answered but marked nothing.
    NoMatch,
    /// The backend marked text that names no known candidate.
    Unlisted,
    /// The store had no names; the backend was not called.
    NoCandidates,
    /// Timeout, error, safety rejection or no allowance.
    Failed,
}

/// Result of one correction attempt. At most one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionResult {
    pub suggested_name: Option<String>,
    pub advisory_text: Option<String>,
    pub outcome: CorrectionOutcome,
}

impl CorrectionResult {
    /// No suggestion and nothing to show; the backend was not consulted or failed.
    pub fn failed() -> Self {
        Self {
            suggested_name: None,
            advisory_text: None,
            outcome: CorrectionOutcome::Failed,
        }
    }

    fn no_candidates() -> Self {
        Self {
            suggested_name: None,
            advisory_text: Some(NO_CANDIDATES_ADVISORY.to_string()),
            outcome: CorrectionOutcome::NoCandidates,
        }
    }

    /// Backend-written text worth showing the user alongside "not found".
    pub fn user_facing_advice(&self) -> Option<&str> {
        match self.outcome {
            CorrectionOutcome::NoMatch => self.advisory_text.as_deref(),
            _ => None,
        }
    }
}

/// Suggests the closest known name via the generative backend.
#[derive(Clone)]
pub struct CorrectionAdvisor {
    generator: Arc<dyn TextGenerator>,
}

impl CorrectionAdvisor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// One bounded backend call; never fails, only degrades to no suggestion.
    pub async fn suggest(
        &self,
        original_name: &str,
        candidate_names: &[String],
        allowance: Duration,
    ) -> CorrectionResult {
        if candidate_names.is_empty() {
            debug!("No candidate names; skipping correction for {:?}", original_name);
            return CorrectionResult::no_candidates();
        }
        if allowance.is_zero() {
            debug!("No allowance left for correction of {:?}", original_name);
            return CorrectionResult::failed();
        }

        let prompt = correction_prompt(original_name, candidate_names);
        let Some(reply) = self.generator.generate(&prompt, allowance).await else {
            return CorrectionResult::failed();
        };

        let suggested_name = extract_marked_name(&reply, candidate_names);
        let outcome = if suggested_name.is_some() {
            CorrectionOutcome::Suggested
        } else if marked_spans(&reply).is_empty() {
            CorrectionOutcome::NoMatch
        } else {
            CorrectionOutcome::Unlisted
        };
        info!(
            "Correction for {:?}: {:?} ({:?})",
            original_name, suggested_name, outcome
        );

        CorrectionResult {
            suggested_name,
            advisory_text: Some(reply.trim().to_string()),
            outcome,
        }
    }
}

/// Prompt asking for the closest name, marked only when a match exists.
pub fn correction_prompt(original_name: &str, candidate_names: &[String]) -> String {
    let list = candidate_names
        .iter()
        .map(|n| format!("- {}", n))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "A user asked about a person called \"{original}\", but no directory entry has that name.\n\
         Known names:\n{list}\n\n\
         Pick the single known name most similar to \"{original}\", allowing for typos, \
         swapped or similar-sounding syllables and different romanizations.\n\
         If one is plausibly the intended person, reply in one short sentence that contains \
         that name exactly as listed, wrapped in {m} like {m}Name{m}.\n\
         If none is plausible, do not use {m} anywhere and politely say that no matching \
         person was found.",
        original = original_name,
        list = list,
        m = MARKER,
    )
}
