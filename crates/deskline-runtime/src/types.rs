//! Runtime types.

use serde::{Deserialize, Serialize};

use crate::respond::ResponseTier;

/// One inbound question. Immutable for the life of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "rawQueryText", default)]
    pub raw_text: String,
    #[serde(rename = "extractedName", default)]
    pub extracted_name: String,
}

impl Query {
    pub fn new(raw_text: impl Into<String>, extracted_name: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            extracted_name: extracted_name.into(),
        }
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    Resolving,
    Correcting,
    ReResolving,
    Responding,
    /// Terminal: an answer (or a prompt for a name) was produced.
    Done,
    /// Terminal: nothing could be answered.
    Abort,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Abort)
    }
}

/// How the request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Answered,
    NotFound,
    PromptForName,
    Fault,
}

/// A name that was corrected before answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
}

impl Correction {
    /// Fixed sentence acknowledging the misspelling.
    pub fn acknowledgment(&self) -> String {
        format!(
            "I couldn't find \"{}\", so here is what I have for \"{}\".",
            self.original, self.corrected
        )
    }

    /// Whether `text` already mentions both spellings.
    pub fn is_acknowledged_in(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        text.contains(&self.original.to_lowercase()) && text.contains(&self.corrected.to_lowercase())
    }

    /// Prefix `text` with the acknowledgment unless it already carries one.
    pub fn apply(&self, text: &str) -> String {
        if self.is_acknowledged_in(text) {
            text.to_string()
        } else {
            format!("{}\n{}", self.acknowledgment(), text)
        }
    }
}

/// The single message emitted for a query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub message: String,
    pub outcome: Outcome,
    /// Tier that produced the message; `None` when no record was answered.
    pub tier: Option<ResponseTier>,
    pub corrected_from: Option<String>,
    pub elapsed_ms: u64,
    /// Stages visited, in order, ending in `DONE` or `ABORT`.
    pub trace: Vec<Stage>,
}
