//! Tiered response generation.
//!
//! One tier is chosen from the budget left after lookup and correction.
//! A generative tier is attempted at most once; if it yields nothing the
//! answer comes straight from the template, never from a smaller generative
//! tier.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use deskline_core::BudgetPolicy;
use deskline_llm::TextGenerator;
use deskline_store::Record;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::{Allocation, Budget};
use crate::intent::QueryIntent;
use crate::types::{Correction, Query};

/// Response-construction strategy, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseTier {
    Full,
    Quick,
    Template,
}

impl ResponseTier {
    /// Pick the tier for the budget left.
    pub fn select(remaining: Duration, full_threshold: Duration, quick_threshold: Duration) -> Self {
        if remaining >= full_threshold {
            ResponseTier::Full
        } else if remaining >= quick_threshold {
            ResponseTier::Quick
        } else {
            ResponseTier::Template
        }
    }
}

impl fmt::Display for ResponseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseTier::Full => write!(f, "FULL"),
            ResponseTier::Quick => write!(f, "QUICK"),
            ResponseTier::Template => write!(f, "TEMPLATE"),
        }
    }
}

/// The text chosen for a record, and how it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCandidate {
    pub text: String,
    pub tier: ResponseTier,
    /// Generative tier that was tried and yielded nothing.
    pub degraded_from: Option<ResponseTier>,
}

/// Chooses and runs exactly one response tier.
#[derive(Clone)]
pub struct TieredResponder {
    generator: Arc<dyn TextGenerator>,
    full_threshold: Duration,
    quick_threshold: Duration,
    margin: Duration,
}

impl TieredResponder {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: &BudgetPolicy) -> Self {
        Self {
            generator,
            full_threshold: policy.full_tier(),
            quick_threshold: policy.quick_tier(),
            margin: policy.generation_margin(),
        }
    }

    pub async fn respond(
        &self,
        record: &Record,
        query: &Query,
        correction: Option<&Correction>,
        budget: &Budget,
    ) -> ResponseCandidate {
        let intent = QueryIntent::detect(&query.raw_text);
        let remaining = budget.remaining();
        let tier = ResponseTier::select(remaining, self.full_threshold, self.quick_threshold);
        debug!(
            "Responding for {:?}: {}ms left, tier {}, intent {:?}",
            record.canonical_name,
            remaining.as_millis(),
            tier,
            intent
        );

        let prompt = match tier {
            ResponseTier::Full => full_prompt(record, &query.raw_text, intent, correction),
            ResponseTier::Quick => quick_prompt(record, &query.raw_text, intent, correction),
            ResponseTier::Template => {
                return ResponseCandidate {
                    text: template_answer(record, intent),
                    tier,
                    degraded_from: None,
                }
            }
        };

        match budget.allocate(Allocation::Remaining, self.margin) {
            Some(allowance) => {
                if let Some(text) = self.generator.generate(&prompt, allowance).await {
                    let text = text.trim();
                    if !text.is_empty() {
                        info!("{} tier answered in {}ms", tier, budget.elapsed().as_millis());
                        return ResponseCandidate {
                            text: text.to_string(),
                            tier,
                            degraded_from: None,
                        };
                    }
                }
                warn!("{} tier produced nothing; answering from template", tier);
            }
            None => debug!("No allowance left for {} tier", tier),
        }

        ResponseCandidate {
            text: template_answer(record, intent),
            tier: ResponseTier::Template,
            degraded_from: Some(tier),
        }
    }
}

/// Record fields as a plain fact sheet for prompts.
fn fact_sheet(record: &Record) -> String {
    let mut lines = vec![
        format!("Name: {}", record.canonical_name),
        format!("Office: {}", or_unlisted(&record.office_location)),
        format!("Extension: {}", or_unlisted(&record.extension)),
    ];
    if let Some(days) = present(record.presence_days.as_deref()) {
        lines.push(format!("In the office: {}", days));
    }
    if record.courses.is_empty() {
        lines.push("Courses: none listed".to_string());
    } else {
        lines.push("Courses:".to_string());
        lines.extend(record.courses.iter().map(|c| format!("- {}", c.describe())));
    }
    lines.join("\n")
}

/// Rich prompt for the full tier.
pub fn full_prompt(
    record: &Record,
    question: &str,
    intent: QueryIntent,
    correction: Option<&Correction>,
) -> String {
    let mut prompt = String::from(
        "You are a university directory assistant. Answer the question using only the \
         facts below; if a fact is not listed, say it is not listed rather than guessing.\n",
    );
    prompt.push_str(intent.focus());
    prompt.push('\n');
    prompt.push_str(
        "When several courses share a title but have different codes or rooms, list each \
         one on its own line instead of merging them.\n",
    );
    if let Some(c) = correction {
        prompt.push_str(&format!(
            "The user wrote \"{}\", which matched no one; the closest entry is \"{}\". \
             Open with one light, friendly sentence noting that you took \"{}\" to mean \"{}\".\n",
            c.original, c.corrected, c.original, c.corrected
        ));
    }
    prompt.push_str(
        "Reply in the language of the question, in a few short sentences without markdown.\n\n",
    );
    prompt.push_str(&format!("Facts:\n{}\n\nQuestion: {}", fact_sheet(record), question));
    prompt
}

/// Compact prompt for the quick tier.
pub fn quick_prompt(
    record: &Record,
    question: &str,
    intent: QueryIntent,
    correction: Option<&Correction>,
) -> String {
    let mut prompt = format!("Answer briefly from these facts only. {}", intent.brief_focus());
    if let Some(c) = correction {
        prompt.push_str(&format!(" Begin with \"{} → {}\".", c.original, c.corrected));
    }
    prompt.push_str(&format!("\n{}\nQ: {}", fact_sheet(record), question));
    prompt
}

/// Deterministic answer assembled from record fields. Never empty.
pub fn template_answer(record: &Record, intent: QueryIntent) -> String {
    let name = &record.canonical_name;
    match intent {
        QueryIntent::Office => {
            let mut text = office_sentence(record);
            if let Some(days) = present(record.presence_days.as_deref()) {
                text.push_str(&format!(" {} is usually in on {}.", name, days));
            }
            text
        }
        QueryIntent::Courses => {
            if record.courses.is_empty() {
                return format!("{} has no courses listed.", name);
            }
            let mut lines = vec![format!(
                "{} teaches {} course{}:",
                name,
                record.courses.len(),
                if record.courses.len() == 1 { "" } else { "s" }
            )];
            lines.extend(
                record
                    .courses
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{}. {}", i + 1, c.describe())),
            );
            lines.join("\n")
        }
        QueryIntent::General => {
            let mut text = office_sentence(record);
            match record.courses.split_first() {
                None => text.push_str(" No courses are listed."),
                Some((first, [])) => text.push_str(&format!(" Course: {}.", first.describe())),
                Some((first, rest)) => text.push_str(&format!(
                    " Courses include {} and {} more.",
                    first.describe(),
                    rest.len()
                )),
            }
            text
        }
    }
}

fn office_sentence(record: &Record) -> String {
    let name = &record.canonical_name;
    match (
        present(Some(record.office_location.as_str())),
        present(Some(record.extension.as_str())),
    ) {
        (Some(office), Some(ext)) => format!("{}'s office is {}, extension {}.", name, office, ext),
        (Some(office), None) => format!("{}'s office is {}; no extension is listed.", name, office),
        (None, Some(ext)) => format!("{} can be reached at extension {}; no office is listed.", name, ext),
        (None, None) => format!("{} has no office or extension listed.", name),
    }
}

fn present(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|s| !s.is_empty())
}

fn or_unlisted(field: &str) -> &str {
    present(Some(field)).unwrap_or("not listed")
}
