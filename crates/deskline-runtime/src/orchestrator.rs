//! Orchestrator: sequences lookup, correction and response under one deadline.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use deskline_core::{BudgetPolicy, Error, Result};
use deskline_llm::TextGenerator;
use deskline_resolve::{CorrectionAdvisor, CorrectionResult, RecordResolver, Resolution};
use deskline_store::{Record, RecordSource};
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::budget::{Allocation, Budget};
use crate::respond::{ResponseTier, TieredResponder};
use crate::types::*;

/// Reply for a blank name. No external system is touched.
pub const PROMPT_FOR_NAME: &str =
    "Whose details are you looking for? Please tell me the person's name.";

/// Reply for any internal fault.
pub const FAULT_MESSAGE: &str =
    "Sorry, something went wrong while looking that up. Please try again in a moment.";

/// Longest advisor text appended to a not-found reply.
const MAX_ADVICE_CHARS: usize = 300;

/// Answers one query per call, always with exactly one [`Reply`].
#[derive(Clone)]
pub struct Orchestrator {
    resolver: RecordResolver,
    advisor: CorrectionAdvisor,
    responder: TieredResponder,
    policy: BudgetPolicy,
}

/// Mutable per-request bookkeeping.
struct Run {
    budget: Budget,
    trace: Vec<Stage>,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        debug!(
            "{:?} at {}ms ({}ms left)",
            stage,
            self.budget.elapsed().as_millis(),
            self.budget.remaining().as_millis()
        );
        self.trace.push(stage);
    }
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        generator: Arc<dyn TextGenerator>,
        policy: BudgetPolicy,
    ) -> Self {
        Self {
            resolver: RecordResolver::new(source),
            advisor: CorrectionAdvisor::new(generator.clone()),
            responder: TieredResponder::new(generator, &policy),
            policy,
        }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Answer `query`. Never fails and never returns more than one message.
    pub async fn answer(&self, query: &Query) -> Reply {
        let request_id = Uuid::new_v4();
        let span = info_span!("query", request_id = %request_id);
        let mut run = Run {
            budget: Budget::start(self.policy.total_budget()),
            trace: Vec::with_capacity(7),
        };

        let outcome = AssertUnwindSafe(self.run(query, &mut run))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        span.in_scope(|| match outcome {
            Ok(Ok(reply)) => {
                info!(
                    "Replied {:?} via {:?} in {}ms",
                    reply.outcome, reply.tier, reply.elapsed_ms
                );
                reply
            }
            Ok(Err(e)) => {
                error!("Query failed: {}", e);
                fault_reply(run)
            }
            Err(_) => {
                error!("Query handler panicked");
                fault_reply(run)
            }
        })
    }

    async fn run(&self, query: &Query, run: &mut Run) -> Result<Reply> {
        run.enter(Stage::Start);

        let name = query.extracted_name.trim();
        if name.is_empty() {
            return finish(
                run,
                Stage::Done,
                Outcome::PromptForName,
                PROMPT_FOR_NAME.to_string(),
                None,
                None,
            );
        }

        run.enter(Stage::Resolving);
        let (record, correction) = match self.lookup(name, &run.budget).await {
            Resolution::Found(record) => (record, None),
            Resolution::NotFound => {
                run.enter(Stage::Correcting);
                let result = self.correct(name, &run.budget).await;
                let Some(suggested) = result.suggested_name.clone() else {
                    return finish(
                        run,
                        Stage::Abort,
                        Outcome::NotFound,
                        not_found_message(name, &result),
                        None,
                        None,
                    );
                };

                run.enter(Stage::ReResolving);
                match self.lookup(&suggested, &run.budget).await {
                    Resolution::Found(record) => {
                        let correction = Correction {
                            original: name.to_string(),
                            corrected: record.canonical_name.clone(),
                        };
                        (record, Some(correction))
                    }
                    Resolution::NotFound => {
                        warn!("Suggested name {:?} is not in the store", suggested);
                        return finish(
                            run,
                            Stage::Abort,
                            Outcome::NotFound,
                            not_found_message(name, &CorrectionResult::failed()),
                            None,
                            None,
                        );
                    }
                }
            }
        };

        run.enter(Stage::Responding);
        let (text, tier) = self.respond(&record, query, correction.as_ref(), &run.budget).await;
        finish(
            run,
            Stage::Done,
            Outcome::Answered,
            text,
            Some(tier),
            correction.map(|c| c.original),
        )
    }

    async fn lookup(&self, name: &str, budget: &Budget) -> Resolution {
        let allowance = budget
            .allocate(Allocation::Fixed(self.policy.store_timeout()), self.policy.store_margin())
            .unwrap_or(Duration::ZERO);
        self.resolver.resolve(name, allowance).await
    }

    /// Allowance for the advisor: capped, and leaving the response reserve intact.
    fn correction_allowance(&self, budget: &Budget) -> Option<Duration> {
        let usable = budget.remaining().saturating_sub(self.policy.response_reserve());
        budget.allocate(
            Allocation::Fixed(self.policy.corrector_cap().min(usable)),
            self.policy.correction_margin(),
        )
    }

    async fn correct(&self, name: &str, budget: &Budget) -> CorrectionResult {
        if self.correction_allowance(budget).is_none() {
            debug!("No budget left to correct {:?}", name);
            return CorrectionResult::failed();
        }

        let listing = budget
            .allocate(Allocation::Fixed(self.policy.store_timeout()), self.policy.store_margin())
            .unwrap_or(Duration::ZERO);
        let candidates = self.resolver.candidate_names(listing).await;

        // Listing took time; size the advisor call on what is left now.
        let allowance = self.correction_allowance(budget).unwrap_or(Duration::ZERO);
        self.advisor.suggest(name, &candidates, allowance).await
    }

    async fn respond(
        &self,
        record: &Record,
        query: &Query,
        correction: Option<&Correction>,
        budget: &Budget,
    ) -> (String, ResponseTier) {
        let candidate = self.responder.respond(record, query, correction, budget).await;
        if let Some(from) = candidate.degraded_from {
            info!("Degraded from {} to {}", from, candidate.tier);
        }
        let text = match correction {
            Some(c) => c.apply(&candidate.text),
            None => candidate.text,
        };
        (text, candidate.tier)
    }
}

/// Enter the terminal `stage` and build the reply. An empty message is a fault,
/// reported before the stage is recorded.
fn finish(
    run: &mut Run,
    stage: Stage,
    outcome: Outcome,
    message: String,
    tier: Option<ResponseTier>,
    corrected_from: Option<String>,
) -> Result<Reply> {
    if message.trim().is_empty() {
        return Err(Error::Internal(format!("empty {:?} reply", outcome)));
    }
    run.enter(stage);
    Ok(Reply {
        message,
        outcome,
        tier,
        corrected_from,
        elapsed_ms: run.budget.elapsed().as_millis() as u64,
        trace: std::mem::take(&mut run.trace),
    })
}

fn fault_reply(mut run: Run) -> Reply {
    if !run.trace.last().is_some_and(Stage::is_terminal) {
        run.trace.push(Stage::Abort);
    }
    Reply {
        message: FAULT_MESSAGE.to_string(),
        outcome: Outcome::Fault,
        tier: None,
        corrected_from: None,
        elapsed_ms: run.budget.elapsed().as_millis() as u64,
        trace: run.trace,
    }
}

fn not_found_message(name: &str, correction: &CorrectionResult) -> String {
    let mut message = format!(
        "Sorry, I couldn't find anyone named \"{}\" in the directory.",
        name
    );
    if let Some(advice) = correction.user_facing_advice() {
        let advice: String = advice.chars().take(MAX_ADVICE_CHARS).collect();
        let advice = advice.trim();
        if !advice.is_empty() {
            message.push(' ');
            message.push_str(advice);
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use deskline_store::{Course, MemoryDirectory};

    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Plays back one scripted reply per call, each after a delay.
    struct Scripted {
        replies: Mutex<VecDeque<Option<String>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: &[Option<&str>]) -> Arc<Self> {
            Self::slow(replies, Duration::ZERO)
        }

        fn slow(replies: &[Option<&str>], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str, timeout: Duration) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front().flatten();
            tokio::time::timeout(timeout, async {
                tokio::time::sleep(self.delay).await;
                reply
            })
            .await
            .ok()
            .flatten()
        }
    }

    struct Panicking;

    #[async_trait]
    impl TextGenerator for Panicking {
        async fn generate(&self, _prompt: &str, _timeout: Duration) -> Option<String> {
            panic!("backend bug");
        }
    }

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new(directory_records())
    }

    fn directory_records() -> Vec<Record> {
        vec![
            Record {
                canonical_name: "Yin Bang-yen".into(),
                office_location: "Engineering Building 512".into(),
                extension: "3512".into(),
                presence_days: None,
                courses: vec![
                    Course {
                        title: "Operating Systems".into(),
                        code: Some("CS301".into()),
                        room: None,
                    },
                    Course {
                        title: "Compilers".into(),
                        code: Some("CS420".into()),
                        room: None,
                    },
                ],
            },
            Record {
                canonical_name: "Lin Hao".into(),
                office_location: "Science Hall 210".into(),
                extension: "2210".into(),
                presence_days: None,
                courses: Vec::new(),
            },
        ]
    }

    fn orchestrator(dir: MemoryDirectory, generator: Arc<dyn TextGenerator>) -> Orchestrator {
        Orchestrator::new(Arc::new(dir), generator, BudgetPolicy::default())
    }

    fn with_total(total_ms: u64) -> BudgetPolicy {
        BudgetPolicy {
            total_budget_ms: total_ms,
            ..BudgetPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_hit_full_tier() {
        let backend = Scripted::new(&[Some("Lin Hao is in Science Hall 210, ext. 2210.")]);
        let orch = orchestrator(directory(), backend.clone());

        let reply = orch.answer(&Query::new("Where is Lin Hao?", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::Answered);
        assert_eq!(reply.tier, Some(ResponseTier::Full));
        assert_eq!(reply.message, "Lin Hao is in Science Hall 210, ext. 2210.");
        assert_eq!(reply.corrected_from, None);
        assert_eq!(
            reply.trace,
            vec![Stage::Start, Stage::Resolving, Stage::Responding, Stage::Done]
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_follows_budget() {
        for (total, tier) in [
            (3200, ResponseTier::Full),
            (1800, ResponseTier::Quick),
            (800, ResponseTier::Template),
        ] {
            let backend = Scripted::new(&[Some("generated")]);
            let orch = Orchestrator::new(Arc::new(directory()), backend, with_total(total));
            let reply = orch.answer(&Query::new("Tell me about Lin Hao", "lin hao")).await;
            assert_eq!(reply.tier, Some(tier), "total {}ms", total);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_generation_degrades_to_template() {
        let backend = Scripted::new(&[None]);
        let orch = orchestrator(directory(), backend.clone());

        let reply = orch.answer(&Query::new("office of Lin Hao", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::Answered);
        assert_eq!(reply.tier, Some(ResponseTier::Template));
        assert!(reply.message.contains("Science Hall 210"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_stays_inside_deadline() {
        let backend = Scripted::slow(&[Some("late")], Duration::from_secs(60));
        let orch = orchestrator(directory(), backend);

        let reply = orch.answer(&Query::new("What does he teach?", "Yin Bang-yen")).await;
        assert_eq!(reply.tier, Some(ResponseTier::Template));
        assert!(reply.message.contains("2. Compilers (CS420)"));
        assert!(reply.elapsed_ms <= orch.policy().total_budget_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correction_round_trip() {
        let backend = Scripted::new(&[Some("Did you mean **Yin Bang-yen**?"), None]);
        let orch = orchestrator(directory(), backend.clone());

        let reply = orch
            .answer(&Query::new("Where is Yin Bang-ching's office?", "Yin Bang-ching"))
            .await;
        assert_eq!(reply.outcome, Outcome::Answered);
        assert_eq!(reply.corrected_from.as_deref(), Some("Yin Bang-ching"));
        assert!(reply.message.contains("Yin Bang-ching"));
        assert!(reply.message.contains("Yin Bang-yen"));
        assert!(reply.message.contains("Engineering Building 512"));
        assert_eq!(
            reply.trace,
            vec![
                Stage::Start,
                Stage::Resolving,
                Stage::Correcting,
                Stage::ReResolving,
                Stage::Responding,
                Stage::Done
            ]
        );
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledgment_not_duplicated() {
        let backend = Scripted::new(&[
            Some("**Yin Bang-yen**"),
            Some("Taking Yin Bang-ching as Yin Bang-yen: Engineering Building 512."),
        ]);
        let orch = orchestrator(directory(), backend);

        let reply = orch.answer(&Query::new("office?", "Yin Bang-ching")).await;
        assert_eq!(
            reply.message,
            "Taking Yin Bang-ching as Yin Bang-yen: Engineering Building 512."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_match_carries_advice() {
        let backend = Scripted::new(&[Some("Nobody with a similar name is listed.")]);
        let orch = orchestrator(directory(), backend.clone());

        let reply = orch.answer(&Query::new("where?", "Zhang Wei")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert!(reply.message.contains("\"Zhang Wei\""));
        assert!(reply.message.ends_with("Nobody with a similar name is listed."));
        assert_eq!(reply.trace.last(), Some(&Stage::Abort));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marked_non_name_ends_not_found() {
        let mut records = directory_records();
        records.push(Record {
            canonical_name: "Arnold Lee".into(),
            office_location: "Library 3F".into(),
            extension: "9001".into(),
            presence_days: None,
            courses: Vec::new(),
        });
        let backend = Scripted::new(&[Some("**No** similar name was found for Zhang Wei.")]);
        let orch = orchestrator(MemoryDirectory::new(records), backend.clone());

        let reply = orch.answer(&Query::new("where?", "Zhang Wei")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert_eq!(reply.corrected_from, None);
        assert!(!reply.message.contains("Arnold Lee"));
        assert!(!reply.message.contains("**"));
        assert_eq!(
            reply.trace,
            vec![Stage::Start, Stage::Resolving, Stage::Correcting, Stage::Abort]
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_suggestion_is_not_echoed() {
        let backend = Scripted::new(&[Some("Perhaps **Wang Shu**.")]);
        let orch = orchestrator(directory(), backend);

        let reply = orch.answer(&Query::new("where?", "Wang Xu")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert!(!reply.message.contains("Wang Shu"));
        assert_eq!(reply.trace.last(), Some(&Stage::Abort));
    }

    /// Lists names but can no longer find any of them.
    struct ListsOnly(Vec<String>);

    #[async_trait]
    impl RecordSource for ListsOnly {
        async fn find_by_approximate_name(&self, _name: &str) -> Option<Record> {
            None
        }

        async fn list_all_names(&self) -> Vec<String> {
            self.0.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_resolve_miss_aborts() {
        let backend = Scripted::new(&[Some("Did you mean **Yin Bang-yen**?")]);
        let source = Arc::new(ListsOnly(vec!["Yin Bang-yen".to_string()]));
        let orch = Orchestrator::new(source, backend, BudgetPolicy::default());

        let reply = orch.answer(&Query::new("where?", "Yin Bang-ching")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert!(!reply.message.contains("Did you mean"));
        assert_eq!(
            reply.trace,
            vec![
                Stage::Start,
                Stage::Resolving,
                Stage::Correcting,
                Stage::ReResolving,
                Stage::Abort
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_store_skips_backend() {
        let backend = Scripted::new(&[Some("**Lin Hao**")]);
        let orch = orchestrator(MemoryDirectory::new(Vec::new()), backend.clone());

        let reply = orch.answer(&Query::new("where?", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert!(!reply.message.contains("no candidates"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_is_a_miss() {
        let backend = Scripted::new(&[Some("**Lin Hao**")]);
        let orch = orchestrator(MemoryDirectory::unavailable(), backend.clone());

        let reply = orch.answer(&Query::new("where?", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert_eq!(reply.trace.last(), Some(&Stage::Abort));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_cannot_eat_the_budget() {
        let dir = directory().with_latency(Duration::from_secs(10));
        let backend = Scripted::new(&[]);
        let orch = orchestrator(dir, backend);

        let reply = orch.answer(&Query::new("where?", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::NotFound);
        assert!(reply.elapsed_ms <= orch.policy().total_budget_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_name_prompts_without_calls() {
        let backend = Scripted::new(&[Some("unused")]);
        let orch = orchestrator(directory(), backend.clone());

        let reply = orch.answer(&Query::new("where is the office?", "   ")).await;
        assert_eq!(reply.outcome, Outcome::PromptForName);
        assert_eq!(reply.message, PROMPT_FOR_NAME);
        assert_eq!(reply.trace, vec![Stage::Start, Stage::Done]);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_single_apology() {
        let orch = orchestrator(directory(), Arc::new(Panicking));

        let reply = orch.answer(&Query::new("where?", "Lin Hao")).await;
        assert_eq!(reply.outcome, Outcome::Fault);
        assert_eq!(reply.message, FAULT_MESSAGE);
        assert_eq!(reply.trace.last(), Some(&Stage::Abort));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_message_faults_with_abort_trace() {
        let mut run = Run {
            budget: Budget::start(ms(4500)),
            trace: vec![Stage::Start, Stage::Resolving, Stage::Responding],
        };
        let result = finish(
            &mut run,
            Stage::Done,
            Outcome::Answered,
            "  ".to_string(),
            Some(ResponseTier::Template),
            None,
        );
        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(run.trace.last(), Some(&Stage::Responding));

        let reply = fault_reply(run);
        assert_eq!(reply.outcome, Outcome::Fault);
        assert_eq!(
            reply.trace,
            vec![Stage::Start, Stage::Resolving, Stage::Responding, Stage::Abort]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_path_yields_one_terminal_message() {
        let queries = [
            Query::new("where?", "Lin Hao"),
            Query::new("where?", "Nobody At All"),
            Query::new("where?", ""),
            Query::new("courses?", "Yin Bang-ching"),
        ];
        for query in &queries {
            let backend = Scripted::new(&[Some("**Yin Bang-yen**"), None]);
            let orch = orchestrator(directory(), backend);
            let reply = orch.answer(query).await;
            assert!(!reply.message.trim().is_empty());
            let terminals = reply.trace.iter().filter(|s| s.is_terminal()).count();
            assert_eq!(terminals, 1, "{:?}", reply.trace);
            assert!(reply.trace.last().is_some_and(Stage::is_terminal));
        }
    }
}
