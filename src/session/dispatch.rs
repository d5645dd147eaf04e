use tokio::sync::mpsc;

use crate::agent::gateway::{Extraction, Gateway, Reply};
use crate::agent::provider::Generator;
use crate::session::conversation::Turn;
use crate::session::orchestrator::{Orchestrator, Phase};

/// Results reported back by spawned gateway calls.
#[derive(Debug)]
pub enum WorkerEvent {
    Reply(Reply),
    Summary(Extraction),
}

/// What applying a worker event did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Assistant turn appended; extraction is now in flight.
    Replied { turn: Turn, degraded: bool },
    /// Extraction merged (or was absent); the session is idle again.
    Merged { changed: bool },
    /// Arrived outside the phase that expects it.
    Dropped,
}

/// Runs gateway calls on tokio tasks. Results come back as [`WorkerEvent`]s
/// on the channel and must be handed to [`Dispatcher::apply`] in arrival order.
pub struct Dispatcher<G> {
    gateway: Gateway<G>,
    tx: mpsc::Sender<WorkerEvent>,
}

impl<G> Dispatcher<G>
where
    G: Generator + Clone + 'static,
{
    pub fn new(gateway: Gateway<G>, tx: mpsc::Sender<WorkerEvent>) -> Self {
        Self { gateway, tx }
    }

    /// Append the user turn and start the reply call.
    /// Returns the appended turn, or `None` when the orchestrator refused it.
    pub fn send(&self, orchestrator: &mut Orchestrator, input: &str) -> Option<Turn> {
        let stage = orchestrator.stage();
        let history = orchestrator.begin_send(input)?;
        let turn = history.last().cloned();

        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reply = gateway.generate_reply(&history, stage).await;
            let _ = tx.send(WorkerEvent::Reply(reply)).await;
        });
        turn
    }

    pub fn apply(&self, orchestrator: &mut Orchestrator, event: WorkerEvent) -> Applied {
        match event {
            WorkerEvent::Reply(reply) => {
                let Some(history) = orchestrator.complete_reply(&reply) else {
                    return Applied::Dropped;
                };
                let Some(turn) = history.last().cloned() else {
                    return Applied::Dropped;
                };
                // Extraction starts only once the reply is in the log.
                self.spawn_extraction(history);
                Applied::Replied {
                    turn,
                    degraded: reply.is_degraded(),
                }
            }
            WorkerEvent::Summary(extraction) => {
                if orchestrator.phase() != Phase::AwaitingSummary {
                    tracing::debug!(phase = ?orchestrator.phase(), "summary dropped");
                    return Applied::Dropped;
                }
                Applied::Merged {
                    changed: orchestrator.complete_summary(extraction),
                }
            }
        }
    }

    fn spawn_extraction(&self, history: Vec<Turn>) {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let extraction = gateway.extract_summary(&history).await;
            let _ = tx.send(WorkerEvent::Summary(extraction)).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{Result, anyhow};

    use super::*;
    use crate::agent::gateway::ERROR_REPLY_FALLBACK;
    use crate::agent::provider::GenerateRequest;
    use crate::config::Config;
    use crate::session::audit::ExchangeAudit;
    use crate::session::conversation::Origin;
    use crate::types::{MergePolicy, Stage};

    #[derive(Clone)]
    struct Scripted {
        results: Arc<Mutex<Vec<Result<String>>>>,
        seen: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<String>>) -> Self {
            Self {
                results: Arc::new(Mutex::new(results.into_iter().rev().collect())),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn requests(&self) -> Vec<GenerateRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Generator for Scripted {
        async fn generate(&self, request: &GenerateRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    struct Harness {
        orch: Orchestrator,
        dispatcher: Dispatcher<Scripted>,
        rx: mpsc::Receiver<WorkerEvent>,
        script: Scripted,
    }

    impl Harness {
        fn new(policy: MergePolicy, results: Vec<Result<String>>) -> Self {
            let script = Scripted::new(results);
            let (tx, rx) = mpsc::channel(8);
            let gateway = Gateway::new(script.clone(), &Config::default());
            Self {
                orch: Orchestrator::new(policy, ExchangeAudit::disabled()),
                dispatcher: Dispatcher::new(gateway, tx),
                rx,
                script,
            }
        }

        async fn next_applied(&mut self) -> Applied {
            let event = self.rx.recv().await.unwrap();
            self.dispatcher.apply(&mut self.orch, event)
        }

        /// Send, then apply the reply and the extraction as they arrive.
        async fn exchange(&mut self, input: &str) -> (Applied, Applied) {
            self.dispatcher.send(&mut self.orch, input).unwrap();
            let replied = self.next_applied().await;
            let merged = self.next_applied().await;
            (replied, merged)
        }
    }

    const SAMPLE: &str = r#"{"problem":"X","facts":["a"],"assumptions":[],"requirements":[]}"#;
    const SEED: &str =
        r#"{"problem":"prior","facts":[],"assumptions":["users read docs"],"requirements":["sso"]}"#;

    #[tokio::test]
    async fn extraction_waits_for_the_applied_reply() {
        let mut h = Harness::new(
            MergePolicy::KeepOnEmpty,
            vec![Ok("What must be true?".to_string()), Ok(SAMPLE.to_string())],
        );
        let sent = h.dispatcher.send(&mut h.orch, "ship faster").unwrap();
        assert_eq!(sent, Turn::user("ship faster"));

        let event = h.rx.recv().await.unwrap();
        assert_eq!(h.script.requests().len(), 1);
        assert_eq!(h.orch.phase(), Phase::AwaitingReply);

        let replied = h.dispatcher.apply(&mut h.orch, event);
        assert_eq!(
            replied,
            Applied::Replied {
                turn: Turn::assistant("What must be true?"),
                degraded: false
            }
        );
        assert_eq!(h.orch.phase(), Phase::AwaitingSummary);

        assert_eq!(h.next_applied().await, Applied::Merged { changed: true });
        let requests = h.script.requests();
        assert_eq!(requests.len(), 2);
        assert!(
            requests[1].contents[0]
                .text
                .ends_with("user: ship faster\nmodel: What must be true?")
        );
        assert!(h.orch.is_idle());
    }

    #[tokio::test]
    async fn reply_failure_still_appends_fallback_turn() {
        let mut h = Harness::new(
            MergePolicy::KeepOnEmpty,
            vec![Err(anyhow!("connection refused")), Ok(SAMPLE.to_string())],
        );
        let (replied, _) = h.exchange("hi").await;
        assert!(matches!(replied, Applied::Replied { degraded: true, .. }));
        let turns = h.orch.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], Turn::assistant(ERROR_REPLY_FALLBACK));
        assert!(h.orch.is_idle());
    }

    #[tokio::test]
    async fn malformed_extraction_leaves_state_untouched() {
        let mut h = Harness::new(
            MergePolicy::KeepOnEmpty,
            vec![
                Ok("reply".to_string()),
                Ok(SEED.to_string()),
                Ok("reply".to_string()),
                Ok("{not json".to_string()),
            ],
        );
        h.exchange("seed").await;
        let before = h.orch.state().clone();
        let (_, merged) = h.exchange("hi").await;
        assert_eq!(merged, Applied::Merged { changed: false });
        assert_eq!(h.orch.state(), &before);
        assert_eq!(h.orch.conversation().len(), 4);
    }

    #[tokio::test]
    async fn extraction_failure_leaves_state_untouched() {
        let mut h = Harness::new(
            MergePolicy::Authoritative,
            vec![
                Ok("reply".to_string()),
                Ok(SEED.to_string()),
                Ok("reply".to_string()),
                Err(anyhow!("API error 429")),
            ],
        );
        h.exchange("seed").await;
        let before = h.orch.state().clone();
        h.exchange("hi").await;
        assert_eq!(h.orch.state(), &before);
    }

    #[tokio::test]
    async fn merge_policies_differ_on_empty_lists() {
        for (policy, kept) in [
            (MergePolicy::KeepOnEmpty, true),
            (MergePolicy::Authoritative, false),
        ] {
            let mut h = Harness::new(
                policy,
                vec![
                    Ok("reply".to_string()),
                    Ok(SEED.to_string()),
                    Ok("reply".to_string()),
                    Ok(SAMPLE.to_string()),
                ],
            );
            h.exchange("seed").await;
            h.exchange("hi").await;
            let state = h.orch.state();
            assert_eq!(state.problem, "X");
            assert_eq!(state.facts, vec!["a"]);
            assert_eq!(!state.assumptions.is_empty(), kept, "{policy:?}");
            assert_eq!(!state.requirements.is_empty(), kept, "{policy:?}");
        }
    }

    #[tokio::test]
    async fn summary_outside_awaiting_summary_is_dropped() {
        let h = Harness::new(MergePolicy::KeepOnEmpty, Vec::new());
        let mut orch = h.orch;
        let applied = h
            .dispatcher
            .apply(&mut orch, WorkerEvent::Summary(Extraction::Absent("late".to_string())));
        assert_eq!(applied, Applied::Dropped);
        let applied = h
            .dispatcher
            .apply(&mut orch, WorkerEvent::Reply(Reply::Generated("late".to_string())));
        assert_eq!(applied, Applied::Dropped);
        assert!(orch.conversation().is_empty());
        assert!(h.script.requests().is_empty());
    }

    #[tokio::test]
    async fn send_is_refused_while_an_exchange_runs() {
        let mut h = Harness::new(MergePolicy::KeepOnEmpty, vec![Ok("reply".to_string())]);
        assert!(h.dispatcher.send(&mut h.orch, "first").is_some());
        assert!(h.dispatcher.send(&mut h.orch, "second").is_none());
        assert!(h.dispatcher.send(&mut h.orch, "   ").is_none());
        h.next_applied().await;
        assert_eq!(h.orch.conversation().len(), 2);
        assert_eq!(h.script.requests().len(), 1);
    }

    #[tokio::test]
    async fn onboarding_session_walks_every_stage() {
        let mut h = Harness::new(
            MergePolicy::KeepOnEmpty,
            vec![
                Ok("Who is being onboarded, and what does faster mean?".to_string()),
                Ok(r#"{"problem":"New users take too long to reach first value","facts":[],"assumptions":[],"requirements":[]}"#.to_string()),
            ],
        );
        assert_eq!(h.orch.stage().ordinal(), 0);

        h.exchange("I want to build a faster onboarding flow").await;
        let turns = h.orch.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].origin, Origin::User);
        assert_eq!(turns[1].origin, Origin::Assistant);
        assert_eq!(
            h.orch.state().problem,
            "New users take too long to reach first value"
        );
        assert!(
            h.script.requests()[0]
                .system_instruction
                .as_deref()
                .is_some_and(|s| s.ends_with("CURRENT ACTIVE STEP: 0"))
        );

        for _ in 0..7 {
            assert!(h.orch.advance_stage());
        }
        assert_eq!(h.orch.stage(), Stage::Reflection);
        assert!(!h.orch.advance_stage());
        assert_eq!(h.orch.stage().ordinal(), 7);
    }
}
