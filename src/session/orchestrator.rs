use crate::agent::gateway::{Extraction, Reply};
use crate::session::audit::{AuditRecord, ExchangeAudit};
use crate::session::conversation::{Conversation, Turn};
use crate::session::state::SessionState;
use crate::types::{ExchangeEventKind, MergePolicy, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
    AwaitingSummary,
}

/// Owns the conversation log and the session state for one session.
///
/// An exchange runs strictly in order: the user turn is appended, the reply
/// is generated and appended, then the extraction result is merged. Stage
/// advancement is accepted in any phase.
pub struct Orchestrator {
    conversation: Conversation,
    state: SessionState,
    phase: Phase,
    policy: MergePolicy,
    audit: ExchangeAudit,
}

impl Orchestrator {
    pub fn new(policy: MergePolicy, audit: ExchangeAudit) -> Self {
        Self {
            conversation: Conversation::new(),
            state: SessionState::new(),
            phase: Phase::Idle,
            policy,
            audit,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    /// Append the user turn and return the history to reply to.
    /// `None` when the input is blank or an exchange is already in flight.
    pub fn begin_send(&mut self, input: &str) -> Option<Vec<Turn>> {
        let text = input.trim();
        if text.is_empty() || self.phase != Phase::Idle {
            return None;
        }
        self.conversation.push(Turn::user(text));
        self.phase = Phase::AwaitingReply;
        self.record(ExchangeEventKind::UserTurn, Some(text));
        Some(self.conversation.turns().to_vec())
    }

    /// Append the assistant turn and return the history to extract from.
    pub fn complete_reply(&mut self, reply: &Reply) -> Option<Vec<Turn>> {
        if self.phase != Phase::AwaitingReply {
            tracing::debug!(phase = ?self.phase, "reply arrived outside AwaitingReply; dropped");
            return None;
        }
        self.conversation.push(Turn::assistant(reply.text()));
        self.phase = Phase::AwaitingSummary;
        match reply {
            Reply::Generated(_) => self.record(ExchangeEventKind::ReplyGenerated, None),
            Reply::Degraded { cause, .. } => {
                self.record(ExchangeEventKind::ReplyDegraded, Some(&cause.describe()));
            }
        }
        Some(self.conversation.turns().to_vec())
    }

    /// Merge whatever the extraction produced and return to Idle.
    /// Returns true when the session state changed.
    pub fn complete_summary(&mut self, extraction: Extraction) -> bool {
        if self.phase != Phase::AwaitingSummary {
            tracing::debug!(phase = ?self.phase, "summary arrived outside AwaitingSummary; dropped");
            return false;
        }
        self.phase = Phase::Idle;
        match extraction {
            Extraction::Found(update) => {
                let changed = self.state.merge(update, self.policy);
                let detail = if changed { "changed" } else { "unchanged" };
                self.record(ExchangeEventKind::SummaryMerged, Some(detail));
                changed
            }
            Extraction::Absent(reason) => {
                self.record(ExchangeEventKind::SummaryAbsent, Some(&reason));
                false
            }
        }
    }

    /// Move to the next stage. Returns false once the final stage is reached.
    pub fn advance_stage(&mut self) -> bool {
        if !self.state.advance_stage() {
            return false;
        }
        tracing::info!(stage = self.state.stage.label(), "stage advanced");
        self.record(ExchangeEventKind::StageAdvanced, Some(self.state.stage.label()));
        true
    }

    /// Start over with an empty log and state. Only allowed while idle.
    pub fn reset(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.conversation.clear();
        self.state = SessionState::new();
        self.record(ExchangeEventKind::SessionReset, None);
        true
    }

    fn record(&self, event: ExchangeEventKind, detail: Option<&str>) {
        let rec = AuditRecord {
            event,
            stage: self.state.stage,
            turns: self.conversation.len(),
            detail,
        };
        if let Err(e) = self.audit.write(rec) {
            tracing::debug!(error = %e, "exchange audit write failed");
        }
    }
}
