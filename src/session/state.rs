use serde::Deserialize;

use crate::types::{MergePolicy, Stage};

/// Structured projection of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub stage: Stage,
    pub problem: String,
    pub facts: Vec<String>,
    pub assumptions: Vec<String>,
    pub requirements: Vec<String>,
    pub deleted_items: Vec<String>,
    pub simplification: String,
    pub test_ideas: Vec<String>,
    pub reflection: String,
}

/// Partial update. `None` means the field was omitted (or `null`) upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SummaryUpdate {
    pub problem: Option<String>,
    pub facts: Option<Vec<String>>,
    pub assumptions: Option<Vec<String>>,
    pub requirements: Option<Vec<String>>,
    #[serde(alias = "deletedItems")]
    pub deleted_items: Option<Vec<String>>,
    pub simplification: Option<String>,
    #[serde(alias = "testIdeas")]
    pub test_ideas: Option<Vec<String>>,
    pub reflection: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `update` into the state. Returns true when any field changed.
    pub fn merge(&mut self, update: SummaryUpdate, policy: MergePolicy) -> bool {
        let mut changed = false;
        changed |= merge_text(&mut self.problem, update.problem, policy);
        changed |= merge_list(&mut self.facts, update.facts, policy);
        changed |= merge_list(&mut self.assumptions, update.assumptions, policy);
        changed |= merge_list(&mut self.requirements, update.requirements, policy);
        changed |= merge_list(&mut self.deleted_items, update.deleted_items, policy);
        changed |= merge_text(&mut self.simplification, update.simplification, policy);
        changed |= merge_list(&mut self.test_ideas, update.test_ideas, policy);
        changed |= merge_text(&mut self.reflection, update.reflection, policy);
        changed
    }

    /// Move to the next stage. No-op at the final stage.
    pub fn advance_stage(&mut self) -> bool {
        let next = self.stage.next();
        if next == self.stage {
            return false;
        }
        self.stage = next;
        true
    }
}

fn merge_text(slot: &mut String, incoming: Option<String>, policy: MergePolicy) -> bool {
    let Some(value) = incoming else {
        return false;
    };
    let value = value.trim().to_string();
    if policy == MergePolicy::KeepOnEmpty && value.is_empty() {
        return false;
    }
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn merge_list(slot: &mut Vec<String>, incoming: Option<Vec<String>>, policy: MergePolicy) -> bool {
    let Some(items) = incoming else {
        return false;
    };
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if policy == MergePolicy::KeepOnEmpty && items.is_empty() {
        return false;
    }
    if *slot == items {
        return false;
    }
    *slot = items;
    true
}
