use serde::{Deserialize, Serialize};

/// One of the eight fixed stages of the guided reasoning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Grounding,
    DefineProblem,
    InterrogateRequirements,
    Delete,
    Simplify,
    Accelerate,
    Automate,
    Reflection,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Self::Grounding,
        Self::DefineProblem,
        Self::InterrogateRequirements,
        Self::Delete,
        Self::Simplify,
        Self::Accelerate,
        Self::Automate,
        Self::Reflection,
    ];

    pub const FINAL: Stage = Self::Reflection;

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Grounding => "Grounding",
            Self::DefineProblem => "Problem",
            Self::InterrogateRequirements => "Requirements",
            Self::Delete => "Delete",
            Self::Simplify => "Simplify",
            Self::Accelerate => "Learn",
            Self::Automate => "Automate",
            Self::Reflection => "Reflect",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Grounding => "Facts vs Assumptions",
            Self::DefineProblem => "One-sentence Clarity",
            Self::InterrogateRequirements => "Question Everything",
            Self::Delete => "Aggressive Removal",
            Self::Simplify => "Smallest Viable Version",
            Self::Accelerate => "Rapid Feedback Loops",
            Self::Automate => "Scale Only the Stable",
            Self::Reflection => "The Lesson",
        }
    }

    /// Next stage, saturating at [`Stage::FINAL`].
    pub fn next(self) -> Self {
        Self::from_ordinal(self.ordinal() + 1).unwrap_or(Self::FINAL)
    }

    pub fn is_final(self) -> bool {
        self == Self::FINAL
    }
}

/// How extracted summary fields replace what the session already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Empty strings and empty lists mean "nothing extracted"; prior values stay.
    #[default]
    KeepOnEmpty,
    /// Any present value wins, including empty ones.
    Authoritative,
}

impl MergePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepOnEmpty => "keep_on_empty",
            Self::Authoritative => "authoritative",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_on_empty" | "keep" => Some(Self::KeepOnEmpty),
            "authoritative" | "replace" => Some(Self::Authoritative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEventKind {
    UserTurn,
    ReplyGenerated,
    ReplyDegraded,
    SummaryMerged,
    SummaryAbsent,
    StageAdvanced,
    SessionReset,
}

impl ExchangeEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserTurn => "user_turn",
            Self::ReplyGenerated => "reply_generated",
            Self::ReplyDegraded => "reply_degraded",
            Self::SummaryMerged => "summary_merged",
            Self::SummaryAbsent => "summary_absent",
            Self::StageAdvanced => "stage_advanced",
            Self::SessionReset => "session_reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MergePolicy, Stage};

    #[test]
    fn stages_are_ordered_by_ordinal() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.ordinal() as usize, i);
            assert_eq!(Stage::from_ordinal(i as u8), Some(*stage));
        }
        assert_eq!(Stage::from_ordinal(8), None);
    }

    #[test]
    fn next_saturates_at_reflection() {
        assert_eq!(Stage::Grounding.next(), Stage::DefineProblem);
        assert_eq!(Stage::Automate.next(), Stage::Reflection);
        assert_eq!(Stage::Reflection.next(), Stage::Reflection);
        assert!(Stage::Reflection.is_final());
    }

    #[test]
    fn accelerate_is_labelled_learn() {
        assert_eq!(Stage::Accelerate.label(), "Learn");
        assert_eq!(Stage::Accelerate.description(), "Rapid Feedback Loops");
    }

    #[test]
    fn merge_policy_parses_aliases() {
        assert_eq!(MergePolicy::parse("Keep-On-Empty"), Some(MergePolicy::KeepOnEmpty));
        assert_eq!(MergePolicy::parse("authoritative"), Some(MergePolicy::Authoritative));
        assert_eq!(MergePolicy::parse("sometimes"), None);
    }
}
