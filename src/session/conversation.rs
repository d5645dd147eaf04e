// ── Turn types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    Assistant,
}

impl Origin {
    /// Role name the generation service expects for this origin.
    pub fn wire_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub origin: Origin,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::User,
            text: text.into(),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Assistant,
            text: text.into(),
        }
    }
}

// ── Conversation log ──────────────────────────────────────────────────────────

/// Append-only transcript of the session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render every turn as a `role: text` line.
    pub fn transcript(turns: &[Turn]) -> String {
        turns
            .iter()
            .map(|t| format!("{}: {}", t.origin.wire_role(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
