use serde::{Deserialize, Serialize};

/// A quiz question as kept in the mistakes list.
///
/// Records are keyed by their question text `q`; two distinct questions that
/// share the same text collapse into one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub q: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

impl QuestionRecord {
    #[must_use]
    pub fn new(
        q: impl Into<String>,
        options: Vec<String>,
        answer: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            q: q.into(),
            options,
            answer: answer.into(),
            explanation: explanation.into(),
        }
    }

    /// Returns true if this record has the given question text.
    #[must_use]
    pub fn is_question(&self, q: &str) -> bool {
        self.q == q
    }
}
