// Trivia question bank records.

use serde::{Deserialize, Serialize};

use crate::store::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaQuestion {
    pub id: String,
    pub question: String,
    /// Accepted answers; matching ignores case and surrounding whitespace.
    pub answers: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl TriviaQuestion {
    pub fn is_correct(&self, answer: &str) -> bool {
        let answer = normalize(answer);
        !answer.is_empty() && self.answers.iter().any(|a| normalize(a) == answer)
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Entity for TriviaQuestion {
    const COLLECTION: &'static str = "trivia_questions";

    fn key(&self) -> String {
        self.id.clone()
    }
}
