use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A prompt shown to the subject. Opaque to the recording core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub content: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub qtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// Selection criteria for `get_random_question`. All present fields must
/// match.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub qtype: Option<String>,
    pub language: Option<String>,
    pub difficulty: Option<String>,
}

impl QuestionFilter {
    fn matches(&self, question: &Question) -> bool {
        fn field_ok(want: &Option<String>, have: &Option<String>) -> bool {
            match want {
                Some(want) => have.as_deref() == Some(want.as_str()),
                None => true,
            }
        }
        field_ok(&self.qtype, &question.qtype)
            && field_ok(&self.language, &question.language)
            && field_ok(&self.difficulty, &question.difficulty)
    }
}

/// Supplies questions to arm sessions with.
pub trait QuestionSource: Send {
    fn get_random_question(&self, filter: Option<&QuestionFilter>) -> Option<Question>;
}

/// File-backed question bank: one JSON array of question records.
pub struct JsonQuestionBank {
    questions: Vec<Question>,
}

impl JsonQuestionBank {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read question bank {}", path.display()))?;
        let questions: Vec<Question> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse question bank {}", path.display()))?;
        Ok(Self { questions })
    }

    pub fn from_questions(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionSource for JsonQuestionBank {
    fn get_random_question(&self, filter: Option<&QuestionFilter>) -> Option<Question> {
        let mut rng = rand::thread_rng();
        match filter {
            Some(filter) => {
                let filtered: Vec<&Question> = self
                    .questions
                    .iter()
                    .filter(|q| filter.matches(q))
                    .collect();
                filtered.choose(&mut rng).map(|q| (*q).clone())
            }
            None => self.questions.choose(&mut rng).cloned(),
        }
    }
}
