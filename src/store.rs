use crate::request::TestCase;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Source of the example test cases of a question.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// `Ok(None)` when no question with this id exists for `language`.
    async fn test_cases(&self, question_id: &str, language: &str) -> Result<Option<Vec<TestCase>>>;
}

/// One stored example. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl Example {
    /// Examples with neither side present are skipped, a single missing side is empty.
    pub fn into_test_case(self) -> Option<TestCase> {
        match (self.input, self.output) {
            (None, None) => None,
            (input, output) => Some(TestCase {
                input: input.unwrap_or_default(),
                expected_output: output.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub id: String,
    /// `None` applies the question to every language.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub examples: Vec<Example>,
}

impl StoredQuestion {
    fn matches(&self, question_id: &str, language: &str) -> bool {
        self.id == question_id
            && self
                .language
                .as_deref()
                .map_or(true, |l| l.eq_ignore_ascii_case(language))
    }
}

/// Questions loaded from a JSON array of [`StoredQuestion`].
#[derive(Debug, Clone, Default)]
pub struct JsonQuestionStore {
    questions: Vec<StoredQuestion>,
}

impl JsonQuestionStore {
    pub fn new(questions: Vec<StoredQuestion>) -> Self {
        Self { questions }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let questions = serde_json::from_str(content).context("failed to parse question store")?;
        Ok(Self::new(questions))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read question store: path = {}", path.display()))?;
        Self::from_json(&content)
    }
}

#[async_trait]
impl QuestionStore for JsonQuestionStore {
    async fn test_cases(&self, question_id: &str, language: &str) -> Result<Option<Vec<TestCase>>> {
        let question = self
            .questions
            .iter()
            .find(|q| q.matches(question_id, language));

        Ok(question.map(|q| {
            q.examples
                .iter()
                .cloned()
                .filter_map(Example::into_test_case)
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"[
        {"id": "12", "language": "python", "title": "reverse",
         "examples": [
            {"input": "abc\n", "output": "cba"},
            {"input": null, "output": null},
            {"output": "empty"}
         ]},
        {"id": "12", "language": "cpp", "examples": [{"input": "1 2", "output": "3"}]},
        {"id": "7", "examples": []}
    ]"#;

    #[tokio::test]
    async fn lookup_by_id_and_language() {
        let store = JsonQuestionStore::from_json(STORE).unwrap();

        let cases = store.test_cases("12", "python").await.unwrap().unwrap();
        assert_eq!(
            cases,
            vec![
                TestCase {
                    input: "abc\n".into(),
                    expected_output: "cba".into()
                },
                TestCase {
                    input: "".into(),
                    expected_output: "empty".into()
                },
            ]
        );

        let cases = store.test_cases("12", "cpp").await.unwrap().unwrap();
        assert_eq!(cases[0].expected_output, "3");

        assert!(store.test_cases("12", "java").await.unwrap().is_none());
        assert!(store.test_cases("99", "python").await.unwrap().is_none());

        // language-agnostic question without examples
        assert_eq!(store.test_cases("7", "java").await.unwrap(), Some(vec![]));
    }

    #[test]
    fn malformed_store() {
        assert!(JsonQuestionStore::from_json("{").is_err());
    }
}
