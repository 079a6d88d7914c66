use thiserror::Error;

/// Requests rejected before any workspace or container is created.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
    #[error("at least one test case is required")]
    NoTestCases,
    #[error("question `{0}` not found or has no examples stored")]
    QuestionNotFound(String),
    #[error("question store failed: {0:#}")]
    Store(anyhow::Error),
}
