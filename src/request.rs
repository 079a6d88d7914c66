use crate::utils::truncate_chars;
use crate::verdict::{aggregate, CompareMode, Verdict};

use serde::{Deserialize, Serialize};

/// Produced output kept per test in results, in characters.
pub const PRODUCED_OUTPUT_LIMIT: usize = 2000;

/// Stderr kept per test and for compile errors, in characters.
pub const STDERR_LIMIT: usize = 4000;

fn default_time_limit_ms() -> u64 {
    2000
}

fn default_memory_limit_mb() -> u64 {
    200
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    pub language: String,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(rename = "memoryLimitMB", default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub compare_mode: CompareMode,
}

impl JudgeRequest {
    pub fn new(
        language: impl Into<String>,
        source_code: impl Into<String>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            test_cases,
            time_limit_ms: default_time_limit_ms(),
            memory_limit_mb: default_memory_limit_mb(),
            compare_mode: CompareMode::default(),
        }
    }
}

/// Judge against the examples of a stored question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub language: String,
    pub source_code: String,
    pub question_id: String,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(rename = "memoryLimitMB", default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub compare_mode: CompareMode,
}

impl SubmitRequest {
    pub fn into_judge_request(self, test_cases: Vec<TestCase>) -> JudgeRequest {
        JudgeRequest {
            language: self.language,
            source_code: self.source_code,
            test_cases,
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
            compare_mode: self.compare_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub index: usize,
    pub verdict: Verdict,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub produced_output: String,
}

impl TestResult {
    pub fn new(
        index: usize,
        verdict: Verdict,
        exit_code: Option<i32>,
        stderr: &str,
        produced_output: &str,
    ) -> Self {
        Self {
            index,
            verdict,
            exit_code,
            stderr: truncate_chars(stderr, STDERR_LIMIT),
            produced_output: truncate_chars(produced_output, PRODUCED_OUTPUT_LIMIT),
        }
    }

    pub fn error(index: usize, message: &str) -> Self {
        Self::new(index, Verdict::Error, None, message, "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_stderr: Option<String>,
    /// Infrastructure diagnostics when the verdict is `ERROR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub tests: Vec<TestResult>,
}

impl JudgeResult {
    pub fn graded(tests: Vec<TestResult>) -> Self {
        Self {
            verdict: aggregate(tests.iter().map(|t| t.verdict)),
            compile_stderr: None,
            message: None,
            tests,
        }
    }

    pub fn compile_error(stderr: &str) -> Self {
        Self {
            verdict: Verdict::CompileError,
            compile_stderr: Some(truncate_chars(stderr, STDERR_LIMIT)),
            message: None,
            tests: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            compile_stderr: None,
            message: Some(message.into()),
            tests: Vec::new(),
        }
    }
}

/// Free-run: execute once and hand back the raw output, no grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub language: String,
    pub source_code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(rename = "memoryLimitMB", default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
}

impl RunRequest {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            stdin: None,
            memory_limit_mb: default_memory_limit_mb(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn failure(stderr: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request: JudgeRequest = serde_json::from_str(
            r#"{"language": "python", "sourceCode": "print(input()[::-1])",
                "testCases": [{"input": "abc\n", "expectedOutput": "cba"}]}"#,
        )
        .unwrap();
        assert_eq!(request.time_limit_ms, 2000);
        assert_eq!(request.memory_limit_mb, 200);
        assert_eq!(request.compare_mode, CompareMode::Trim);
        assert_eq!(request.test_cases[0].expected_output, "cba");
    }

    #[test]
    fn memory_limit_key() {
        let request: JudgeRequest = serde_json::from_str(
            r#"{"language": "cpp", "sourceCode": "", "testCases": [],
                "timeLimitMs": 1000, "memoryLimitMB": 512, "compareMode": "ignoreWS"}"#,
        )
        .unwrap();
        assert_eq!(request.memory_limit_mb, 512);
        assert_eq!(request.compare_mode, CompareMode::IgnoreWhitespace);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["memoryLimitMB"], 512);
        assert!(json.get("memoryLimitMb").is_none());

        let submit: SubmitRequest = serde_json::from_str(
            r#"{"language": "python", "sourceCode": "", "questionId": "12", "memoryLimitMB": 64}"#,
        )
        .unwrap();
        assert_eq!(submit.memory_limit_mb, 64);

        let run: RunRequest = serde_json::from_str(
            r#"{"language": "python", "sourceCode": "", "memoryLimitMB": 32}"#,
        )
        .unwrap();
        assert_eq!(run.memory_limit_mb, 32);
    }

    #[test]
    fn result_shape() {
        let result = JudgeResult::graded(vec![
            TestResult::new(0, Verdict::Accepted, Some(0), "", "cba\n"),
            TestResult::new(1, Verdict::WrongAnswer, Some(0), "", "abc\n"),
        ]);
        assert_eq!(result.verdict, Verdict::WrongAnswer);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["verdict"], "WA");
        assert!(json.get("compileStderr").is_none());
        assert_eq!(json["tests"][0]["producedOutput"], "cba\n");
        assert_eq!(json["tests"][1]["exitCode"], 0);

        let ce = serde_json::to_value(&JudgeResult::compile_error("oops")).unwrap();
        assert_eq!(ce["verdict"], "CE");
        assert_eq!(ce["compileStderr"], "oops");
        assert_eq!(ce["tests"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn diagnostics_are_truncated() {
        let long = "x".repeat(10_000);
        let t = TestResult::new(0, Verdict::RuntimeError, Some(1), &long, &long);
        assert_eq!(t.stderr.chars().count(), STDERR_LIMIT);
        assert_eq!(t.produced_output.chars().count(), PRODUCED_OUTPUT_LIMIT);

        let ce = JudgeResult::compile_error(&long);
        assert_eq!(ce.compile_stderr.unwrap().len(), STDERR_LIMIT);
    }

    #[test]
    fn run_result_omits_missing_error() {
        let ok = RunResult {
            stdout: "hi\n".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["stdout"], "hi\n");
    }
}
