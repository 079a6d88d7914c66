use crate::SandboxOutput;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    /// The judge itself failed, not the submission.
    #[serde(rename = "ERROR")]
    Error,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompileError => "CE",
            Verdict::Error => "ERROR",
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareMode {
    /// Byte-for-byte after CRLF normalization.
    #[serde(rename = "exact")]
    Exact,
    /// Leading and trailing whitespace ignored.
    #[serde(rename = "trim")]
    Trim,
    /// Every whitespace run collapsed into one space, then trimmed.
    #[serde(rename = "ignoreWS")]
    IgnoreWhitespace,
}

impl Default for CompareMode {
    fn default() -> Self {
        CompareMode::Trim
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(CompareMode::Exact),
            "trim" => Ok(CompareMode::Trim),
            "ignoreWS" | "ignore-ws" => Ok(CompareMode::IgnoreWhitespace),
            _ => Err(format!("unknown compare mode: {}", s)),
        }
    }
}

/// Absent text normalizes to the empty string.
pub fn normalize<'a>(text: impl Into<Option<&'a str>>, mode: CompareMode) -> String {
    let text = match text.into() {
        Some(text) => text.replace("\r\n", "\n"),
        None => return String::new(),
    };

    match mode {
        CompareMode::Exact => text,
        CompareMode::Trim => text.trim().to_owned(),
        CompareMode::IgnoreWhitespace => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

pub fn compare(produced: &str, expected: &str, mode: CompareMode) -> Verdict {
    if normalize(produced, mode) == normalize(expected, mode) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Classifies one test run.
///
/// A timeout wins over everything else. A failing exit status only means
/// `RE` when nothing was written; otherwise the output is still compared.
pub fn classify(
    output: &SandboxOutput,
    produced: &str,
    expected: &str,
    mode: CompareMode,
) -> Verdict {
    if output.timed_out {
        Verdict::TimeLimitExceeded
    } else if output.code != Some(0) && produced.is_empty() {
        Verdict::RuntimeError
    } else {
        compare(produced, expected, mode)
    }
}

/// The first verdict that is not `AC`, in order.
pub fn aggregate<I>(verdicts: I) -> Verdict
where
    I: IntoIterator<Item = Verdict>,
{
    verdicts
        .into_iter()
        .find(|v| !v.is_accepted())
        .unwrap_or(Verdict::Accepted)
}
