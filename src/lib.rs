#![deny(clippy::all)]

mod cmd;
mod compile;
mod config;
mod docker;
mod error;
mod judge;
mod profile;
mod request;
mod signal;
mod store;
mod utils;
mod verdict;
mod workspace;

pub use crate::cmd::Command;
pub use crate::compile::{compile, CompileResult};
pub use crate::config::EngineConfig;
pub use crate::docker::{DockerSandbox, CONTAINER_WORKDIR};
pub use crate::error::JudgeError;
pub use crate::judge::{test_deadline_ms, Judge, MAX_TIME_LIMIT_MS, OUTPUT_FILE, STDIN_FILE};
pub use crate::profile::{Profile, ProfileTable, Toolchain};
pub use crate::request::{
    JudgeRequest, JudgeResult, RunRequest, RunResult, SubmitRequest, TestCase, TestResult,
};
pub use crate::store::{Example, JsonQuestionStore, QuestionStore, StoredQuestion};
pub use crate::utils::truncate_chars;
pub use crate::verdict::{aggregate, classify, compare, normalize, CompareMode, Verdict};
pub use crate::workspace::Workspace;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Exit code reported when the sandbox itself could not be started.
pub const LAUNCH_FAILURE_CODE: i32 = 127;

/// Default cap for each captured stream, in bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// One sandboxed invocation.
///
/// `args` is passed to the container as a discrete argument vector, never
/// through a shell. `stdin` and `stdout` name files relative to `workspace`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub image: String,

    pub args: Vec<String>,

    pub workspace: PathBuf,

    pub stdin: Option<PathBuf>,

    pub stdout: Option<PathBuf>,

    pub timeout_ms: Option<u64>, // milliseconds

    pub memory_mb: Option<u64>, // MiB

    pub cpus: Option<f64>,

    pub pids_limit: Option<u32>,

    pub output_limit: Option<usize>, // bytes per stream
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxOutput {
    /// `None` when the process was killed, either by the timeout or by a signal.
    pub code: Option<i32>,

    pub stdout: String,
    pub stderr: String,

    pub timed_out: bool,

    /// The sandbox engine could not run the command at all.
    pub launch_failed: bool,

    pub real_time: u64, // milliseconds
}

impl SandboxOutput {
    pub fn launch_failure(diagnostic: impl Into<String>) -> Self {
        Self {
            code: Some(LAUNCH_FAILURE_CODE),
            stderr: diagnostic.into(),
            launch_failed: true,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && !self.launch_failed && self.code == Some(0)
    }
}

/// An isolated execution engine.
///
/// `run` never fails: problems starting the sandbox are reported through
/// [`SandboxOutput::launch_failure`].
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, config: &SandboxConfig) -> SandboxOutput;

    /// Makes `image` available locally ahead of the first run.
    async fn prepare(&self, _image: &str) -> Result<()> {
        Ok(())
    }
}
