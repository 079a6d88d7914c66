use crate::cmd::Command;
use crate::compile::{compile, CompileResult};
use crate::config::EngineConfig;
use crate::docker::DockerSandbox;
use crate::error::JudgeError;
use crate::profile::{Profile, ProfileTable};
use crate::request::{
    JudgeRequest, JudgeResult, RunRequest, RunResult, SubmitRequest, TestCase, TestResult,
};
use crate::store::QuestionStore;
use crate::verdict::classify;
use crate::workspace::Workspace;
use crate::Sandbox;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

pub const STDIN_FILE: &str = "stdin.txt";
pub const OUTPUT_FILE: &str = "out.txt";

/// Lower bound of the per-test time limit.
const MIN_TIME_LIMIT_MS: u64 = 200;

/// Upper bound of the per-test time limit.
pub const MAX_TIME_LIMIT_MS: u64 = 60_000;

/// Budget of the pass that makes sandbox-created directories removable.
const RECLAIM_TIMEOUT_MS: u64 = 10_000;

/// Hard-kill deadline of one test.
pub fn test_deadline_ms(time_limit_ms: u64, grace_ms: u64) -> u64 {
    time_limit_ms
        .clamp(MIN_TIME_LIMIT_MS, MAX_TIME_LIMIT_MS)
        .saturating_add(grace_ms)
}

/// Judges submissions, one workspace per submission.
///
/// Tests of one submission run strictly in order. Independent submissions
/// may be judged concurrently, up to `max_concurrency` at a time.
pub struct Judge {
    sandbox: Arc<dyn Sandbox>,
    profiles: Arc<ProfileTable>,
    config: EngineConfig,
    permits: Semaphore,
}

impl Judge {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        profiles: Arc<ProfileTable>,
        config: EngineConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrency.max(1));
        Self {
            sandbox,
            profiles,
            config,
            permits,
        }
    }

    /// A judge backed by docker, using the profile file from `config` if any.
    pub fn docker(config: EngineConfig) -> Result<Self> {
        let profiles = match config.profiles {
            Some(ref path) => ProfileTable::load(path)?,
            None => ProfileTable::builtin().clone(),
        };
        let sandbox = DockerSandbox::from_config(&config);
        Ok(Self::new(Arc::new(sandbox), Arc::new(profiles), config))
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetches every profile image so the first submission does not pay for it.
    pub async fn prepare_images(&self) -> Result<()> {
        for profile in self.profiles.iter() {
            info!(image = %profile.image, "preparing image");
            self.sandbox
                .prepare(&profile.image)
                .await
                .with_context(|| format!("failed to prepare image for {}", profile.language))?;
        }
        Ok(())
    }

    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        self.permits.acquire().await.ok()
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(language = %request.language, tests = request.test_cases.len())
    )]
    pub async fn judge(&self, request: &JudgeRequest) -> Result<JudgeResult, JudgeError> {
        let profile = self.profiles.resolve(&request.language)?;
        if request.test_cases.is_empty() {
            return Err(JudgeError::NoTestCases);
        }

        let _permit = match self.permit().await {
            Some(permit) => permit,
            None => return Ok(JudgeResult::error("judge is shutting down")),
        };

        let workspace = match Workspace::create(&self.config.workspace_root) {
            Ok(workspace) => workspace,
            Err(err) => {
                error!(?err, "failed to create workspace");
                return Ok(JudgeResult::error(format!("{:#}", err)));
            }
        };

        let result = self.judge_in(&workspace, profile, request).await;
        self.release(workspace, profile).await;

        info!(verdict = %result.verdict);
        Ok(result)
    }

    pub async fn judge_question(
        &self,
        store: &dyn QuestionStore,
        request: SubmitRequest,
    ) -> Result<JudgeResult, JudgeError> {
        let profile = self.profiles.resolve(&request.language)?;

        let test_cases = store
            .test_cases(&request.question_id, &profile.language)
            .await
            .map_err(JudgeError::Store)?
            .ok_or_else(|| JudgeError::QuestionNotFound(request.question_id.clone()))?;

        self.judge(&request.into_judge_request(test_cases)).await
    }

    async fn judge_in(
        &self,
        workspace: &Workspace,
        profile: &Profile,
        request: &JudgeRequest,
    ) -> JudgeResult {
        if let Err(err) = workspace
            .write(&profile.source_file, &request.source_code)
            .await
        {
            error!(?err, "failed to write source");
            return JudgeResult::error(format!("{:#}", err));
        }

        let compiled = compile(
            &*self.sandbox,
            workspace,
            profile,
            request.memory_limit_mb,
            &self.config,
        )
        .await;

        match compiled {
            CompileResult::Ok => {}
            CompileResult::CompileError(stderr) => return JudgeResult::compile_error(&stderr),
            CompileResult::Unavailable(message) => {
                error!(%message, "sandbox unavailable while compiling");
                return JudgeResult::error(message);
            }
        }

        let mut tests = Vec::with_capacity(request.test_cases.len());
        for (index, case) in request.test_cases.iter().enumerate() {
            match self.run_test(workspace, profile, request, index, case).await {
                Ok(result) => {
                    debug!(index, verdict = %result.verdict);
                    tests.push(result);
                }
                Err(err) => {
                    // the remaining tests would fail the same way
                    error!(index, ?err, "failed to run test");
                    tests.push(TestResult::error(index, &format!("{:#}", err)));
                    break;
                }
            }
        }

        JudgeResult::graded(tests)
    }

    async fn run_test(
        &self,
        workspace: &Workspace,
        profile: &Profile,
        request: &JudgeRequest,
        index: usize,
        case: &TestCase,
    ) -> Result<TestResult> {
        // the expected output never enters the workspace, the program could read it
        workspace.write(STDIN_FILE, &case.input).await?;
        workspace.remove(OUTPUT_FILE).await?;

        let deadline = test_deadline_ms(request.time_limit_ms, self.config.grace_ms);

        let output = Command::new(&profile.image, workspace.path())
            .args(profile.toolchain.run_command().iter().cloned())
            .stdin(STDIN_FILE)
            .stdout(OUTPUT_FILE)
            .timeout_ms(deadline)
            .memory_mb(request.memory_limit_mb)
            .cpus(self.config.cpus)
            .pids_limit(self.config.pids_limit)
            .output_limit(self.config.output_limit)
            .run(&*self.sandbox)
            .await;

        if output.launch_failed {
            anyhow::bail!("sandbox unavailable: {}", output.stderr);
        }

        let produced = workspace.read_lossy(OUTPUT_FILE).await.unwrap_or_default();
        let verdict = classify(&output, &produced, &case.expected_output, request.compare_mode);

        Ok(TestResult::new(
            index,
            verdict,
            output.code,
            &output.stderr,
            &produced,
        ))
    }

    /// Free-run: compile if needed, run once, return raw output.
    #[tracing::instrument(level = "info", skip_all, fields(language = %request.language))]
    pub async fn run_code(&self, request: &RunRequest) -> Result<RunResult, JudgeError> {
        let profile = self.profiles.resolve(&request.language)?;

        let _permit = match self.permit().await {
            Some(permit) => permit,
            None => return Ok(RunResult::failure("", "judge is shutting down")),
        };

        let workspace = match Workspace::create(&self.config.workspace_root) {
            Ok(workspace) => workspace,
            Err(err) => {
                error!(?err, "failed to create workspace");
                return Ok(RunResult::failure(format!("{:#}", err), "server tmpdir error"));
            }
        };

        let result = self.run_in(&workspace, profile, request).await;
        self.release(workspace, profile).await;
        Ok(result)
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        profile: &Profile,
        request: &RunRequest,
    ) -> RunResult {
        let mut files = vec![(profile.source_file.as_str(), request.source_code.as_str())];
        if let Some(ref stdin) = request.stdin {
            files.push((STDIN_FILE, stdin.as_str()));
        }
        if let Err(err) = workspace.populate(files).await {
            error!(?err, "failed to populate workspace");
            return RunResult::failure(format!("{:#}", err), "server error executing code");
        }

        let compiled = compile(
            &*self.sandbox,
            workspace,
            profile,
            request.memory_limit_mb,
            &self.config,
        )
        .await;

        match compiled {
            CompileResult::Ok => {}
            CompileResult::CompileError(stderr) => {
                return RunResult::failure(stderr, "compile failed")
            }
            CompileResult::Unavailable(message) => {
                return RunResult::failure(message, "sandbox unavailable")
            }
        }

        let mut cmd = Command::new(&profile.image, workspace.path());
        cmd.args(profile.toolchain.run_command().iter().cloned())
            .timeout_ms(self.config.run_timeout_ms)
            .memory_mb(request.memory_limit_mb)
            .cpus(self.config.cpus)
            .pids_limit(self.config.pids_limit)
            .output_limit(self.config.output_limit);
        if request.stdin.is_some() {
            cmd.stdin(STDIN_FILE);
        }

        let output = cmd.run(&*self.sandbox).await;

        let error = if output.launch_failed {
            warn!(stderr = %output.stderr, "sandbox unavailable");
            Some("sandbox unavailable".to_owned())
        } else if output.timed_out {
            Some("timeout".to_owned())
        } else {
            match output.code {
                Some(0) => None,
                Some(code) => Some(format!("exited with code {}", code)),
                None => Some("terminated by signal".to_owned()),
            }
        };

        RunResult {
            stdout: output.stdout,
            stderr: output.stderr,
            error,
        }
    }

    /// Disposes the workspace once the submission is done with it.
    ///
    /// Directories created inside the sandbox belong to the sandbox user and
    /// may be unremovable from the host, so they are opened up from inside a
    /// container first.
    async fn release(&self, workspace: Workspace, profile: &Profile) {
        let subdirs = workspace.subdirs().await;
        if !subdirs.is_empty() {
            debug!(?subdirs, "reclaiming sandbox-created directories");
            let output = Command::new(&profile.image, workspace.path())
                .args(vec!["chmod", "-R", "a+rwX", "--"])
                .args(subdirs)
                .timeout_ms(RECLAIM_TIMEOUT_MS)
                .cpus(self.config.cpus)
                .pids_limit(self.config.pids_limit)
                .output_limit(self.config.output_limit)
                .run(&*self.sandbox)
                .await;
            if !output.is_success() {
                warn!(code = ?output.code, stderr = %output.stderr, "reclaim pass failed");
            }
        }
        workspace.close().await;
    }
}
