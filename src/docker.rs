use crate::config::EngineConfig;
use crate::signal;
use crate::utils::{is_contained, lossy};
use crate::{Sandbox, SandboxConfig, SandboxOutput, DEFAULT_OUTPUT_LIMIT};

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use path_absolutize::Absolutize;
use scopeguard::{guard, ScopeGuard};
use tokio::io::{self, AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::{fs, time};
use tracing::{trace, warn};

/// Mount point of the workspace inside every container.
pub const CONTAINER_WORKDIR: &str = "/work";

/// How long the output pipes may stay open after the process is gone.
const CAPTURE_GRACE: Duration = Duration::from_secs(1);

/// Sandbox runner backed by the docker CLI.
///
/// Each run gets a fresh container with no network, a read-only root, all
/// capabilities dropped and only the workspace bound read-write. The
/// container is created and started in two steps so that a failing engine
/// is never confused with a program exit status.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    docker: String,
    user: Option<String>,
}

impl DockerSandbox {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            user: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            docker: config.docker.clone(),
            user: config.user.clone(),
        }
    }

    /// Runs the container as `uid:gid` instead of the image default.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn create_args(&self, config: &SandboxConfig, name: &str, workspace: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "create".into(),
            "--interactive".into(),
            "--name".into(),
            name.into(),
            "--pull".into(),
            "never".into(),
            "--network".into(),
            "none".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--read-only".into(),
            "--tmpfs".into(),
            "/tmp:rw,size=64m".into(),
        ];

        if let Some(mb) = config.memory_mb {
            args.push("--memory".into());
            args.push(format!("{}m", mb));
            args.push("--memory-swap".into());
            args.push(format!("{}m", mb));
        }
        if let Some(cpus) = config.cpus {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
        if let Some(pids) = config.pids_limit {
            args.push("--pids-limit".into());
            args.push(pids.to_string());
        }
        if let Some(ref user) = self.user {
            args.push("--user".into());
            args.push(user.clone());
        }

        args.push("--volume".into());
        args.push(format!("{}:{}:rw", workspace.display(), CONTAINER_WORKDIR));
        args.push("--workdir".into());
        args.push(CONTAINER_WORKDIR.into());

        args.push(config.image.clone());
        args.extend(config.args.iter().cloned());
        args
    }

    #[tracing::instrument(level = "debug", err, skip(self, config), fields(nonce))]
    async fn execute(&self, config: &SandboxConfig) -> Result<SandboxOutput> {
        let nonce: u32 = rand::random();
        tracing::Span::current().record("nonce", &nonce);

        trace!(?config);

        validate(config)?;

        let workspace: PathBuf = config
            .workspace
            .absolutize()
            .context("failed to absolutize workspace path")?
            .into_owned();

        let name = format!("tortoise_{:08x}", nonce);

        let created = Command::new(&self.docker)
            .args(&self.create_args(config, &name, &workspace))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn `{}`", self.docker))?;

        if !created.status.success() {
            let stderr = lossy(created.stderr);
            warn!(code = ?created.status.code(), %stderr, "failed to create container");
            return Ok(SandboxOutput::launch_failure(stderr));
        }

        // dropping this future mid-run must not leave the container behind
        let remover = guard(name.clone(), |name| {
            signal::remove_detached(&self.docker, &name)
        });

        let output = self.start(config, &name, &workspace).await;

        signal::remove_container(&self.docker, &name).await;
        ScopeGuard::into_inner(remover);

        output
    }

    async fn start(
        &self,
        config: &SandboxConfig,
        name: &str,
        workspace: &Path,
    ) -> Result<SandboxOutput> {
        let stdin = match config.stdin {
            Some(ref path) => {
                let path = workspace.join(path);
                let file = File::open(&path)
                    .with_context(|| format!("failed to open stdin file: {}", path.display()))?;
                Stdio::from(file)
            }
            None => Stdio::null(),
        };

        let t0 = Instant::now();

        let mut child = Command::new(&self.docker)
            .args(&["start", "--attach", "--interactive", name])
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.docker))?;

        let limit = config.output_limit.unwrap_or(DEFAULT_OUTPUT_LIMIT);
        let stdout = child.stdout.take().context("failed to open stdout")?;
        let stderr = child.stderr.take().context("failed to open stderr")?;
        let stdout_task = tokio::spawn(capture(stdout, limit));
        let stderr_task = tokio::spawn(capture(stderr, limit));

        let waited = match config.timeout_ms {
            Some(ms) => time::timeout(Duration::from_millis(ms), child.wait())
                .await
                .ok(),
            None => Some(child.wait().await),
        };

        let timed_out = match waited {
            Some(status) => {
                status.context("failed to wait for docker")?;
                false
            }
            None => {
                trace!("time limit exceeded, removing container");
                signal::remove_container(&self.docker, name).await;
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill docker client");
                }
                true
            }
        };
        let real_time = t0.elapsed().as_millis() as u64;

        let stdout = join_capture(stdout_task).await?;
        let stderr = lossy(join_capture(stderr_task).await?);

        // the exit status of the client is not the exit status of the program
        let code = if timed_out {
            None
        } else {
            Some(self.exit_code(name).await?)
        };

        trace!(?code, timed_out, real_time);

        let stdout = match config.stdout {
            Some(ref path) => {
                let path = workspace.join(path);
                fs::write(&path, &stdout)
                    .await
                    .with_context(|| format!("failed to write stdout file: {}", path.display()))?;
                String::new()
            }
            None => lossy(stdout),
        };

        Ok(SandboxOutput {
            code,
            stdout,
            stderr,
            timed_out,
            launch_failed: false,
            real_time,
        })
    }

    async fn exit_code(&self, name: &str) -> Result<i32> {
        let inspected = Command::new(&self.docker)
            .args(&["inspect", "--format", "{{.State.ExitCode}}", name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn `{}`", self.docker))?;

        if !inspected.status.success() {
            anyhow::bail!(
                "failed to inspect container {}: {}",
                name,
                String::from_utf8_lossy(&inspected.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&inspected.stdout);
        text.trim()
            .parse()
            .with_context(|| format!("unexpected exit code from inspect: {:?}", text.trim()))
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(&self, config: &SandboxConfig) -> SandboxOutput {
        match self.execute(config).await {
            Ok(output) => output,
            Err(err) => SandboxOutput::launch_failure(format!("{:#}", err)),
        }
    }

    async fn prepare(&self, image: &str) -> Result<()> {
        let output = Command::new(&self.docker)
            .args(&["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to spawn `{}`", self.docker))?;

        if !output.status.success() {
            anyhow::bail!(
                "failed to pull image {}: {}",
                image,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn validate(config: &SandboxConfig) -> Result<()> {
    if config.image.is_empty() {
        anyhow::bail!("image must not be empty");
    }

    if config.args.is_empty() {
        anyhow::bail!("command must not be empty");
    }

    if !config.workspace.is_dir() {
        anyhow::bail!(
            "workspace is not a directory: path = {}",
            config.workspace.display()
        );
    }

    // `--volume` uses `:` as its separator
    if config.workspace.to_string_lossy().contains(':') {
        anyhow::bail!(
            "workspace path must not contain `:`: path = {}",
            config.workspace.display()
        );
    }

    for path in config.stdin.iter().chain(config.stdout.iter()) {
        if !is_contained(path) {
            anyhow::bail!(
                "redirect path must be relative to the workspace: path = {}",
                path.display()
            );
        }
    }

    if let Some(cpus) = config.cpus {
        if cpus.is_nan() || cpus <= 0.0 {
            anyhow::bail!("cpus must be positive: cpus = {}", cpus);
        }
    }

    Ok(())
}

/// Reads at most `limit` bytes, then drains the rest so the writer never blocks.
async fn capture<R>(mut reader: R, limit: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    io::copy(&mut reader, &mut io::sink()).await?;
    Ok(buf)
}

/// A descendant of the client may keep a pipe open after the client is gone.
async fn join_capture(mut task: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match time::timeout(CAPTURE_GRACE, &mut task).await {
        Ok(joined) => Ok(joined.context("output capture panicked")??),
        Err(_) => {
            task.abort();
            warn!("output pipe still open after exit, discarding");
            Ok(Vec::new())
        }
    }
}
