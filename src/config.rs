use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_OUTPUT_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Container CLI binary.
    pub docker: String,

    /// Parent directory of the per-submission workspaces.
    pub workspace_root: PathBuf,

    pub cpus: f64,

    pub pids_limit: u32,

    /// `uid:gid` inside the sandbox, `None` keeps the image default.
    pub user: Option<String>,

    pub output_limit: usize, // bytes per stream

    pub compile_timeout_ms: u64,

    pub run_timeout_ms: u64, // free-run only

    /// Added to the per-test limit to get the hard-kill deadline.
    pub grace_ms: u64,

    pub max_concurrency: usize,

    /// JSON file replacing the built-in language profiles.
    pub profiles: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            docker: "docker".into(),
            workspace_root: env::temp_dir(),
            cpus: 0.5,
            pids_limit: 64,
            user: Some("65534:65534".into()),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            compile_timeout_ms: 20_000,
            run_timeout_ms: 8_000,
            grace_ms: 500,
            max_concurrency: 4,
            profiles: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match lookup(key) {
                Some(value) => {
                    let value = value
                        .trim()
                        .parse::<T>()
                        .with_context(|| format!("invalid value for {}: {:?}", key, value))?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }

        let mut config = Self::default();

        if let Some(docker) = lookup("TORTOISE_DOCKER") {
            config.docker = docker;
        }
        if let Some(root) = lookup("TORTOISE_WORKSPACE_ROOT") {
            config.workspace_root = root.into();
        }
        if let Some(cpus) = parse(&lookup, "TORTOISE_CPUS")? {
            config.cpus = cpus;
        }
        if let Some(pids) = parse(&lookup, "TORTOISE_PIDS_LIMIT")? {
            config.pids_limit = pids;
        }
        if let Some(user) = lookup("TORTOISE_USER") {
            config.user = if user.is_empty() { None } else { Some(user) };
        }
        if let Some(limit) = parse(&lookup, "TORTOISE_OUTPUT_LIMIT")? {
            config.output_limit = limit;
        }
        if let Some(ms) = parse(&lookup, "TORTOISE_COMPILE_TIMEOUT_MS")? {
            config.compile_timeout_ms = ms;
        }
        if let Some(ms) = parse(&lookup, "TORTOISE_RUN_TIMEOUT_MS")? {
            config.run_timeout_ms = ms;
        }
        if let Some(ms) = parse(&lookup, "TORTOISE_GRACE_MS")? {
            config.grace_ms = ms;
        }
        if let Some(n) = parse(&lookup, "TORTOISE_MAX_CONCURRENCY")? {
            config.max_concurrency = n;
        }
        if let Some(path) = lookup("TORTOISE_PROFILES") {
            config.profiles = Some(path.into());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.docker.is_empty() {
            anyhow::bail!("docker binary must not be empty");
        }
        if self.cpus.is_nan() || self.cpus <= 0.0 {
            anyhow::bail!("cpus must be positive: cpus = {}", self.cpus);
        }
        if self.pids_limit == 0 {
            anyhow::bail!("pids limit must be at least 1");
        }
        if self.max_concurrency == 0 {
            anyhow::bail!("max concurrency must be at least 1");
        }
        if self.output_limit == 0 {
            anyhow::bail!("output limit must be at least 1 byte");
        }

        self.workspace_root = self
            .workspace_root
            .absolutize()
            .context("failed to absolutize workspace root")?
            .into_owned();

        Ok(())
    }
}
