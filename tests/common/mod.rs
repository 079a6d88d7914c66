#![allow(dead_code)]

use tortoise::{EngineConfig, Judge, ProfileTable, Sandbox, SandboxConfig, SandboxOutput};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;

pub fn setup_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What one scripted sandbox call does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub launch_failed: bool,
    /// Directory the program leaves behind in the workspace.
    pub mkdir: Option<String>,
}

impl Script {
    pub fn exit(code: i32, stdout: &str) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            code: Some(tortoise::LAUNCH_FAILURE_CODE),
            stderr: "cannot connect to the docker daemon".into(),
            launch_failed: true,
            ..Default::default()
        }
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn mkdir(mut self, dir: &str) -> Self {
        self.mkdir = Some(dir.into());
        self
    }
}

/// A recorded sandbox call.
#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout_ms: Option<u64>,
    pub memory_mb: Option<u64>,
    pub workspace: PathBuf,
    pub files: Vec<String>,
    /// Everything readable in the workspace when the call started.
    pub contents: String,
}

type Behavior = dyn Fn(&[String], Option<&str>) -> Script + Send + Sync;

/// In-process stand-in for the container engine.
///
/// Honors the stdin/stdout redirects like the docker runner does, so the
/// pipeline reads produced output from the workspace.
pub struct ScriptedSandbox {
    behavior: Box<Behavior>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedSandbox {
    pub fn new<F>(behavior: F) -> Arc<Self>
    where
        F: Fn(&[String], Option<&str>) -> Script + Send + Sync + 'static,
    {
        Arc::new(Self {
            behavior: Box::new(behavior),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn workspaces(&self) -> HashSet<PathBuf> {
        self.calls().into_iter().map(|c| c.workspace).collect()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn run(&self, config: &SandboxConfig) -> SandboxOutput {
        let stdin = config
            .stdin
            .as_ref()
            .map(|p| fs::read_to_string(config.workspace.join(p)).unwrap());

        let mut files: Vec<String> = fs::read_dir(&config.workspace)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();

        let contents: String = files
            .iter()
            .filter_map(|f| fs::read_to_string(config.workspace.join(f)).ok())
            .collect();

        self.calls.lock().unwrap().push(Call {
            args: config.args.clone(),
            stdin: stdin.clone(),
            timeout_ms: config.timeout_ms,
            memory_mb: config.memory_mb,
            workspace: config.workspace.clone(),
            files,
            contents,
        });

        let script = (self.behavior)(&config.args, stdin.as_deref());

        if let Some(ref dir) = script.mkdir {
            fs::create_dir_all(config.workspace.join(dir).join("nested")).unwrap();
        }

        let stdout = match config.stdout {
            Some(ref path) if !script.launch_failed => {
                fs::write(config.workspace.join(path), &script.stdout).unwrap();
                String::new()
            }
            _ => script.stdout,
        };

        SandboxOutput {
            code: if script.timed_out { None } else { script.code },
            stdout,
            stderr: script.stderr,
            timed_out: script.timed_out,
            launch_failed: script.launch_failed,
            real_time: 1,
        }
    }
}

pub fn judge_with(sandbox: Arc<ScriptedSandbox>, root: &Path) -> Judge {
    setup_tracing();
    let config = EngineConfig {
        workspace_root: root.into(),
        ..Default::default()
    };
    Judge::new(sandbox, Arc::new(ProfileTable::builtin().clone()), config)
}

pub fn leaked(root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(root) {
        Ok(dir) => dir.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
