use crate::cmd::Command;
use crate::config::EngineConfig;
use crate::profile::Profile;
use crate::workspace::Workspace;
use crate::Sandbox;

use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    /// Compiled, or nothing to compile.
    Ok,
    /// Compiler diagnostics, or a note that it timed out.
    CompileError(String),
    /// The sandbox could not run the compiler.
    Unavailable(String),
}

/// Runs the profile's compiler in the workspace.
///
/// The timeout is the engine's compile timeout, independent of the
/// per-test time limit.
#[tracing::instrument(level = "debug", skip_all, fields(language = %profile.language))]
pub async fn compile(
    sandbox: &dyn Sandbox,
    workspace: &Workspace,
    profile: &Profile,
    memory_mb: u64,
    config: &EngineConfig,
) -> CompileResult {
    let command = match profile.toolchain.compile_command() {
        Some(command) => command,
        None => return CompileResult::Ok,
    };

    let output = Command::new(&profile.image, workspace.path())
        .args(command.iter().cloned())
        .timeout_ms(config.compile_timeout_ms)
        .memory_mb(memory_mb)
        .cpus(config.cpus)
        .pids_limit(config.pids_limit)
        .output_limit(config.output_limit)
        .run(sandbox)
        .await;

    debug!(code = ?output.code, timed_out = output.timed_out, real_time = output.real_time);

    if output.launch_failed {
        return CompileResult::Unavailable(output.stderr);
    }

    if output.timed_out {
        info!("compile timed out");
        return CompileResult::CompileError("compile timed out".into());
    }

    if output.code != Some(0) {
        let stderr = if output.stderr.is_empty() {
            "compile failed".to_owned()
        } else {
            output.stderr
        };
        return CompileResult::CompileError(stderr);
    }

    CompileResult::Ok
}
