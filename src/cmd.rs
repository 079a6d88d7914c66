use crate::{Sandbox, SandboxConfig, SandboxOutput};

use std::path::PathBuf;

pub struct Command {
    pub config: SandboxConfig,
}

impl Command {
    pub fn new(image: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            config: SandboxConfig {
                image: image.into(),
                workspace: workspace.into(),
                ..Default::default()
            },
        }
    }

    pub async fn run(&self, sandbox: &dyn Sandbox) -> SandboxOutput {
        sandbox.run(&self.config).await
    }

    pub fn arg(&mut self, a: impl Into<String>) -> &mut Self {
        self.config.args.push(a.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.config.stdin = Some(path.into());
        self
    }

    pub fn stdout(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.config.stdout = Some(path.into());
        self
    }

    pub fn timeout_ms(&mut self, ms: u64) -> &mut Self {
        self.config.timeout_ms = Some(ms);
        self
    }

    pub fn memory_mb(&mut self, mb: u64) -> &mut Self {
        self.config.memory_mb = Some(mb);
        self
    }

    pub fn cpus(&mut self, cpus: f64) -> &mut Self {
        self.config.cpus = Some(cpus);
        self
    }

    pub fn pids_limit(&mut self, count: u32) -> &mut Self {
        self.config.pids_limit = Some(count);
        self
    }

    pub fn output_limit(&mut self, bytes: usize) -> &mut Self {
        self.config.output_limit = Some(bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argv_without_shell() {
        let mut cmd = Command::new("gcc:12", "/tmp/ws");
        cmd.args(vec!["g++", "code.cpp"])
            .arg("-o")
            .arg("code_exec")
            .stdin("stdin.txt")
            .timeout_ms(1500)
            .memory_mb(200);

        let config = &cmd.config;
        assert_eq!(config.image, "gcc:12");
        assert_eq!(config.args, ["g++", "code.cpp", "-o", "code_exec"]);
        assert_eq!(config.stdin, Some(PathBuf::from("stdin.txt")));
        assert_eq!(config.stdout, None);
        assert_eq!(config.timeout_ms, Some(1500));
        assert_eq!(config.memory_mb, Some(200));
        assert_eq!(config.cpus, None);
    }
}
