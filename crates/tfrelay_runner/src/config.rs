//! Command configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Working directory of the process
    pub workdir: Option<PathBuf>,
    /// Environment variables merged into the inherited environment
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// The first argument, which for terraform is the subcommand.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Render the command line for logging.
    ///
    /// Values of `-var` arguments are elided since they may carry secrets.
    pub fn display(&self) -> String {
        let mut cmd = self.program.clone();
        let mut hide_next = false;
        for arg in &self.args {
            if hide_next {
                let name = arg.split('=').next().unwrap_or(arg);
                cmd.push_str(&format!(" '{}=***'", name));
                hide_next = false;
                continue;
            }
            if arg == "-var" {
                hide_next = true;
            }
            if arg.contains(' ') || arg.contains('=') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }
}

/// Run configuration with timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Whether to log output lines as they arrive
    pub stream_logs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            stream_logs: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout_seconds = 0;
        self
    }

    /// Enable or disable log streaming.
    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("terraform")
            .args(["plan", "-input=false"])
            .workdir("/work")
            .env("TF_IN_AUTOMATION", "1");

        assert_eq!(spec.subcommand(), Some("plan"));
        assert_eq!(spec.workdir, Some(PathBuf::from("/work")));
        assert_eq!(spec.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
    }

    #[test]
    fn test_display_hides_variable_values() {
        let spec = CommandSpec::new("terraform")
            .args(["apply", "-var", "password=hunter2"]);

        let shown = spec.display();
        assert!(shown.contains("password=***"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.timeout_seconds, 3600);
        assert_eq!(RunConfig::default().no_timeout().timeout_seconds, 0);
    }
}
