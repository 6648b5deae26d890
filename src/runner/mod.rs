// ABOUTME: Process runner seam: executes a named story with parameters.
// ABOUTME: Dropping an in-flight run terminates the whole process group.

mod error;
mod script;

pub use error::RunnerError;
pub use script::ScriptRunner;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Prefix for environment variables handed to stories.
pub const ENV_PREFIX: &str = "WHARF_";

/// A story to run, its parameters, and where to run it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryInvocation {
    pub story: String,
    pub params: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl StoryInvocation {
    pub fn new(story: impl Into<String>) -> Self {
        Self {
            story: story.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Parameters as `WHARF_<KEY>` environment variables.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(key, value)| {
                let name = key
                    .chars()
                    .map(|c| {
                        if c.is_ascii_alphanumeric() {
                            c.to_ascii_uppercase()
                        } else {
                            '_'
                        }
                    })
                    .collect::<String>();
                (format!("{ENV_PREFIX}{name}"), value.clone())
            })
            .collect()
    }
}

/// Captured result of a finished story.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let sep = if self.stdout.ends_with('\n') { "" } else { "\n" };
                format!("{}{sep}{}", self.stdout, self.stderr)
            }
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. Errors mean the process never ran; a non-zero
    /// exit is reported through `RunOutput::exit_code`.
    async fn run(&self, invocation: &StoryInvocation) -> Result<RunOutput, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_become_prefixed_env_vars() {
        let invocation = StoryInvocation::new("deploy")
            .param("ref", "main")
            .param("release-path", "/srv/app/releases/r1");

        let env = invocation.to_env();
        assert_eq!(env.get("WHARF_REF").map(String::as_str), Some("main"));
        assert_eq!(
            env.get("WHARF_RELEASE_PATH").map(String::as_str),
            Some("/srv/app/releases/r1")
        );
    }

    #[test]
    fn combined_output_joins_streams() {
        let output = RunOutput {
            stdout: "built".into(),
            stderr: "warning: cache cold".into(),
            exit_code: 0,
        };
        assert_eq!(output.combined(), "built\nwarning: cache cold");
        assert!(output.success());
    }
}
