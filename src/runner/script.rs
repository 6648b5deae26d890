// ABOUTME: Runs story scripts from the stories directory as child processes.
// ABOUTME: Each story gets its own process group so timeouts kill its children too.

use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::error::{
    InvalidStorySnafu, SpawnSnafu, StoryNotFoundSnafu, WaitSnafu, WorkingDirMissingSnafu,
};
use super::{ProcessRunner, RunOutput, RunnerError, StoryInvocation};
use crate::config::is_story_name;
use crate::deploy::UNSTARTED_EXIT_CODE;

/// Discovers and runs stories from a directory.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    stories_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(stories_dir: &Path) -> Self {
        Self {
            stories_dir: stories_dir.to_path_buf(),
        }
    }

    pub fn story_exists(&self, story: &str) -> bool {
        is_story_name(story) && self.story_path(story).is_file()
    }

    fn story_path(&self, story: &str) -> PathBuf {
        self.stories_dir.join(story)
    }
}

#[async_trait]
impl ProcessRunner for ScriptRunner {
    async fn run(&self, invocation: &StoryInvocation) -> Result<RunOutput, RunnerError> {
        let story = invocation.story.as_str();
        ensure!(is_story_name(story), InvalidStorySnafu { story });

        let path = self.story_path(story);
        ensure!(path.is_file(), StoryNotFoundSnafu { story, path });
        if let Some(ref dir) = invocation.working_dir {
            ensure!(dir.is_dir(), WorkingDirMissingSnafu { story, path: dir });
        }

        tracing::info!(story, path = %path.display(), "running story");

        let mut command = Command::new(&path);
        command
            .envs(invocation.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = invocation.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().context(SpawnSnafu { story })?;
        let group = ProcessGroup::new(child.id());

        let output = child.wait_with_output().await.context(WaitSnafu { story })?;
        group.disarm();

        let result = RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: exit_code(&output.status),
        };

        if result.success() {
            tracing::info!(story, "story completed successfully");
        } else {
            tracing::warn!(story, exit_code = result.exit_code, "story failed");
        }

        Ok(result)
    }
}

/// Real exit code, else 128 + signal for a killed process.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    UNSTARTED_EXIT_CODE
}

/// Kills the story's process group when a run is abandoned.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            tracing::warn!(pgid, "terminating abandoned story process group");
            if let Err(e) = kill_group(pgid) {
                tracing::error!(pgid, error = %e, "failed to kill story process group");
            }
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> nix::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pgid).map_err(|_| Errno::EINVAL)?;
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // Group already exited.
        Err(Errno::ESRCH) => Ok(()),
        other => other,
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}
