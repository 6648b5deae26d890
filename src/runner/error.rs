// ABOUTME: Runner error types with SNAFU pattern.
// ABOUTME: Only covers stories that could not be run; exit codes are not errors.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RunnerError {
    #[snafu(display("story '{story}' not found at {}", path.display()))]
    StoryNotFound { story: String, path: PathBuf },

    #[snafu(display("working directory for story '{story}' does not exist: {}", path.display()))]
    WorkingDirMissing { story: String, path: PathBuf },

    #[snafu(display("invalid story name '{story}'"))]
    InvalidStory { story: String },

    #[snafu(display("failed to start story '{story}': {source}"))]
    Spawn {
        story: String,
        source: std::io::Error,
    },

    #[snafu(display("failed waiting for story '{story}': {source}"))]
    Wait {
        story: String,
        source: std::io::Error,
    },
}
