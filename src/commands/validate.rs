// ABOUTME: Validate command implementation.
// ABOUTME: Loads the configuration, resolves the approval secret, and lists triggers.

use std::path::Path;
use wharf::approval::TokenDigester;
use wharf::config::{Config, StrategyKind};
use wharf::error::Result;
use wharf::output::Output;
use wharf::runner::ScriptRunner;
use wharf::strategy::{HISTORY_STORY, ROLLBACK_STORY};

/// Validate the configuration. Missing story files are warnings, not errors.
pub fn validate(config: &Config, base: &Path, output: Output) -> Result<()> {
    if let Some(secret) = config.approval_secret()? {
        TokenDigester::new(secret.as_bytes())?;
    }
    let stories = ScriptRunner::new(&base.join(&config.settings.stories_dir));

    for app in config.apps.iter() {
        output.progress(&format!(
            "{} ({}) [{}] at {}",
            app.key,
            app.name,
            app.strategy,
            app.path.display()
        ));
        for trigger in &app.triggers {
            let approval = if trigger.approval.required {
                format!(", approval within {}s", trigger.approval.timeout.as_secs())
            } else {
                String::new()
            };
            output.progress(&format!(
                "  {}: {} {} -> story '{}'{approval}",
                trigger.name, trigger.event, trigger.matcher, trigger.story
            ));
        }

        let mut needed: Vec<&str> = app.triggers.iter().map(|t| t.story.as_str()).collect();
        if app.strategy == StrategyKind::Simple {
            needed.extend([ROLLBACK_STORY, HISTORY_STORY]);
        }
        needed.sort_unstable();
        needed.dedup();
        for story in needed {
            if !stories.story_exists(story) {
                output.warning(&format!("{}: story '{story}' not found", app.key));
            }
        }
    }

    output.success(&format!(
        "Configuration valid: {} app(s)",
        config.apps.len()
    ));
    Ok(())
}
