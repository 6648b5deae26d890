// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates wharf.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::AppKey;

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, app: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let key = match app {
        Some(a) => AppKey::new(a).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => AppKey::new("my-app").map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };

    std::fs::write(&config_path, template_yaml(&key))?;

    Ok(())
}

fn template_yaml(key: &AppKey) -> String {
    format!(
        r#"settings:
  stories_dir: stories
  deploy_timeout: 30m
  approval_timeout: 1h
  approval_secret:
    env: WHARF_APPROVAL_SECRET

apps:
  - key: {key}
    name: {key}
    repository: github.com/example/{key}
    path: /var/www/{key}
    strategy: advanced
    releases:
      keep: 5
      shared_dirs: [storage]
      shared_files: [.env]
    triggers:
      - name: staging
        event: push
        branch: main
      - name: production
        event: release
        pattern: '^v\d+\.\d+\.\d+$'
        approval:
          required: true
          timeout: 2h
"#
    )
}
