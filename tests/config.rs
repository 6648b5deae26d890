// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, collected violations, env-sourced secrets, and discovery.

use std::time::Duration;
use wharf::config::*;
use wharf::deploy::DeploymentStatus;
use wharf::error::Error;

const SECRET: &str = "0123456789abcdef0123";

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let yaml = r#"
apps:
  - key: blog
    path: /var/www/blog
    triggers:
      - name: live
        event: push
        branch: main
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let app = config.apps.first();
        assert_eq!(app.key.as_str(), "blog");
        assert_eq!(app.name, "blog");
        assert_eq!(app.strategy, StrategyKind::Simple);
        assert!(app.repository.is_none());
        assert_eq!(app.triggers[0].story, "deploy");
        assert!(!app.triggers[0].approval.required);
        assert_eq!(config.settings.deploy_timeout, Duration::from_secs(30 * 60));
        assert!(config.approval_secret().unwrap().is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = format!(
            r##"
settings:
  stories_dir: /etc/wharf/stories
  state_file: /var/lib/wharf/state.json
  deploy_timeout: 10m
  approval_timeout: 30m
  approval_secret: "{SECRET}"

apps:
  - key: shop
    name: Shop
    repository: git@github.com:Acme/Shop.git
    path: /srv/shop
    strategy: advanced
    releases:
      keep: 3
      shared_dirs: [storage, public/uploads]
      shared_files: [.env]
    triggers:
      - name: staging
        event: push
        branch: develop
        story: deploy-staging
      - name: production
        event: release
        pattern: '^v\d+\.\d+\.\d+$'
        approval:
          required: true
          timeout: 2h
    notifications:
      - channel: slack
        target: "#deploys"
        events: [failed, success]
"##
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let app = config.apps.first();

        assert_eq!(app.name, "Shop");
        assert_eq!(app.repository.as_ref().unwrap().as_str(), "acme/shop");
        assert_eq!(app.strategy, StrategyKind::Advanced);
        assert_eq!(app.releases.effective_keep(), 3);
        assert_eq!(app.releases.shared_dirs, vec!["storage", "public/uploads"]);
        assert_eq!(app.current_path(), std::path::Path::new("/srv/shop/current"));

        let staging = app.trigger("staging").unwrap();
        assert_eq!(staging.story, "deploy-staging");
        assert!(staging.matches(EventKind::Push, "refs/heads/develop"));
        assert_eq!(staging.approval.timeout, Duration::from_secs(30 * 60));

        let production = app.trigger("production").unwrap();
        assert!(production.approval.required);
        assert_eq!(production.approval.timeout, Duration::from_secs(2 * 3600));
        assert!(production.matches(EventKind::Release, "refs/tags/v2.3.1"));

        let route = &app.notifications[0];
        assert_eq!(route.channel, NotifyChannel::Slack);
        assert!(route.wants(DeploymentStatus::Failed));
        assert!(!route.wants(DeploymentStatus::Queued));

        assert_eq!(config.settings.deploy_timeout, Duration::from_secs(600));
        assert_eq!(
            config.settings.state_file_path(),
            std::path::Path::new("/var/lib/wharf/state.json")
        );
        assert_eq!(config.approval_secret().unwrap().as_deref(), Some(SECRET));
    }

    #[test]
    fn empty_app_list_is_rejected() {
        assert!(Config::from_yaml("apps: []\n").is_err());
    }
}

mod validation {
    use super::*;

    fn violations(yaml: &str) -> (String, Vec<String>) {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidApp { app, violations }) => (app, violations),
            other => panic!("expected InvalidApp, got {other:?}"),
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let (app, found) = violations(
            r#"
apps:
  - key: shop
    path: "/srv/shop;rm -rf /"
    strategy: blue-green
    triggers:
      - name: a
        event: push
      - name: b
        event: release
        pattern: '^v(\d+$'
      - name: c
        event: tag
      - name: a
        event: push
        branch: main
"#,
        );

        assert_eq!(app, "shop");
        let text = found.join("\n");
        assert!(text.contains("unknown strategy 'blue-green'"), "{text}");
        assert!(text.contains("shell metacharacter ';'"), "{text}");
        assert!(text.contains("push triggers require a branch"), "{text}");
        assert!(text.contains("invalid tag pattern"), "{text}");
        assert!(text.contains("unsupported event kind 'tag'"), "{text}");
        assert!(text.contains("duplicate trigger name 'a'"), "{text}");
        assert!(found.len() >= 6);
    }

    #[test]
    fn release_trigger_needs_pattern() {
        let (_, found) = violations(
            r#"
apps:
  - key: shop
    path: /srv/shop
    triggers:
      - name: prod
        event: release
"#,
        );
        assert!(found[0].contains("release triggers require a pattern"));
    }

    #[test]
    fn zero_approval_timeout_is_rejected() {
        let (_, found) = violations(&format!(
            r#"
settings:
  approval_secret: "{SECRET}"
apps:
  - key: shop
    path: /srv/shop
    triggers:
      - name: prod
        event: push
        branch: main
        approval:
          required: true
          timeout: 0s
"#
        ));
        assert!(found[0].contains("approval timeout must be positive"));
    }

    #[test]
    fn shared_paths_must_stay_inside_app() {
        let (_, found) = violations(
            r#"
apps:
  - key: shop
    path: /srv/shop
    strategy: advanced
    releases:
      shared_dirs: ["../etc"]
"#,
        );
        assert!(found[0].contains("relative path below the app root"));
    }

    #[test]
    fn duplicate_app_keys_are_rejected() {
        let yaml = r#"
apps:
  - key: shop
    path: /srv/shop
  - key: shop
    path: /srv/shop2
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate app key 'shop'"));
    }

    #[test]
    fn approval_requires_a_secret() {
        let yaml = r#"
apps:
  - key: shop
    path: /srv/shop
    triggers:
      - name: prod
        event: push
        branch: main
        approval:
          required: true
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("approval_secret is required"));
    }
}

mod secrets {
    use super::*;

    const FROM_ENV: &str = r#"
settings:
  approval_secret:
    env: WHARF_TEST_SECRET
apps:
  - key: shop
    path: /srv/shop
"#;

    #[test]
    fn secret_is_read_from_env() {
        temp_env::with_var("WHARF_TEST_SECRET", Some(SECRET), || {
            let config = Config::from_yaml(FROM_ENV).unwrap();
            assert_eq!(config.approval_secret().unwrap().as_deref(), Some(SECRET));
        });
    }

    #[test]
    fn missing_env_secret_is_an_error() {
        temp_env::with_var_unset("WHARF_TEST_SECRET", || {
            let config = Config::from_yaml(FROM_ENV).unwrap();
            let err = config.approval_secret().unwrap_err();
            assert!(matches!(err, Error::MissingEnvVar(ref var) if var == "WHARF_TEST_SECRET"));
        });
    }

    #[test]
    fn short_secret_is_rejected() {
        temp_env::with_var("WHARF_TEST_SECRET", Some("short"), || {
            let config = Config::from_yaml(FROM_ENV).unwrap();
            assert!(config.approval_secret().is_err());
        });
    }
}

mod discovery {
    use super::*;

    #[test]
    fn discovers_wharf_yml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wharf.yml"),
            "apps:\n  - key: blog\n    path: /var/www/blog\n",
        )
        .unwrap();

        let config = Config::discover(dir.path()).unwrap();

        assert_eq!(config.apps.first().key.as_str(), "blog");
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn init_writes_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("shop"), false).unwrap();

        let again = init_config(dir.path(), Some("shop"), false).unwrap_err();
        assert!(matches!(again, Error::AlreadyExists(_)));

        temp_env::with_var("WHARF_APPROVAL_SECRET", Some(SECRET), || {
            let config = Config::discover(dir.path()).unwrap();
            assert_eq!(config.apps.first().key.as_str(), "shop");
        });
    }
}
