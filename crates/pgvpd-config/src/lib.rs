//! Configuration resolution: defaults → TOML file → environment (`PGVPD_`
//! prefix) → CLI flags (§6).

pub mod cli;
pub mod config;
pub mod error;
pub mod raw;

pub use cli::{Cli, Command};
pub use config::{load, Config, PoolMode, ResolverConfig};
pub use error::{ConfigError, ConfigResult};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn serve(config: Option<&str>) -> Command {
        Command::Serve {
            config: config.map(str::to_string),
            port: None,
            admin_port: None,
            log_level: None,
        }
    }

    #[test]
    fn defaults_are_used_with_no_file_or_env() {
        let cfg = load(&serve(None), &HashMap::new()).unwrap();
        assert_eq!(cfg.listen_port, 6432);
        assert_eq!(cfg.tenant_separator, '.');
        assert_eq!(cfg.value_separator, ':');
        assert_eq!(cfg.superuser_bypass, vec!["postgres".to_string()]);
    }

    #[test]
    fn env_overrides_defaults() {
        let mut env = HashMap::new();
        env.insert("PGVPD_LISTEN_PORT".to_string(), "7000".to_string());
        let cfg = load(&serve(None), &env).unwrap();
        assert_eq!(cfg.listen_port, 7000);
    }

    #[test]
    fn cli_flag_overrides_env() {
        let mut env = HashMap::new();
        env.insert("PGVPD_LISTEN_PORT".to_string(), "7000".to_string());
        let cli = Command::Serve {
            config: None,
            port: Some(9999),
            admin_port: None,
            log_level: None,
        };
        let cfg = load(&cli, &env).unwrap();
        assert_eq!(cfg.listen_port, 9999);
    }

    #[test]
    fn file_parses_and_layers_below_env() {
        let dir = std::env::temp_dir().join(format!("pgvpd-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pgvpd.toml");
        std::fs::write(
            &path,
            r#"
            listen_port = 6000
            context_variables = ["app.current_tenant_id"]

            [[resolver]]
            name = "user_account"
            sql = "select id from accounts where ext_id = $1"
            params = ["app.current_tenant_id"]
            injects = [["id", "app.account_id"]]
            required = true
            "#,
        )
        .unwrap();

        let cfg = load(&serve(Some(path.to_str().unwrap())), &HashMap::new()).unwrap();
        assert_eq!(cfg.listen_port, 6000);
        assert_eq!(cfg.context_variables, vec!["app.current_tenant_id".to_string()]);
        assert_eq!(cfg.resolvers.len(), 1);
        assert_eq!(cfg.resolvers[0].name, "user_account");
        assert!(cfg.resolvers[0].required);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_multi_character_separator() {
        let dir = std::env::temp_dir().join(format!("pgvpd-config-test-sep-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pgvpd.toml");
        std::fs::write(&path, r#"tenant_separator = "--""#).unwrap();

        let result = load(&serve(Some(path.to_str().unwrap())), &HashMap::new());
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn session_pool_mode_requires_pool_password() {
        let dir = std::env::temp_dir().join(format!("pgvpd-config-test-pool-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pgvpd.toml");
        std::fs::write(&path, r#"pool_mode = "session""#).unwrap();

        let result = load(&serve(Some(path.to_str().unwrap())), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
