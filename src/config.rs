use serde::{Deserialize, Serialize};

use std::{env, fs, path::Path};

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Implicit TLS from connect time (port 465).
    #[default]
    Tls,
    /// Plain connect upgraded with STARTTLS (port 587).
    Starttls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_encryption: Encryption,
    // Sender address and authorization code. Either may be absent at load
    // time, sending fails until both are set.
    #[serde(default)]
    pub qq_email: Option<String>,
    #[serde(default)]
    pub qq_auth_code: Option<String>,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub app_env: Option<String>,
    #[serde(default)]
    pub verify_on_startup: bool,
}

fn default_smtp_host() -> String {
    "smtp.qq.com".to_string()
}

const fn default_smtp_port() -> u16 {
    465
}

const fn default_server_port() -> u16 {
    12889
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_encryption: Encryption::default(),
            qq_email: None,
            qq_auth_code: None,
            server_port: default_server_port(),
            app_env: None,
            verify_on_startup: false,
        }
    }
}

impl Config {
    pub fn sender(&self) -> Option<&str> {
        self.qq_email.as_deref().filter(|s| !s.is_empty())
    }

    pub fn auth_code(&self) -> Option<&str> {
        self.qq_auth_code.as_deref().filter(|s| !s.is_empty())
    }

    pub fn has_credentials(&self) -> bool {
        self.sender().is_some() && self.auth_code().is_some()
    }

    pub fn is_development(&self) -> bool {
        self.app_env
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("development"))
    }
}

fn load_from_env<I>(vars: I) -> Result<Config, Box<dyn std::error::Error>>
where
    I: IntoIterator<Item = (String, String)>,
{
    envy::from_iter(vars)
        .map_err(|e| format!("Failed to read configuration from environment: {e}").into())
}

/// `QQ_EMAIL` and `QQ_AUTH_CODE` set in the environment (or `.env`) take
/// precedence over the values in a config file.
fn apply_env_credentials<I>(mut config: Config, vars: I) -> Config
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "QQ_EMAIL" => {
                tracing::info!("QQ_EMAIL from environment overrides the config file");
                config.qq_email = Some(value);
            }
            "QQ_AUTH_CODE" => {
                tracing::info!("QQ_AUTH_CODE from environment overrides the config file");
                config.qq_auth_code = Some(value);
            }
            _ => {}
        }
    }
    config
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Retrieve env variable
    let config_path =
        env::var("MAIL_RELAY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    // Try config file
    if Path::new(&config_path).exists() {
        tracing::info!("Loading configuration from '{}'", config_path);
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        return Ok(apply_env_credentials(config, env::vars()));
    }

    // Fallback to environment variables
    tracing::info!(
        "Config file '{}' not found, loading configuration from environment variables",
        config_path
    );
    load_from_env(env::vars())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn yaml_with_only_credentials_uses_qq_defaults() {
        let cfg: Config =
            serde_yaml::from_str("qq_email: me@qq.com\nqq_auth_code: abcdefg\n").unwrap();

        assert_eq!(cfg.smtp_host, "smtp.qq.com");
        assert_eq!(cfg.smtp_port, 465);
        assert_eq!(cfg.smtp_encryption, Encryption::Tls);
        assert_eq!(cfg.server_port, 12889);
        assert!(cfg.has_credentials());
        assert!(!cfg.is_development());
    }

    #[test]
    fn yaml_overrides_every_field() {
        let yaml = "\
smtp_host: smtp.example.com
smtp_port: 587
smtp_encryption: starttls
qq_email: relay@example.com
qq_auth_code: secret
server_port: 8080
app_env: development
verify_on_startup: true
";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(cfg.smtp_host, "smtp.example.com");
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.smtp_encryption, Encryption::Starttls);
        assert_eq!(cfg.sender(), Some("relay@example.com"));
        assert_eq!(cfg.server_port, 8080);
        assert!(cfg.is_development());
        assert!(cfg.verify_on_startup);
    }

    #[test]
    fn env_vars_are_read_by_upper_case_name() {
        let cfg = load_from_env(vars(&[
            ("QQ_EMAIL", "me@qq.com"),
            ("QQ_AUTH_CODE", "abcdefg"),
            ("SERVER_PORT", "3000"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();

        assert_eq!(cfg.sender(), Some("me@qq.com"));
        assert_eq!(cfg.auth_code(), Some("abcdefg"));
        assert_eq!(cfg.server_port, 3000);
        assert_eq!(cfg.smtp_port, 465);
    }

    #[test]
    fn missing_credentials_still_load() {
        let cfg = load_from_env(vars(&[])).unwrap();

        assert!(cfg.sender().is_none());
        assert!(cfg.auth_code().is_none());
        assert!(!cfg.has_credentials());
        assert_eq!(cfg.server_port, 12889);
    }

    #[test]
    fn empty_credentials_count_as_missing() {
        let cfg = load_from_env(vars(&[("QQ_EMAIL", ""), ("QQ_AUTH_CODE", "")])).unwrap();

        assert!(!cfg.has_credentials());
    }

    #[test]
    fn env_credentials_override_file_values() {
        let file: Config =
            serde_yaml::from_str("qq_email: file@qq.com\nqq_auth_code: from-file\n").unwrap();

        let cfg = apply_env_credentials(
            file,
            vars(&[("QQ_AUTH_CODE", "from-env"), ("SERVER_PORT", "1")]),
        );

        assert_eq!(cfg.sender(), Some("file@qq.com"));
        assert_eq!(cfg.auth_code(), Some("from-env"));
        assert_eq!(cfg.server_port, 12889);
    }

    #[test]
    fn empty_env_credentials_keep_file_values() {
        let file: Config = serde_yaml::from_str("qq_email: file@qq.com\n").unwrap();

        let cfg = apply_env_credentials(file, vars(&[("QQ_EMAIL", "")]));

        assert_eq!(cfg.sender(), Some("file@qq.com"));
    }

    #[test]
    fn malformed_port_is_an_error() {
        let err = load_from_env(vars(&[("SERVER_PORT", "not-a-port")])).unwrap_err();

        assert!(err.to_string().contains("environment"));
    }
}
