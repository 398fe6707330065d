use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Runtime configuration. Everything has a compiled-in default, so the
/// daemon runs without any configuration file at all.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub http: HttpConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SmtpConfig {
    pub bind_addr: SocketAddr,
    /// Domain announced in the greeting and in HELO/EHLO replies.
    pub hostname: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_message_bytes: usize,
    pub max_recipients: usize,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:2525".parse().unwrap(),
            hostname: "fake".to_string(),
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            max_message_bytes: 1024 * 1024,
            max_recipients: 50,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }
}

pub fn read_config(config_file: PathBuf) -> Result<Config> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_advertised_surface() {
        let config = Config::default();
        assert_eq!(config.smtp.bind_addr.port(), 2525);
        assert_eq!(config.smtp.hostname, "fake");
        assert_eq!(config.smtp.max_message_bytes, 1024 * 1024);
        assert_eq!(config.smtp.max_recipients, 50);
        assert_eq!(config.http.bind_addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [smtp]
            bind_addr = "127.0.0.1:2626"
            "#,
        )
        .unwrap();
        assert_eq!(config.smtp.bind_addr.port(), 2626);
        assert_eq!(config.smtp.hostname, "fake");
        assert_eq!(config.http.bind_addr.port(), 8080);
    }
}
