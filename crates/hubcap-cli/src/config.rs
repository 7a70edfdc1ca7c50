//! CLI configuration file and precedence rules.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use hubcap::{Hubcap, HubcapBuilder};
use serde::{Deserialize, Serialize};

const KEY_ENV_VAR: &str = "HUBCAP_KEY";
const URL_ENV_VAR: &str = "HUBCAP_URL";

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub url: Option<String>,
    pub key: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Platform location of the config file.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "hubcap", "hubcap").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load a config file. A missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply overrides: flags first, then environment, then this file.
    pub fn resolve(
        mut self,
        url_flag: Option<String>,
        key_flag: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        if let Some(url) = url_flag.or_else(|| env(URL_ENV_VAR)) {
            self.url = Some(url);
        }
        if let Some(key) = key_flag.or_else(|| env(KEY_ENV_VAR)) {
            // A key given explicitly wins over a stored login.
            self.key = Some(key);
            self.email = None;
            self.password = None;
        }
        self
    }

    pub fn builder(&self) -> Result<HubcapBuilder> {
        let mut builder = Hubcap::builder();
        builder = match (&self.key, &self.email, &self.password) {
            (Some(key), None, None) => builder.key(key),
            (None, Some(email), Some(password)) => builder.login(email, password),
            (None, None, None) => bail!(
                "no credentials: pass --key, set {} or add a key to the config file",
                KEY_ENV_VAR
            ),
            _ => bail!("configure either a key or an email and password, not both"),
        };
        if let Some(url) = &self.url {
            builder = builder.server(url);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder)
    }
}
