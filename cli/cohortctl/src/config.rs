//! Configuration and credential storage.
//!
//! Both live as JSON files in the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Default API endpoint when neither flag, env nor file sets one.
const DEFAULT_API_URL: &str = "http://localhost:8080";

fn store_path(file: &str) -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "cohort", "cohort")
        .context("No home directory; cannot locate cohort config")?;
    Ok(dirs.config_dir().join(file))
}

/// Read a JSON file; a missing file is `None`.
fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Reading {what} at {}", path.display()))
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .with_context(|| format!("Parsing {what} at {}", path.display()))
}

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Placement API base URL.
    #[serde(default = "env_api_url")]
    pub api_url: String,

    /// Use the server's native batch endpoint instead of one call per candidate.
    #[serde(default)]
    pub batch_endpoint: bool,
}

fn env_api_url() -> String {
    std::env::var("COHORT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: env_api_url(),
            batch_endpoint: false,
        }
    }
}

impl Config {
    /// The config file, or defaults when there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&store_path(CONFIG_FILE)?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        Ok(read_json::<Self>(path, "config")?.unwrap_or_default())
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// Bearer token and what the server said about it at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Credentials {
    pub fn new(token: String) -> Self {
        Self {
            token,
            expires_at: None,
            user_id: None,
            email: None,
        }
    }

    /// Stored credentials, if any.
    pub fn load() -> Result<Option<Self>> {
        read_json(&store_path(CREDENTIALS_FILE)?, "credentials")
    }

    pub fn save(&self) -> Result<()> {
        let path = store_path(CREDENTIALS_FILE)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Creating config directory {}", dir.display()))?;
        }
        self.save_to(&path)
    }

    /// Write the file readable by the owner only (unix).
    fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;

        #[cfg(unix)]
        let written = {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .and_then(|mut file| file.write_all(&json))
        };
        #[cfg(not(unix))]
        let written = fs::write(path, &json);

        written.with_context(|| format!("Writing credentials to {}", path.display()))
    }

    /// Remove stored credentials; succeeds when there are none.
    pub fn delete() -> Result<()> {
        let path = store_path(CREDENTIALS_FILE)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Removing credentials at {}", path.display()))
            }
            _ => Ok(()),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}
