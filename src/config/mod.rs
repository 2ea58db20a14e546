//! Configuration loading for nbstore.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::storage::Credentials;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "NBSTORE_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
}

/// Where notebooks live and how to reach them.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per bucket.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Prepended to every notebook id to form its object key.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Create the bucket on connect instead of failing when it is missing.
    #[serde(default)]
    pub create_bucket: bool,
}

fn default_root() -> String {
    ProjectDirs::from("", "", "nbstore").map_or_else(
        || "./nbstore-data".to_string(),
        |dirs| dirs.data_dir().display().to_string(),
    )
}

fn default_bucket() -> String {
    "notebooks".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            bucket: default_bucket(),
            prefix: String::new(),
            access_key_id: None,
            secret_access_key: None,
            create_bucket: false,
        }
    }
}

impl StoreConfig {
    /// Credentials to connect with.
    ///
    /// Unless both keys are present and non-blank the store is told to use
    /// its ambient credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        match (
            present(&self.access_key_id),
            present(&self.secret_access_key),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Credentials::Static {
                access_key_id,
                secret_access_key,
            },
            _ => Credentials::Ambient,
        }
    }

    /// The bucket root with `~` expanded.
    #[must_use]
    pub fn root_path(&self) -> PathBuf {
        expand_tilde(&self.root)
    }
}

impl Config {
    /// Load config from `$NBSTORE_CONFIG` or ~/.config/nbstore/config.toml,
    /// or return defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Load config from an explicit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }

        ProjectDirs::from("", "", "nbstore").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Expand ~ to the user's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> StoreConfig {
        toml::from_str::<Config>(toml_text).unwrap().store
    }

    mod credentials_tests {
        use super::*;

        #[test]
        fn absent_keys_mean_ambient() {
            assert_eq!(parse("[store]\n").credentials(), Credentials::Ambient);
        }

        #[test]
        fn empty_strings_mean_ambient() {
            let store = parse("[store]\naccess_key_id = \"\"\nsecret_access_key = \"\"\n");
            assert_eq!(store.credentials(), Credentials::Ambient);
        }

        #[test]
        fn one_key_alone_means_ambient() {
            let store = parse("[store]\naccess_key_id = \"AKID\"\n");
            assert_eq!(store.credentials(), Credentials::Ambient);
        }

        #[test]
        fn both_keys_are_static() {
            let store =
                parse("[store]\naccess_key_id = \" AKID \"\nsecret_access_key = \"s3cret\"\n");
            assert_eq!(
                store.credentials(),
                Credentials::Static {
                    access_key_id: "AKID".to_string(),
                    secret_access_key: "s3cret".to_string(),
                }
            );
        }
    }

    #[test]
    fn defaults_apply_to_missing_table() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.bucket, "notebooks");
        assert_eq!(config.store.prefix, "");
        assert!(!config.store.create_bucket);
    }

    #[test]
    fn reads_all_store_fields() {
        let store = parse(
            "[store]\nroot = \"/srv/nb\"\nbucket = \"team\"\nprefix = \"nb/\"\ncreate_bucket = true\n",
        );
        assert_eq!(store.root_path(), PathBuf::from("/srv/nb"));
        assert_eq!(store.bucket, "team");
        assert_eq!(store.prefix, "nb/");
        assert!(store.create_bucket);
    }

    #[test]
    fn expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(expand_tilde("rel/x"), PathBuf::from("rel/x"));
    }
}
