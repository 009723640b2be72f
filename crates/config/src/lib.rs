//! Configuration for edgesync.
//!
//! A [`Config`] is assembled once at startup from layered sources, lowest
//! precedence first:
//!
//! 1. built-in defaults,
//! 2. the per-user config file (`config.toml` in the platform config dir),
//! 3. `edgesync.toml` in the working directory,
//! 4. an explicitly requested file (TOML, YAML or JSON, by extension),
//! 5. the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` variables,
//! 6. `EDGESYNC_`-prefixed variables, `__` separating nested keys
//!    (`EDGESYNC_STORE__BUCKET=my-bucket`).
//!
//! The resulting value is validated and then passed by reference to every
//! component; nothing reads configuration from ambient state afterwards.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "edgesync.toml";
/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "EDGESYNC_";

pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_QUEUE_DEPTH: usize = 64;
/// Objects are declared immutable at the edge for one year.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_ACL: &str = "public-read";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Local directory to synchronize.
    pub source: PathBuf,
    pub store: StoreConfig,
    pub cdn: CdnConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Remote object store (S3 or S3-compatible).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    /// Key prefix inside the bucket; keys are relative to it.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    /// Total attempts per request, including the first.
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
}

/// Edge cache (CloudFront distribution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnConfig {
    pub distribution_id: String,
    /// Falls back to the store credentials when omitted.
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub key_secret: Option<String>,
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum number of uploads in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Changed files buffered between the scanner and the uploads.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// `Cache-Control` set on every uploaded object; empty to omit.
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    /// Canned ACL set on every uploaded object; empty to omit (buckets
    /// with ACLs disabled reject any ACL).
    #[serde(default = "default_acl")]
    pub acl: String,
}
impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            acl: DEFAULT_ACL.to_string(),
        }
    }
}
impl UploadConfig {
    pub fn cache_control(&self) -> Option<&str> {
        Some(self.cache_control.as_str()).filter(|s| !s.is_empty())
    }

    pub fn acl(&self) -> Option<&str> {
        Some(self.acl.as_str()).filter(|s| !s.is_empty())
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}
fn default_attempts() -> u32 {
    1
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}
fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}
fn default_acl() -> String {
    DEFAULT_ACL.to_string()
}

impl Config {
    /// Load, merge and validate configuration from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(explicit)?)
    }

    /// Assemble the layered sources without extracting them.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();
        if let Some(user) = user_config_file() {
            tracing::debug!(path = %user.display(), "Looking for user configuration");
            figment = figment.merge(Toml::file(user));
        }
        figment = figment.merge(Toml::file(LOCAL_CONFIG_FILE));
        if let Some(path) = explicit {
            figment = merge_file(figment, path)?;
        }
        Ok(figment
            .merge(Env::raw().only(&["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]).map(|key| {
                match key.as_str().eq_ignore_ascii_case("AWS_ACCESS_KEY_ID") {
                    true => "store.key_id".into(),
                    false => "store.key_secret".into(),
                }
            }))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the program relies on.
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("source directory must be set".to_string()));
        }
        if self.store.bucket.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("store.bucket must not be empty".to_string()));
        }
        if self.store.key_id.is_empty() || self.store.key_secret.is_empty() {
            exn::bail!(ErrorKind::Invalid("store credentials must not be empty".to_string()));
        }
        if self.cdn.distribution_id.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("cdn.distribution_id must not be empty".to_string()));
        }
        if self.upload.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("upload.concurrency must be at least 1".to_string()));
        }
        if self.upload.queue_depth == 0 {
            exn::bail!(ErrorKind::Invalid("upload.queue_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Credentials for the edge cache, falling back to the store's.
    pub fn cdn_credentials(&self) -> (&str, &str) {
        (
            self.cdn.key_id.as_deref().unwrap_or(&self.store.key_id),
            self.cdn.key_secret.as_deref().unwrap_or(&self.store.key_secret),
        )
    }
}

fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "edgesync").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Merge a file, picking the format from its extension.
fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
    }
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MINIMAL: &str = r#"
        source = "dist"

        [store]
        bucket = "my-bucket"
        key_id = "AKIDEXAMPLE"
        key_secret = "secret"

        [cdn]
        distribution_id = "E2QWRUHEXAMPLE"
    "#;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Toml::string(toml)))
    }

    #[test]
    fn test_defaults() {
        let config = from_toml(MINIMAL).unwrap();
        assert_eq!(config.source, PathBuf::from("dist"));
        assert_eq!(config.store.region, DEFAULT_REGION);
        assert_eq!(config.store.max_attempts, 1);
        assert_eq!(config.store.prefix, None);
        assert_eq!(config.upload, UploadConfig::default());
        assert_eq!(config.upload.concurrency, 20);
        assert_eq!(config.upload.cache_control(), Some("public, max-age=31536000, immutable"));
        assert_eq!(config.upload.acl(), Some("public-read"));
    }

    #[test]
    fn test_cdn_credentials_fall_back_to_store() {
        let config = from_toml(MINIMAL).unwrap();
        assert_eq!(config.cdn_credentials(), ("AKIDEXAMPLE", "secret"));
        let config = Config {
            cdn: CdnConfig {
                key_id: Some("CDNKEY".to_string()),
                key_secret: Some("cdn-secret".to_string()),
                ..config.cdn.clone()
            },
            ..config
        };
        assert_eq!(config.cdn_credentials(), ("CDNKEY", "cdn-secret"));
    }

    #[test]
    fn test_empty_acl_and_cache_control_are_omitted() {
        let toml = format!("{MINIMAL}\n[upload]\nacl = \"\"\ncache_control = \"\"\n");
        let config = from_toml(&toml).unwrap();
        assert_eq!(config.upload.acl(), None);
        assert_eq!(config.upload.cache_control(), None);
    }

    #[rstest]
    #[case("[upload]\nconcurrency = 0\n")]
    #[case("[upload]\nqueue_depth = 0\n")]
    fn test_invalid_upload_settings(#[case] extra: &str) {
        let toml = format!("{MINIMAL}\n{extra}");
        let err = from_toml(&toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_empty_bucket() {
        let toml = MINIMAL.replace("\"my-bucket\"", "\"  \"");
        let err = from_toml(&toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_missing_required_field() {
        let toml = MINIMAL.replace("distribution_id = \"E2QWRUHEXAMPLE\"", "");
        let err = from_toml(&toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[test]
    fn test_later_layers_override_earlier() {
        let figment = Figment::from(Toml::string(MINIMAL))
            .merge(Toml::string("[upload]\nconcurrency = 5\n[store]\nbucket = \"override\"\n"));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.upload.concurrency, 5);
        assert_eq!(config.store.bucket, "override");
        // Untouched keys survive the merge.
        assert_eq!(config.store.key_id, "AKIDEXAMPLE");
    }

    #[test]
    fn test_explicit_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.yml");
        std::fs::write(
            &path,
            "source: public\nstore:\n  bucket: yaml-bucket\n  key_id: id\n  key_secret: secret\ncdn:\n  distribution_id: EYAML\n",
        )
        .unwrap();
        let figment = merge_file(Figment::new(), &path).unwrap();
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.store.bucket, "yaml-bucket");
        assert_eq!(config.source, PathBuf::from("public"));
    }

    #[test]
    fn test_explicit_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.json");
        std::fs::write(
            &path,
            r#"{"source": "out", "store": {"bucket": "json-bucket", "key_id": "id", "key_secret": "s"}, "cdn": {"distribution_id": "EJSON"}}"#,
        )
        .unwrap();
        let config = Config::from_figment(merge_file(Figment::new(), &path).unwrap()).unwrap();
        assert_eq!(config.cdn.distribution_id, "EJSON");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.ini");
        std::fs::write(&path, "source = dist").unwrap();
        let err = merge_file(Figment::new(), &path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_file(Figment::new(), &dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
