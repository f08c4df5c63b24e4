//! Filesystem layer configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Mode for newly created directories (`rwxr-x---`).
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o750;

/// Mode for newly created files (`rw-r-----`).
pub const DEFAULT_FILE_MODE: u32 = 0o640;

/// Owner assigned to new files and directories unless the caller says otherwise.
pub const DEFAULT_OWNER_UID: u32 = 11042;

/// Size of each scratch buffer handed out by the buffer pool.
pub const POOL_BUFFER_SIZE: usize = 64 * 1024;

/// Number of idle buffers the pool retains.
pub const POOL_CAPACITY: usize = 128;

/// Extended attribute holding a per-file confidentiality label.
pub const SENSITIVITY_XATTR: &str = "user.sensitivity";

/// Which backend services filesystem calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Probe the platform once and pick native when available.
    #[default]
    Auto,
    /// Descriptor-chained native syscalls (Linux only).
    Native,
    /// Portable std::fs calls with symlink rejection.
    Portable,
}

/// Configuration for the filesystem layer.
///
/// Constructed once and handed to the filesystem at startup; nothing in the
/// layer reads process-wide toggles.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct FsConfig {
    /// Backend selection.
    #[builder(default)]
    #[serde(default)]
    pub backend: BackendKind,

    /// Skip every chown call (for environments without CAP_CHOWN).
    #[builder(default = "false")]
    #[serde(default)]
    pub disable_chown: bool,

    /// Owner applied to newly created entries when the caller does not pass one.
    #[builder(default = "Some(DEFAULT_OWNER_UID)")]
    #[serde(default = "default_owner")]
    pub default_owner: Option<u32>,

    /// Mode for created directories.
    #[builder(default = "DEFAULT_DIRECTORY_MODE")]
    #[serde(default = "default_directory_mode")]
    pub directory_mode: u32,

    /// Mode for created files.
    #[builder(default = "DEFAULT_FILE_MODE")]
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,

    /// Size of each pooled scratch buffer.
    #[builder(default = "POOL_BUFFER_SIZE")]
    #[serde(default = "default_pool_buffer_size")]
    pub pool_buffer_size: usize,

    /// Maximum number of idle pooled buffers.
    #[builder(default = "POOL_CAPACITY")]
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Extended attribute read as the sensitivity label on stat.
    #[builder(default = "SENSITIVITY_XATTR.to_string()")]
    #[serde(default = "default_sensitivity_attribute")]
    pub sensitivity_attribute: String,
}

fn default_owner() -> Option<u32> {
    Some(DEFAULT_OWNER_UID)
}

fn default_directory_mode() -> u32 {
    DEFAULT_DIRECTORY_MODE
}

fn default_file_mode() -> u32 {
    DEFAULT_FILE_MODE
}

fn default_pool_buffer_size() -> usize {
    POOL_BUFFER_SIZE
}

fn default_pool_capacity() -> usize {
    POOL_CAPACITY
}

fn default_sensitivity_attribute() -> String {
    SENSITIVITY_XATTR.to_string()
}

impl FsConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.pool_buffer_size == Some(0) {
            return Err("Pool buffer size must be greater than zero".to_string());
        }
        if self.pool_capacity == Some(0) {
            return Err("Pool capacity must be greater than zero".to_string());
        }
        for mode in [self.directory_mode, self.file_mode].into_iter().flatten() {
            if mode > 0o7777 {
                return Err(format!("Invalid permission bits: {mode:o}"));
            }
        }
        Ok(())
    }
}

impl FsConfig {
    /// Create a new config builder.
    pub fn builder() -> FsConfigBuilder {
        FsConfigBuilder::default()
    }

    /// Config for unprivileged use: no chown and no default owner.
    pub fn unprivileged() -> Self {
        Self {
            disable_chown: true,
            default_owner: None,
            ..Self::default()
        }
    }

    /// Same config with a different backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            disable_chown: false,
            default_owner: Some(DEFAULT_OWNER_UID),
            directory_mode: DEFAULT_DIRECTORY_MODE,
            file_mode: DEFAULT_FILE_MODE,
            pool_buffer_size: POOL_BUFFER_SIZE,
            pool_capacity: POOL_CAPACITY,
            sensitivity_attribute: SENSITIVITY_XATTR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = FsConfig::builder()
            .backend(BackendKind::Portable)
            .disable_chown(true)
            .pool_capacity(4usize)
            .build()
            .unwrap();

        assert_eq!(config.backend, BackendKind::Portable);
        assert!(config.disable_chown);
        assert_eq!(config.pool_capacity, 4);
        assert_eq!(config.pool_buffer_size, POOL_BUFFER_SIZE);
        assert_eq!(config.default_owner, Some(DEFAULT_OWNER_UID));
    }

    #[test]
    fn test_builder_rejects_zero_pool() {
        assert!(FsConfig::builder().pool_buffer_size(0usize).build().is_err());
        assert!(FsConfig::builder().pool_capacity(0usize).build().is_err());
        assert!(FsConfig::builder().file_mode(0o17777u32).build().is_err());
    }

    #[test]
    fn test_unprivileged() {
        let config = FsConfig::unprivileged();
        assert!(config.disable_chown);
        assert_eq!(config.default_owner, None);
        assert_eq!(config.directory_mode, DEFAULT_DIRECTORY_MODE);
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: FsConfig = serde_json::from_str(r#"{"backend": "portable"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Portable);
        assert_eq!(config.file_mode, DEFAULT_FILE_MODE);
        assert_eq!(config.sensitivity_attribute, SENSITIVITY_XATTR);
    }
}
