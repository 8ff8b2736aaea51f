//! Link configuration storage
//!
//! Manages link config records as YAML files, one per link name, under a
//! base directory. The store is the durable half of reconciliation: after
//! a host restart, the records are the only source of each link's ports
//! and keypair. The reconciler is the sole writer.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from the link config store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the link name.
    #[error("No config record for link '{0}'")]
    NotFound(String),

    /// A record file exists but cannot be read or parsed.
    #[error("Config record for link '{name}' is unreadable: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("Invalid link name '{0}': only alphanumeric, hyphen and underscore are allowed")]
    InvalidName(String),

    #[error("Failed to serialize record for link '{name}': {reason}")]
    Serialize { name: String, reason: String },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Last-known-good configuration of one link, as persisted.
///
/// `domain_regex` and `remote_pub_key` are the change-detection fields;
/// ports and the keypair are carried state, written once the container
/// reaches the running state. Host ports are `None` only before the first
/// successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfigRecord {
    pub name: String,
    pub domain_regex: String,
    pub remote_pub_key: String,
    pub link_wg_key: String,
    pub link_wg_pubkey: String,
    pub wg_port: Option<u16>,
    pub udp_proxy_port: Option<u16>,
    pub udp_proxy_port_2: Option<u16>,
}

impl LinkConfigRecord {
    /// Whether this record still satisfies the desired comparison fields.
    /// Ports and keypair are deliberately excluded.
    pub fn matches(&self, domain_regex: &str, remote_pub_key: &str) -> bool {
        self.domain_regex == domain_regex && self.remote_pub_key == remote_pub_key
    }
}

/// Filesystem-backed store, one `<name>.yaml` per link.
pub struct LinkConfigStore {
    base_dir: PathBuf,
}

impl LinkConfigStore {
    /// Open a store rooted at `base_dir`. The directory is not created;
    /// call [`ensure_created`](Self::ensure_created) on first run.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create the record directory if it does not exist yet.
    pub fn ensure_created(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.yaml", name))
    }

    /// Link names double as container names and filenames; keep them to a
    /// character set that is safe for both.
    fn validate_name(name: &str) -> Result<(), StoreError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Read the record for `name`.
    ///
    /// Distinguishes a missing record ([`StoreError::NotFound`]) from one
    /// that exists but cannot be parsed ([`StoreError::Corrupt`]); the
    /// reconciler treats both as "no usable record".
    pub fn read(&self, name: &str) -> Result<LinkConfigRecord, StoreError> {
        Self::validate_name(name)?;

        let path = self.record_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        serde_yaml::from_str(&raw).map_err(|e| StoreError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrite the record for `name` atomically (write to a temp file in
    /// the same directory, then rename over the final path).
    pub fn write(&self, record: &LinkConfigRecord) -> Result<(), StoreError> {
        Self::validate_name(&record.name)?;

        let yaml = serde_yaml::to_string(record).map_err(|e| StoreError::Serialize {
            name: record.name.clone(),
            reason: e.to_string(),
        })?;

        let path = self.record_path(&record.name);
        let tmp = self.base_dir.join(format!(".{}.yaml.tmp", record.name));
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, &path)?;

        debug!("Persisted config record for link '{}'", record.name);
        Ok(())
    }

    /// Names of all persisted links, sorted, for bulk restoration.
    pub fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if Self::validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Whether a record exists for `name`.
    pub fn exists(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok() && self.record_path(name).exists()
    }
}
