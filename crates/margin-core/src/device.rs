//! Device identity used to key version vectors.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::util::normalize_text_option;
use crate::Result;

/// Source of the current device's stable identifier.
pub trait DeviceIdProvider: Send + Sync {
    fn device_id(&self) -> &str;
}

/// Fixed device id, for tests and embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDeviceId(String);

impl StaticDeviceId {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self(device_id.into())
    }
}

impl DeviceIdProvider for StaticDeviceId {
    fn device_id(&self) -> &str {
        &self.0
    }
}

/// Device id generated once and cached on disk.
#[derive(Debug, Clone)]
pub struct FileDeviceIdProvider {
    device_id: String,
    path: PathBuf,
}

impl FileDeviceIdProvider {
    /// Read the id stored at `path`, generating and writing a new one when the
    /// file is missing or empty.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let existing = match std::fs::read_to_string(&path) {
            Ok(contents) => normalize_text_option(Some(contents)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => return Err(error.into()),
        };

        let device_id = if let Some(device_id) = existing {
            device_id
        } else {
            let device_id = Uuid::now_v7().to_string();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &device_id)?;
            tracing::info!("Generated device id at {}", path.display());
            device_id
        };

        Ok(Self { device_id, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceIdProvider for FileDeviceIdProvider {
    fn device_id(&self) -> &str {
        &self.device_id
    }
}
