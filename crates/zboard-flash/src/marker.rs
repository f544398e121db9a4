//! Bootloader progress marker
//!
//! An empty file whose presence means "MCUboot is installed on this device".
//! It is written right after the bootloader stage succeeds and is never
//! removed by zboard; deleting it forces the bootloader to be flashed again.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FlashError, Result};

/// Durable "bootloader installed" flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMarker {
    path: PathBuf,
}

impl ProgressMarker {
    /// Marker stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether the bootloader has been installed
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Record that the bootloader has been installed
    pub fn record(&self) -> Result<()> {
        let err = |source| FlashError::Marker {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(err)?;
            }
        }
        fs::write(&self.path, b"").map_err(err)?;
        log::info!("Bootloader marker written to {}", self.path.display());
        Ok(())
    }
}
