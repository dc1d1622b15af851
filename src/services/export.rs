//! Export artifact service
//!
//! The flattened composite is written as PNG under a timestamped name.

use crate::error::{PurikuraError, Result};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of every exported file name
pub const EXPORT_PREFIX: &str = "purikura-photo";

/// Service for naming, encoding and writing export artifacts
pub struct ExportService;

impl ExportService {
    /// File name for an export made now
    #[must_use]
    pub fn file_name() -> String {
        Self::file_name_at(Utc::now())
    }

    /// File name for an export made at `timestamp`
    ///
    /// ISO-8601 truncated to seconds, with colons replaced by dashes.
    ///
    /// # Examples
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use purikura::services::ExportService;
    ///
    /// let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    /// assert_eq!(ExportService::file_name_at(at), "purikura-photo-2024-03-09T14-05-07.png");
    /// ```
    #[must_use]
    pub fn file_name_at(timestamp: DateTime<Utc>) -> String {
        format!("{}-{}.png", EXPORT_PREFIX, timestamp.format("%Y-%m-%dT%H-%M-%S"))
    }

    /// Encode the composite as PNG bytes
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        debug!(bytes = buffer.len(), "Encoded export PNG");
        Ok(buffer)
    }

    /// Resolve where an export should be written
    ///
    /// An existing directory receives a timestamped file; anything else is
    /// used as the file path verbatim.
    #[must_use]
    pub fn resolve_target(target: &Path) -> PathBuf {
        if target.is_dir() {
            target.join(Self::file_name())
        } else {
            target.to_path_buf()
        }
    }

    /// Write the composite as PNG to `target` and return the final path
    pub fn save(image: &RgbaImage, target: &Path) -> Result<PathBuf> {
        let path = Self::resolve_target(target);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                return Err(PurikuraError::invalid_input(format!(
                    "Output directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let bytes = Self::encode_png(image)?;
        std::fs::write(&path, bytes)?;
        info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Photo exported"
        );
        Ok(path)
    }
}
