//! Artifact capture.
//!
//! Screenshots and text attachments are best-effort diagnostics. Every public
//! entry point here returns `Option` and logs instead of failing, so a broken
//! capture can never mask the real outcome of a test.
//!
//! Files land in one directory as `{label}_{timestamp}.{ext}`, with a numeric
//! suffix when two captures share a label within the same millisecond.

use crate::driver::UiDriver;
use crate::event::Artifact;
use crate::result::{TenazError, TenazResult};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default artifact directory
pub const DEFAULT_ARTIFACT_DIR: &str = "reports/screenshots";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes screenshots and text attachments under one directory
#[derive(Debug, Clone)]
pub struct ArtifactCapture {
    dir: PathBuf,
}

impl Default for ArtifactCapture {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT_DIR)
    }
}

impl ArtifactCapture {
    /// Capture into `dir`, created on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Screenshot the driver's viewport.
    ///
    /// Returns `None` without touching the filesystem when no driver is
    /// available, and `None` plus a warning when capture fails.
    pub fn capture_screenshot(
        &self,
        driver: Option<&dyn UiDriver>,
        label: &str,
    ) -> Option<Artifact> {
        let Some(driver) = driver else {
            warn!(label, "no driver handle available, screenshot skipped");
            return None;
        };
        match self.try_capture_screenshot(driver, label) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                warn!(label, error = %err, "screenshot capture failed");
                None
            }
        }
    }

    /// Fallible form of [`ArtifactCapture::capture_screenshot`]
    pub fn try_capture_screenshot(
        &self,
        driver: &dyn UiDriver,
        label: &str,
    ) -> TenazResult<Artifact> {
        let screenshot = catch_unwind(AssertUnwindSafe(|| driver.screenshot()))
            .map_err(|_| TenazError::capture("driver panicked while taking a screenshot"))?
            .map_err(|e| TenazError::capture(e.to_string()))?;
        if !screenshot.is_valid() {
            return Err(TenazError::capture("driver returned an empty screenshot"));
        }
        let path = self.write_unique(label, "png", &screenshot.data)?;
        debug!(path = %path.display(), bytes = screenshot.size_bytes(), "screenshot saved");
        Ok(Artifact::image(path))
    }

    /// Store `text` as a `.txt` attachment
    pub fn write_text(&self, label: &str, text: &str) -> Option<Artifact> {
        match self.write_unique(label, "txt", text.as_bytes()) {
            Ok(path) => Some(Artifact::text(path)),
            Err(err) => {
                warn!(label, error = %err, "text attachment could not be written");
                None
            }
        }
    }

    fn write_unique(&self, label: &str, extension: &str, bytes: &[u8]) -> TenazResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            TenazError::capture(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let stem = format!(
            "{}_{}",
            sanitize_label(label),
            Local::now().format(TIMESTAMP_FORMAT)
        );
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}_{attempt}.{extension}")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    write_fresh(&path, file, bytes)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(TenazError::capture(format!(
                        "cannot create {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Err(TenazError::capture(format!("no free file name for {stem}")))
    }
}

/// Write `bytes` to a just-created `path`, removing the file if the write fails
fn write_fresh(path: &Path, mut out: impl Write, bytes: &[u8]) -> TenazResult<()> {
    if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
        drop(out);
        if let Err(remove) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %remove, "partial artifact not removed");
        }
        return Err(TenazError::capture(format!(
            "cannot write {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

/// Reduce a label to characters safe in a file name
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
