use crate::error::Result;
use image::RgbaImage;
use log::{debug, warn};
use std::path::{Path, PathBuf};

fn decode(path: &Path) -> Result<RgbaImage> {
    let image = image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()?
        .into_rgba8();
    Ok(image)
}

/// Loads the target as RGBA. A missing or undecodable file yields a blank
/// `fallback_size` square instead, so the search can still start.
pub fn load_target(path: &Path, fallback_size: u32) -> RgbaImage {
    match decode(path) {
        Ok(image) if image.width() > 0 && image.height() > 0 => image,
        Ok(_) => {
            warn!(
                "{} is empty; using a blank {}x{} canvas",
                path.display(),
                fallback_size,
                fallback_size
            );
            RgbaImage::new(fallback_size, fallback_size)
        }
        Err(e) => {
            warn!(
                "failed to load {}: {}; using a blank {}x{} canvas",
                path.display(),
                e,
                fallback_size,
                fallback_size
            );
            RgbaImage::new(fallback_size, fallback_size)
        }
    }
}

/// Writes `rendering` to `path`; the format follows the extension. `None`
/// does nothing.
pub fn save_rendering(rendering: Option<&RgbaImage>, path: &Path) -> Result<()> {
    if let Some(image) = rendering {
        image.save(path)?;
    }
    Ok(())
}

/// Saves every `every`th accepted improvement.
#[derive(Clone, Debug)]
pub struct SnapshotSchedule {
    pub every: u64,
    pub path: PathBuf,
}

impl SnapshotSchedule {
    pub fn new(every: u64, path: PathBuf) -> Self {
        Self {
            every: every.max(1),
            path,
        }
    }

    pub fn is_due(&self, improvements: u64) -> bool {
        improvements % self.every == 0
    }

    /// Saves if `improvements` is due. Failures are logged, not returned: a
    /// full disk must not stop the search.
    pub fn maybe_save(&self, improvements: u64, rendering: Option<&RgbaImage>) -> bool {
        if !self.is_due(improvements) {
            return false;
        }
        self.save(rendering)
    }

    pub fn save(&self, rendering: Option<&RgbaImage>) -> bool {
        match save_rendering(rendering, &self.path) {
            Ok(()) => {
                debug!("saved snapshot to {}", self.path.display());
                rendering.is_some()
            }
            Err(e) => {
                warn!("failed to save {}: {}", self.path.display(), e);
                false
            }
        }
    }
}
