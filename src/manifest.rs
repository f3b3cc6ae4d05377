use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::gloss;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: String,
    pub fps: u32,
    #[serde(default = "default_format")]
    pub format: String,
    /// Set when the frames are synthesized placeholders rather than extracted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,
    #[serde(default)]
    pub glosses: BTreeMap<String, GlossEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossEntry {
    pub frame_count: usize,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub storage_path: String,
}

fn default_version() -> String {
    MANIFEST_VERSION.to_string()
}

fn default_format() -> String {
    gloss::FRAME_EXT.to_string()
}

impl Manifest {
    /// Build a manifest from per-gloss frame counts. Zero-count glosses are
    /// failed extractions and are left out.
    pub fn from_counts(counts: &BTreeMap<String, usize>, fps: u32, bucket: &str) -> Self {
        let glosses = counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| {
                (
                    name.clone(),
                    GlossEntry {
                        frame_count: *count,
                        duration_ms: gloss::duration_ms(*count, fps),
                        storage_path: format!("{}/{}", bucket, name),
                    },
                )
            })
            .collect();

        Self {
            version: default_version(),
            fps,
            format: default_format(),
            generated: false,
            glosses,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.glosses.values().map(|g| g.frame_count).sum()
    }

    /// Writes `<dir>/manifest.json` and returns its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("write manifest {:?}", path))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read manifest {:?}", path))?;
        let manifest: Manifest =
            serde_json::from_slice(&bytes).with_context(|| format!("parse manifest {:?}", path))?;
        Ok(manifest)
    }
}
