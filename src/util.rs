use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::WalkDir;

pub fn ensure_ffmpeg_available() -> Result<()> {
    let out = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .context("failed to run ffmpeg -version")?;
    if !out.status.success() {
        bail!("ffmpeg exists but returned non-zero on -version");
    }
    Ok(())
}

pub fn ffmpeg_available() -> bool {
    ensure_ffmpeg_available().is_ok()
}

pub fn has_extension(p: &Path, exts: &[&str]) -> bool {
    p.extension()
        .map(|e| {
            let e = e.to_string_lossy().to_lowercase();
            exts.iter().any(|x| *x == e)
        })
        .unwrap_or(false)
}

/// Regular files directly under `dir` whose extension is in `exts`, sorted.
pub fn list_files_with_ext(dir: &Path, exts: &[&str]) -> Result<Vec<PathBuf>> {
    let mut v = vec![];
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let e = entry?;
        let p = e.path();
        if p.is_file() && has_extension(p, exts) {
            v.push(e.into_path());
        }
    }
    v.sort();
    Ok(v)
}

/// Immediate, non-hidden subdirectories of `dir`, sorted.
pub fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut v = vec![];
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let e = entry?;
        let hidden = e.file_name().to_string_lossy().starts_with('.');
        if e.file_type().is_dir() && !hidden {
            v.push(e.into_path());
        }
    }
    v.sort();
    Ok(v)
}

pub fn file_name_string(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Worker count for the bounded pools: explicit override, else capped cores.
pub fn resolve_workers(requested: Option<usize>, cap: usize) -> usize {
    match requested {
        Some(w) => w.max(1),
        None => num_cpus::get().clamp(1, cap.max(1)),
    }
}
