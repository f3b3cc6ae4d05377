use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const FRAME_EXT: &str = "webp";
pub const GLOSS_SEPARATOR: char = '_';

/// Derive a gloss label from a source filename.
///
/// `COFFEE_001.mp4` -> `COFFEE`, `THANK_YOU_2.mp4` -> `THANK_YOU`.
/// Purely numeric segments are dropped, so `1.mp4` yields an empty label.
pub fn derive_gloss(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    stem.split(GLOSS_SEPARATOR)
        .filter(|part| part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(&GLOSS_SEPARATOR.to_string())
        .to_uppercase()
}

/// Like [`derive_gloss`] but rejects the degenerate empty label.
pub fn require_gloss(filename: &str) -> Result<String> {
    let gloss = derive_gloss(filename);
    if gloss.is_empty() {
        bail!("cannot derive a gloss label from {:?}", filename);
    }
    Ok(gloss)
}

pub fn frame_file_name(index: usize) -> String {
    format!("{:04}.{}", index, FRAME_EXT)
}

pub fn is_frame_file(p: &Path) -> bool {
    p.is_file()
        && p.extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(FRAME_EXT))
            .unwrap_or(false)
}

/// Frame files directly under `dir`, sorted by filename.
///
/// Zero padding makes lexicographic order match playback order.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = vec![];
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let e = entry?;
        if is_frame_file(e.path()) {
            frames.push(e.into_path());
        }
    }
    frames.sort();
    Ok(frames)
}

/// Remove every frame file directly under `dir`, leaving other files alone.
/// A missing directory is not an error.
pub fn clear_frames(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for frame in list_frames(dir)? {
        std::fs::remove_file(&frame)
            .with_context(|| format!("remove stale frame {:?}", frame))?;
    }
    Ok(())
}

/// True when `frames` is exactly `0001.webp ..= N.webp`.
#[cfg(test)]
pub fn is_contiguous(frames: &[PathBuf]) -> bool {
    frames.iter().enumerate().all(|(i, p)| {
        p.file_name()
            .map(|n| n.to_string_lossy() == frame_file_name(i + 1))
            .unwrap_or(false)
    })
}

pub fn duration_ms(frame_count: usize, fps: u32) -> u64 {
    if fps == 0 {
        return 0;
    }
    (frame_count as u64 * 1000) / fps as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn derive_drops_numeric_segments() {
        assert_eq!(derive_gloss("COFFEE_001.mp4"), "COFFEE");
        assert_eq!(derive_gloss("THANK_YOU_2.mp4"), "THANK_YOU");
        assert_eq!(derive_gloss("thank_you_2.MOV"), "THANK_YOU");
        assert_eq!(derive_gloss("1.mp4"), "");
        assert_eq!(derive_gloss("12_34.mkv"), "");
    }

    #[test]
    fn derive_is_idempotent() {
        for name in ["COFFEE_001.mp4", "water_7_b.webm", "A1_2.avi"] {
            let once = derive_gloss(name);
            assert_eq!(derive_gloss(&once), once);
            assert_eq!(derive_gloss(name), once);
        }
        assert_eq!(derive_gloss("A1_2.avi"), "A1");
    }

    #[test]
    fn require_rejects_empty_label() {
        assert!(require_gloss("0001.mp4").is_err());
        assert_eq!(require_gloss("HELLO_3.mp4").unwrap(), "HELLO");
    }

    #[test]
    fn frame_names_are_zero_padded() {
        assert_eq!(frame_file_name(1), "0001.webp");
        assert_eq!(frame_file_name(42), "0042.webp");
        assert_eq!(frame_file_name(1234), "1234.webp");
    }

    #[test]
    fn list_frames_sorts_and_filters() {
        let tmp = TempDir::new().expect("tempdir");
        for i in [3, 1, 2] {
            fs::write(tmp.path().join(frame_file_name(i)), b"x").unwrap();
        }
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(tmp.path().join("sub.webp")).unwrap();

        let frames = list_frames(tmp.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["0001.webp", "0002.webp", "0003.webp"]);
        assert!(is_contiguous(&frames));

        fs::remove_file(tmp.path().join("0002.webp")).unwrap();
        assert!(!is_contiguous(&list_frames(tmp.path()).unwrap()));
    }

    #[test]
    fn duration_rounds_down() {
        assert_eq!(duration_ms(24, 24), 1000);
        assert_eq!(duration_ms(18, 24), 750);
        assert_eq!(duration_ms(25, 24), 1041);
        assert_eq!(duration_ms(5, 0), 0);
    }

    #[test]
    fn clear_frames_keeps_other_files() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("HELLO");
        fs::create_dir_all(&dir).unwrap();
        for i in 1..=3 {
            fs::write(dir.join(frame_file_name(i)), b"old").unwrap();
        }
        fs::write(dir.join("keep.txt"), b"notes").unwrap();

        clear_frames(&dir).unwrap();
        assert!(list_frames(&dir).unwrap().is_empty());
        assert!(dir.join("keep.txt").exists());

        clear_frames(&tmp.path().join("missing")).unwrap();
    }
}
