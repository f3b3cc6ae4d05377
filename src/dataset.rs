//! How2Sign dataset acquisition: the archive catalog, Google Drive
//! downloads and unpacking of clip archives.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::progress::{ProgressConfig, ProgressReporter};

pub const DEFAULT_OUTPUT: &str = "./how2sign";
const DRIVE_URL: &str = "https://drive.google.com/uc";
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetFile {
    pub key: &'static str,
    pub drive_id: &'static str,
    pub filename: &'static str,
    pub size: &'static str,
    pub description: &'static str,
}

pub const CATALOG: &[DatasetFile] = &[
    DatasetFile {
        key: "clips_train",
        drive_id: "1BdfBDCy7Kqv8Wz2bqWKfqmPjYXxWNat_",
        filename: "green_screen_rgb_clips_train.zip",
        size: "31GB",
        description: "Training clips (frontal view)",
    },
    DatasetFile {
        key: "clips_val",
        drive_id: "1mQ_XHbqMpEaGr0GR5Xjzr8dAnCzqzjXR",
        filename: "green_screen_rgb_clips_val.zip",
        size: "1.7GB",
        description: "Validation clips (frontal view)",
    },
    DatasetFile {
        key: "clips_test",
        drive_id: "1YT7Xp9PEqtSQhXTiMBJuVb_RnRZK8T2E",
        filename: "green_screen_rgb_clips_test.zip",
        size: "2.2GB",
        description: "Test clips (frontal view)",
    },
    DatasetFile {
        key: "annotations",
        drive_id: "1dJTbHxP_fTLVVXhJT0z7OU_qWqQRUyLe",
        filename: "how2sign_realigned.csv",
        size: "5MB",
        description: "Annotations with gloss labels",
    },
];

/// Files fetched by `--sample`, in order.
pub const SAMPLE_KEYS: &[&str] = &["annotations", "clips_val"];

pub fn find(key: &str) -> Option<&'static DatasetFile> {
    CATALOG.iter().find(|f| f.key == key)
}

pub fn catalog_keys() -> Vec<&'static str> {
    CATALOG.iter().map(|f| f.key).collect()
}

/// `confirm=t` skips the interstitial Drive serves for files it cannot
/// virus-scan.
pub fn download_url(file: &DatasetFile) -> String {
    format!("{}?export=download&id={}&confirm=t", DRIVE_URL, file.drive_id)
}

pub fn format_catalog() -> String {
    let mut out = String::from("Available How2Sign files:\n");
    for f in CATALOG {
        out.push_str(&format!(
            "  {:<12} {:>6}  {:<36} {}\n",
            f.key, f.size, f.filename, f.description
        ));
    }
    out
}

impl DatasetFile {
    pub fn is_archive(&self) -> bool {
        self.filename.ends_with(".zip")
    }
}

/// Fetch one catalog file into `output`. An existing non-empty file is kept
/// and not downloaded again. Data is streamed to `<name>.part` and renamed
/// once complete.
pub fn download(
    file: &DatasetFile,
    output: &Path,
    progress_cfg: ProgressConfig,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output).with_context(|| format!("create {:?}", output))?;
    let dest = output.join(file.filename);
    if dest.metadata().map(|m| m.len() > 0).unwrap_or(false) {
        log::info!("{} already present, skipping download", dest.display());
        return Ok(dest);
    }

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(30))
        .build();
    let url = download_url(file);
    log::debug!("GET {}", url);
    let response = agent
        .get(&url)
        .call()
        .with_context(|| format!("download {} ({})", file.key, file.filename))?;

    if response.content_type().starts_with("text/html") {
        bail!(
            "Google Drive returned a web page instead of {}; the file may be over its download quota. Try again later or fetch it manually from {}",
            file.filename,
            url
        );
    }

    let total_mib = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|b| b.div_ceil(MIB))
        .unwrap_or(0);

    let reporter = ProgressReporter::new(file.key, "MiB", total_mib, progress_cfg);
    let progress = reporter.handle();
    progress.set_stage("downloading");

    let part = output.join(format!("{}.part", file.filename));
    let file_out = File::create(&part).with_context(|| format!("create {:?}", part))?;
    let mut writer = BufWriter::new(file_out);
    let mut reader = response.into_reader();
    let mut buf = vec![0u8; 256 * 1024];
    let mut pending = 0u64;
    let mut written = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read response body for {}", file.filename))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        written += n as u64;
        pending += n as u64;
        if pending >= MIB {
            progress.inc(pending / MIB, None);
            pending %= MIB;
        }
    }
    writer.flush()?;
    drop(writer);

    if written == 0 {
        let _ = std::fs::remove_file(&part);
        bail!("Downloaded 0 bytes for {}", file.filename);
    }
    std::fs::rename(&part, &dest).with_context(|| format!("rename {:?} -> {:?}", part, dest))?;
    reporter.finish(format!("{} ({} MiB)", dest.display(), written.div_ceil(MIB)));
    Ok(dest)
}

/// Unpack a zip archive with the system `unzip`, overwriting existing files.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let status = Command::new("unzip")
        .arg("-o")
        .arg("-q")
        .arg(archive)
        .arg("-d")
        .arg(dest)
        .stdin(Stdio::null())
        .status()
        .context("failed to run unzip; is it installed and on PATH?")?;
    if !status.success() {
        bail!("unzip failed for {} (status {})", archive.display(), status);
    }
    Ok(())
}

/// Download the sample subset (annotations and validation clips) and unpack
/// the archives next to them.
pub fn download_sample(output: &Path, progress_cfg: ProgressConfig) -> Result<Vec<PathBuf>> {
    let mut fetched = vec![];
    for key in SAMPLE_KEYS {
        let Some(file) = find(key) else {
            bail!("sample file '{}' missing from catalog", key);
        };
        let path = download(file, output, progress_cfg)?;
        if file.is_archive() {
            extract_archive(&path, output)?;
        }
        fetched.push(path);
    }
    Ok(fetched)
}
