use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, unbounded};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::gloss;
use crate::manifest::Manifest;
use crate::progress::{ProgressConfig, ProgressHandle, ProgressReporter};
use crate::report::{RunReport, UnitOutcome};
use crate::software;
use crate::util;

pub const TARGET_FPS: u32 = 24;
pub const WEBP_QUALITY: u32 = 80;
pub const MAX_DIMENSION: u32 = 512;
pub const FRAME_PATTERN: &str = "%04d.webp";
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub fps: u32,
    pub max_dim: u32,
    pub quality: u32,
    /// Try the ffmpeg CLI before the software decoder.
    pub use_ffmpeg: bool,
    pub workers: usize,
    /// Prefix for `storage_path` entries in the manifest.
    pub bucket: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            fps: TARGET_FPS,
            max_dim: MAX_DIMENSION,
            quality: WEBP_QUALITY,
            use_ffmpeg: true,
            workers: 1,
            bucket: "avatars".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractSummary {
    pub report: RunReport,
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
    pub elapsed: std::time::Duration,
    pub warnings: Vec<String>,
}

/// One source video and the gloss directory it extracts into.
#[derive(Debug, Clone)]
struct VideoJob {
    gloss: String,
    input: PathBuf,
    output_dir: PathBuf,
}

/// Run the ffmpeg CLI for one video. Returns the number of frames on disk
/// afterwards; a non-zero exit is an error.
pub fn extract_with_ffmpeg(
    input: &Path,
    output_dir: &Path,
    opts: &ExtractOptions,
) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;
    let filter = format!(
        "fps={fps},scale=w='min({d},iw)':h='min({d},ih)':force_original_aspect_ratio=decrease",
        fps = opts.fps,
        d = opts.max_dim
    );

    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(input)
        .arg("-vf")
        .arg(filter)
        .args(["-c:v", "libwebp", "-quality"])
        .arg(opts.quality.to_string())
        .arg("-y")
        .arg(output_dir.join(FRAME_PATTERN))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .context("failed to spawn ffmpeg")?;

    if !out.status.success() {
        bail!(
            "ffmpeg failed for {:?} ({}): {}",
            input,
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(gloss::list_frames(output_dir)?.len())
}

pub fn extract_with_software(
    input: &Path,
    output_dir: &Path,
    opts: &ExtractOptions,
) -> Result<usize> {
    let mut source = software::open(input)?;
    software::extract_from_source(source.as_mut(), output_dir, opts.fps, opts.max_dim)
}

/// Extract one video into `output_dir`, falling back to the software
/// decoder when ffmpeg is missing, fails, or produces nothing.
///
/// Stale frames in `output_dir` are removed first so the returned count
/// always equals the files on disk. Zero means nothing could be extracted.
pub fn extract_video(input: &Path, output_dir: &Path, opts: &ExtractOptions) -> Result<usize> {
    gloss::clear_frames(output_dir)?;

    if opts.use_ffmpeg {
        match extract_with_ffmpeg(input, output_dir, opts) {
            Ok(n) if n > 0 => return Ok(n),
            Ok(_) => log::warn!(
                "ffmpeg produced no frames for {:?}, using software decoder",
                input
            ),
            Err(e) => log::warn!("{:#}; using software decoder", e),
        }
        gloss::clear_frames(output_dir)?;
    }

    match extract_with_software(input, output_dir, opts) {
        Ok(n) => Ok(n),
        Err(e) => {
            log::warn!("software decode failed for {:?}: {:#}", input, e);
            // Partial output from a failed decode is not a usable sequence.
            gloss::clear_frames(output_dir)?;
            Ok(0)
        }
    }
}

fn run_job(job: &VideoJob, opts: &ExtractOptions) -> UnitOutcome {
    let source = util::file_name_string(&job.input);
    match extract_video(&job.input, &job.output_dir, opts) {
        Ok(0) => UnitOutcome::failed(&job.gloss, source, "no frames extracted"),
        Ok(n) => UnitOutcome::ok(&job.gloss, source, n),
        Err(e) => UnitOutcome::failed(&job.gloss, source, format!("{:#}", e)),
    }
}

/// Plan jobs for every recognised video directly under `input_dir`.
/// Files whose name yields an empty gloss are returned as failures.
fn plan_directory(
    input_dir: &Path,
    output_dir: &Path,
) -> Result<(Vec<VideoJob>, Vec<UnitOutcome>)> {
    let mut jobs = vec![];
    let mut rejected = vec![];
    for video in util::list_files_with_ext(input_dir, VIDEO_EXTENSIONS)? {
        let name = util::file_name_string(&video);
        match gloss::require_gloss(&name) {
            Ok(g) => jobs.push(VideoJob {
                output_dir: output_dir.join(&g),
                gloss: g,
                input: video,
            }),
            Err(e) => rejected.push(UnitOutcome::failed("", name, e.to_string())),
        }
    }
    Ok((jobs, rejected))
}

/// Group jobs by gloss, keeping input order inside each group so the last
/// video for a gloss is extracted last.
fn group_by_gloss(jobs: Vec<VideoJob>) -> Vec<Vec<VideoJob>> {
    let mut groups: BTreeMap<String, Vec<VideoJob>> = BTreeMap::new();
    for job in jobs {
        groups.entry(job.gloss.clone()).or_default().push(job);
    }
    groups.into_values().collect()
}

/// Extract every job. Each gloss group is owned by exactly one worker; the
/// calling thread is the only one that touches the report.
fn run_jobs(jobs: Vec<VideoJob>, opts: &ExtractOptions, progress: &ProgressHandle) -> RunReport {
    let order: Vec<(String, PathBuf)> = jobs
        .iter()
        .map(|j| (j.gloss.clone(), j.input.clone()))
        .collect();
    let groups = group_by_gloss(jobs);
    let workers = opts.workers.max(1).min(groups.len().max(1));

    let (job_tx, job_rx) = bounded::<Vec<VideoJob>>(workers);
    let (res_tx, res_rx) = unbounded::<(PathBuf, UnitOutcome)>();

    let mut results: BTreeMap<PathBuf, UnitOutcome> = BTreeMap::new();
    std::thread::scope(|s| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            let progress = progress.clone();
            s.spawn(move || {
                let op = format!("worker-{}", worker_id);
                for group in job_rx.iter() {
                    for job in group {
                        let source = util::file_name_string(&job.input);
                        progress.set_operation_status(&op, format!("{} <- {}", job.gloss, source));
                        let outcome = run_job(&job, opts);
                        if res_tx.send((job.input.clone(), outcome)).is_err() {
                            return;
                        }
                    }
                }
                progress.clear_operation(&op, None);
            });
        }
        drop(job_rx);
        drop(res_tx);

        s.spawn(move || {
            for group in groups {
                if job_tx.send(group).is_err() {
                    break;
                }
            }
        });

        for (input, outcome) in res_rx.iter() {
            progress.inc(1, Some(&format!("{} ({} frames)", outcome.gloss, outcome.count)));
            if let Some(err) = &outcome.error {
                progress.warn(format!("{}: {}", outcome.source, err));
            }
            results.insert(input, outcome);
        }
    });

    // Report in scan order so later videos override earlier ones per gloss.
    let mut report = RunReport::default();
    for (_gloss, input) in order {
        if let Some(outcome) = results.remove(&input) {
            report.push(outcome);
        }
    }
    report
}

/// Extract a single video. `gloss_override` replaces the filename-derived
/// label.
pub fn extract_file(
    input: &Path,
    output_root: &Path,
    gloss_override: Option<&str>,
    opts: &ExtractOptions,
    progress_cfg: ProgressConfig,
) -> Result<ExtractSummary> {
    let gloss = match gloss_override {
        Some(g) if !g.trim().is_empty() => g.trim().to_string(),
        Some(_) => bail!("--gloss must not be empty"),
        None => gloss::require_gloss(&util::file_name_string(input))?,
    };
    let job = VideoJob {
        output_dir: output_root.join(&gloss),
        gloss,
        input: input.to_path_buf(),
    };
    run_extraction(vec![job], vec![], output_root, opts, progress_cfg)
}

/// Extract every recognised video under `input_dir` into per-gloss
/// directories below `output_root` and write the manifest.
pub fn extract_directory(
    input_dir: &Path,
    output_root: &Path,
    opts: &ExtractOptions,
    progress_cfg: ProgressConfig,
) -> Result<ExtractSummary> {
    let (jobs, rejected) = plan_directory(input_dir, output_root)?;
    if jobs.is_empty() && rejected.is_empty() {
        bail!("No videos found in {:?}", input_dir);
    }
    run_extraction(jobs, rejected, output_root, opts, progress_cfg)
}

fn run_extraction(
    jobs: Vec<VideoJob>,
    rejected: Vec<UnitOutcome>,
    output_root: &Path,
    opts: &ExtractOptions,
    progress_cfg: ProgressConfig,
) -> Result<ExtractSummary> {
    std::fs::create_dir_all(output_root)
        .with_context(|| format!("create output directory {:?}", output_root))?;

    let reporter = ProgressReporter::new("extract", "videos", jobs.len() as u64, progress_cfg);
    let progress = reporter.handle();
    if opts.use_ffmpeg && !util::ffmpeg_available() {
        progress.warn("ffmpeg not found in PATH; using the software decoder");
    }
    for r in &rejected {
        progress.warn(format!("{}: {}", r.source, r.error.as_deref().unwrap_or("rejected")));
    }

    progress.set_stage("extracting frames");
    let mut report = run_jobs(jobs, opts, &progress);
    for r in rejected {
        report.push(r);
    }

    let counts: BTreeMap<String, usize> = report
        .counts()
        .into_iter()
        .filter(|(g, _)| !g.is_empty())
        .collect();
    if counts.values().all(|c| *c == 0) {
        bail!("No frames extracted");
    }

    progress.set_stage("writing manifest");
    let manifest = Manifest::from_counts(&counts, opts.fps, &opts.bucket);
    let manifest_path = manifest.write(output_root)?;
    progress.log(format!("manifest: {}", manifest_path.display()));

    let outcome = reporter.finish(format!(
        "{} glosses, {} frames",
        manifest.glosses.len(),
        manifest.total_frames()
    ));

    Ok(ExtractSummary {
        report,
        manifest,
        manifest_path,
        output_dir: output_root.to_path_buf(),
        elapsed: outcome.elapsed,
        warnings: outcome.warnings,
    })
}
