use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, unbounded};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gloss;
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::progress::{ProgressConfig, ProgressHandle, ProgressReporter};
use crate::report::{RunReport, UnitOutcome};
use crate::util;

pub const DEFAULT_BUCKET: &str = "avatars";
pub const DEFAULT_FPS: u32 = 24;
pub const CONTENT_TYPE: &str = "image/webp";
pub const LIBRARY_TABLE: &str = "avatar_library";
pub const CONFLICT_KEY: &str = "gloss_label";
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/webp", "image/jpeg", "image/png"];

/// Errors from the remote side, classified so idempotent duplicates can be
/// treated as success.
pub trait RemoteError: std::error::Error + Send + Sync + 'static {
    fn is_already_exists(&self) -> bool;
}

/// Object storage operations used by publication.
pub trait Storage {
    type Error: RemoteError;

    fn bucket_exists(&self, bucket: &str) -> Result<bool, Self::Error>;
    fn create_bucket(&self, spec: &BucketSpec) -> Result<(), Self::Error>;
    /// Overwrites any existing object at `remote_path`.
    fn upload(
        &self,
        bucket: &str,
        remote_path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), Self::Error>;
}

/// Keyed upsert into a remote table.
pub trait Table {
    type Error: RemoteError;

    fn upsert(
        &self,
        table: &str,
        conflict_key: &str,
        record: &LibraryRecord,
    ) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub public: bool,
    pub file_size_limit: u64,
    pub allowed_mime_types: Vec<String>,
}

impl BucketSpec {
    pub fn flipbook(name: &str) -> Self {
        Self {
            name: name.to_string(),
            public: true,
            file_size_limit: MAX_FILE_BYTES,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryRecord {
    pub gloss_label: String,
    pub frame_count: usize,
    pub fps: u32,
    pub storage_path: String,
    /// `flipbook://` marks rows served as frame sequences instead of a video.
    pub video_url: String,
    pub category: String,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMetadata {
    pub duration_ms: u64,
    pub signer_id: String,
    pub dialect: String,
    pub source: String,
}

impl LibraryRecord {
    pub fn new(gloss: &str, frame_count: usize, fps: u32, bucket: &str) -> Self {
        let storage_path = format!("{}/{}", bucket, gloss);
        Self {
            gloss_label: gloss.to_string(),
            frame_count,
            fps,
            video_url: format!("flipbook://{}", storage_path),
            storage_path,
            category: "asl".to_string(),
            metadata: RecordMetadata {
                duration_ms: gloss::duration_ms(frame_count, fps),
                signer_id: "how2sign".to_string(),
                dialect: "ASL".to_string(),
                source: "How2Sign Dataset".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub bucket: String,
    /// Frame rate for modes without a manifest.
    pub fps: u32,
    pub workers: usize,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            fps: DEFAULT_FPS,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishMode {
    /// `frames` is itself the directory of one gloss.
    Single { gloss: String },
    Manifest(PathBuf),
    /// Every immediate subdirectory of `frames` is a gloss.
    Scan,
}

impl PublishMode {
    pub fn name(&self) -> &'static str {
        match self {
            PublishMode::Single { .. } => "single",
            PublishMode::Manifest(_) => "manifest",
            PublishMode::Scan => "scan",
        }
    }
}

/// Picks the mode: explicit gloss, then manifest, then directory scan.
/// An explicitly named manifest that does not exist is an error.
pub fn resolve_mode(
    frames: &Path,
    gloss: Option<&str>,
    manifest: Option<&Path>,
) -> Result<PublishMode> {
    if let Some(g) = gloss {
        let g = g.trim();
        if g.is_empty() {
            bail!("--gloss must not be empty");
        }
        return Ok(PublishMode::Single { gloss: g.to_string() });
    }
    if let Some(path) = manifest {
        if !path.is_file() {
            bail!("Manifest does not exist: {}", path.display());
        }
        return Ok(PublishMode::Manifest(path.to_path_buf()));
    }
    let default_manifest = frames.join(MANIFEST_FILE);
    if default_manifest.is_file() {
        return Ok(PublishMode::Manifest(default_manifest));
    }
    Ok(PublishMode::Scan)
}

#[derive(Debug, Clone)]
pub struct PublishSummary {
    pub mode: &'static str,
    pub bucket: String,
    pub report: RunReport,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct GlossJob {
    gloss: String,
    dir: PathBuf,
    fps: u32,
    expected_frames: Option<usize>,
}

/// Create the bucket if it is missing. A concurrent creator winning the race
/// shows up as "already exists" and is fine.
pub fn ensure_bucket<S: Storage>(storage: &S, spec: &BucketSpec) -> Result<bool> {
    let exists = storage
        .bucket_exists(&spec.name)
        .with_context(|| format!("list storage buckets while looking for '{}'", spec.name))?;
    if exists {
        return Ok(false);
    }
    match storage.create_bucket(spec) {
        Ok(()) => Ok(true),
        Err(e) if e.is_already_exists() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("create bucket '{}'", spec.name)),
    }
}

/// Upload one frame file to `<gloss>/<filename>`.
pub fn upload_frame<S: Storage>(
    storage: &S,
    bucket: &str,
    gloss: &str,
    frame: &Path,
) -> Result<()> {
    let data = std::fs::read(frame).with_context(|| format!("read frame {:?}", frame))?;
    let remote_path = format!("{}/{}", gloss, util::file_name_string(frame));
    match storage.upload(bucket, &remote_path, &data, CONTENT_TYPE) {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e).with_context(|| format!("upload {}", remote_path)),
    }
}

/// Upload every frame of a gloss in playback order; returns how many made it.
pub fn upload_gloss_frames<S: Storage>(
    storage: &S,
    bucket: &str,
    gloss: &str,
    frames: &[PathBuf],
    progress: &ProgressHandle,
    op: &str,
) -> (usize, Vec<String>) {
    let mut uploaded = 0usize;
    let mut errors = vec![];
    for (i, frame) in frames.iter().enumerate() {
        progress.set_operation_status(op, format!("{} {}/{}", gloss, i + 1, frames.len()));
        match upload_frame(storage, bucket, gloss, frame) {
            Ok(()) => uploaded += 1,
            Err(e) => {
                log::warn!("{:#}", e);
                errors.push(format!("{:#}", e));
            }
        }
    }
    (uploaded, errors)
}

fn publish_gloss<S: Storage, T: Table>(
    storage: &S,
    table: &T,
    job: &GlossJob,
    bucket: &str,
    progress: &ProgressHandle,
    op: &str,
) -> UnitOutcome {
    let source = job.dir.display().to_string();
    let frames = match gloss::list_frames(&job.dir) {
        Ok(f) => f,
        Err(e) => return UnitOutcome::failed(&job.gloss, source, format!("{:#}", e)),
    };
    if frames.is_empty() {
        return UnitOutcome::failed(&job.gloss, source, "no frames found");
    }

    let (uploaded, errors) =
        upload_gloss_frames(storage, bucket, &job.gloss, &frames, progress, op);
    if uploaded == 0 {
        let first = errors.first().cloned().unwrap_or_default();
        return UnitOutcome::failed(&job.gloss, source, format!("no frames uploaded: {}", first));
    }

    let mut outcome = UnitOutcome::ok(&job.gloss, source, uploaded);
    if uploaded < frames.len() {
        outcome = outcome.with_note(format!(
            "{} of {} frames failed to upload",
            frames.len() - uploaded,
            frames.len()
        ));
    }
    if let Some(expected) = job.expected_frames {
        if expected != frames.len() {
            outcome = outcome.with_note(format!(
                "manifest lists {} frames, found {} on disk",
                expected,
                frames.len()
            ));
        }
    }

    let record = LibraryRecord::new(&job.gloss, uploaded, job.fps, bucket);
    if let Err(e) = table.upsert(LIBRARY_TABLE, CONFLICT_KEY, &record) {
        log::warn!("database error for {}: {}", job.gloss, e);
        outcome = outcome.with_note(format!("table upsert failed: {}", e));
    }
    outcome
}

fn plan_jobs(
    frames: &Path,
    mode: &PublishMode,
    opts: &PublishOptions,
    progress: &ProgressHandle,
) -> Result<(Vec<GlossJob>, Vec<UnitOutcome>)> {
    let mut jobs = vec![];
    let mut missing = vec![];
    match mode {
        PublishMode::Single { gloss } => jobs.push(GlossJob {
            gloss: gloss.clone(),
            dir: frames.to_path_buf(),
            fps: opts.fps,
            expected_frames: None,
        }),
        PublishMode::Manifest(path) => {
            let manifest = Manifest::read(path)?;
            progress.log(format!("Found {} glosses in manifest", manifest.glosses.len()));
            for (name, entry) in &manifest.glosses {
                let dir = frames.join(name);
                if !dir.is_dir() {
                    progress.warn(format!("Frames directory not found for {}", name));
                    missing.push(UnitOutcome::failed(
                        name,
                        dir.display().to_string(),
                        "frames directory not found",
                    ));
                    continue;
                }
                jobs.push(GlossJob {
                    gloss: name.clone(),
                    dir,
                    fps: manifest.fps,
                    expected_frames: Some(entry.frame_count),
                });
            }
        }
        PublishMode::Scan => {
            let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
            for dir in util::list_subdirs(frames)? {
                let name = util::file_name_string(&dir).to_uppercase();
                if let Some(prev) = seen.insert(name.clone(), dir.clone()) {
                    progress.warn(format!(
                        "{} and {} both map to gloss {}; the later upload overwrites the earlier",
                        prev.display(),
                        dir.display(),
                        name
                    ));
                }
                jobs.push(GlossJob {
                    gloss: name,
                    dir,
                    fps: opts.fps,
                    expected_frames: None,
                });
            }
            if jobs.is_empty() {
                bail!(
                    "No gloss directories found in {}. Use --gloss to specify a gloss label.",
                    frames.display()
                );
            }
        }
    }
    Ok((jobs, missing))
}

/// Run one gloss per worker; jobs for the same gloss stay on one worker and
/// in order. Outcomes are merged on the calling thread.
fn run_jobs<S, T>(
    storage: &S,
    table: &T,
    jobs: Vec<GlossJob>,
    opts: &PublishOptions,
    progress: &ProgressHandle,
) -> RunReport
where
    S: Storage + Sync,
    T: Table + Sync,
{
    let mut groups: BTreeMap<String, Vec<(usize, GlossJob)>> = BTreeMap::new();
    let total = jobs.len();
    for (i, job) in jobs.into_iter().enumerate() {
        groups.entry(job.gloss.clone()).or_default().push((i, job));
    }
    let workers = opts.workers.max(1).min(groups.len().max(1));

    let (job_tx, job_rx) = bounded::<Vec<(usize, GlossJob)>>(workers);
    let (res_tx, res_rx) = unbounded::<(usize, UnitOutcome)>();
    let mut slots: Vec<Option<UnitOutcome>> = vec![None; total];

    std::thread::scope(|s| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            let progress = progress.clone();
            let bucket = opts.bucket.as_str();
            s.spawn(move || {
                let op = format!("upload-{}", worker_id);
                for group in job_rx.iter() {
                    for (i, job) in group {
                        let outcome = publish_gloss(storage, table, &job, bucket, &progress, &op);
                        if res_tx.send((i, outcome)).is_err() {
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
            for group in groups.into_values() {
                if job_tx.send(group).is_err() {
                    break;
                }
            }
        });

        for (i, outcome) in res_rx.iter() {
            progress.inc(1, Some(&format!("{} ({} frames)", outcome.gloss, outcome.count)));
            match &outcome.error {
                Some(err) => progress.warn(format!("{}: {}", outcome.gloss, err)),
                None => {
                    progress.log(format!("{}: {} frames uploaded", outcome.gloss, outcome.count))
                }
            }
            slots[i] = Some(outcome);
        }
    });

    let mut report = RunReport::default();
    for outcome in slots.into_iter().flatten() {
        report.push(outcome);
    }
    report
}

/// Publish frames under `frames` according to `mode`. Fails when nothing
/// was uploaded at all.
pub fn publish<S, T>(
    storage: &S,
    table: &T,
    frames: &Path,
    mode: &PublishMode,
    opts: &PublishOptions,
    progress_cfg: ProgressConfig,
) -> Result<PublishSummary>
where
    S: Storage + Sync,
    T: Table + Sync,
{
    let reporter = ProgressReporter::new("upload", "glosses", 0, progress_cfg);
    let progress = reporter.handle();

    // Local inputs are validated before any remote call.
    progress.set_stage(format!("plan ({})", mode.name()));
    let (jobs, missing) = plan_jobs(frames, mode, opts, &progress)?;
    progress.set_total(jobs.len() as u64);

    progress.set_stage("ensure bucket");
    if ensure_bucket(storage, &BucketSpec::flipbook(&opts.bucket))? {
        progress.log(format!("Bucket '{}' created", opts.bucket));
    }

    progress.set_stage("uploading frames");
    let mut report = run_jobs(storage, table, jobs, opts, &progress);
    for m in missing {
        report.push(m);
    }

    if report.success_count() == 0 {
        bail!("No frames uploaded");
    }
    for note in report.notes() {
        progress.warn(note);
    }

    let outcome = reporter.finish(format!(
        "{} glosses, {} frames",
        report.success_count(),
        report.total_count()
    ));
    Ok(PublishSummary {
        mode: mode.name(),
        bucket: opts.bucket.clone(),
        report,
        elapsed: outcome.elapsed,
        warnings: outcome.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressMode;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct MockError {
        exists: bool,
        message: String,
    }

    impl std::fmt::Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for MockError {}

    impl RemoteError for MockError {
        fn is_already_exists(&self) -> bool {
            self.exists
        }
    }

    fn rejected(message: &str) -> MockError {
        MockError {
            exists: false,
            message: message.to_string(),
        }
    }

    fn duplicate() -> MockError {
        MockError {
            exists: true,
            message: "The resource already exists".to_string(),
        }
    }

    #[derive(Default)]
    struct MockRemote {
        bucket_present: bool,
        create_reports_duplicate: bool,
        /// Every upload fails with a hard error.
        reject_uploads: bool,
        /// Paths that already exist and report a duplicate error.
        duplicate_paths: Vec<String>,
        reject_upsert: bool,
        bucket_checks: Mutex<usize>,
        created: Mutex<Vec<BucketSpec>>,
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
        upload_calls: Mutex<usize>,
        rows: Mutex<Vec<LibraryRecord>>,
    }

    impl Storage for MockRemote {
        type Error = MockError;

        fn bucket_exists(&self, _bucket: &str) -> Result<bool, MockError> {
            *self.bucket_checks.lock().unwrap() += 1;
            Ok(self.bucket_present)
        }

        fn create_bucket(&self, spec: &BucketSpec) -> Result<(), MockError> {
            self.created.lock().unwrap().push(spec.clone());
            if self.create_reports_duplicate {
                return Err(duplicate());
            }
            Ok(())
        }

        fn upload(
            &self,
            bucket: &str,
            remote_path: &str,
            data: &[u8],
            content_type: &str,
        ) -> Result<(), MockError> {
            assert_eq!(content_type, CONTENT_TYPE);
            *self.upload_calls.lock().unwrap() += 1;
            if self.reject_uploads {
                return Err(rejected("payload too large"));
            }
            if self.duplicate_paths.iter().any(|p| p == remote_path) {
                return Err(duplicate());
            }
            self.objects
                .lock()
                .unwrap()
                .insert(format!("{}/{}", bucket, remote_path), data.to_vec());
            Ok(())
        }
    }

    impl Table for MockRemote {
        type Error = MockError;

        fn upsert(
            &self,
            table: &str,
            conflict_key: &str,
            record: &LibraryRecord,
        ) -> Result<(), MockError> {
            assert_eq!(table, LIBRARY_TABLE);
            assert_eq!(conflict_key, CONFLICT_KEY);
            if self.reject_upsert {
                return Err(rejected("permission denied"));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|r| r.gloss_label != record.gloss_label);
            rows.push(record.clone());
            Ok(())
        }
    }

    fn quiet() -> ProgressConfig {
        ProgressConfig::new(ProgressMode::Quiet)
    }

    fn write_frames(dir: &Path, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 1..=n {
            fs::write(dir.join(gloss::frame_file_name(i)), format!("frame-{}", i)).unwrap();
        }
    }

    fn present() -> MockRemote {
        MockRemote {
            bucket_present: true,
            ..MockRemote::default()
        }
    }

    #[test]
    fn record_carries_flipbook_pointer_and_duration() {
        let record = LibraryRecord::new("HELLO", 18, 24, "avatars");
        assert_eq!(record.storage_path, "avatars/HELLO");
        assert_eq!(record.video_url, "flipbook://avatars/HELLO");
        assert_eq!(record.category, "asl");
        assert_eq!(record.metadata.duration_ms, 750);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["gloss_label"], "HELLO");
        assert_eq!(json["metadata"]["source"], "How2Sign Dataset");
    }

    #[test]
    fn missing_bucket_is_created_public_and_restricted() {
        let remote = MockRemote::default();
        assert!(ensure_bucket(&remote, &BucketSpec::flipbook("avatars")).unwrap());

        let created = remote.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert!(created[0].public);
        assert_eq!(created[0].file_size_limit, 5_242_880);
        assert!(created[0].allowed_mime_types.contains(&"image/webp".to_string()));
    }

    #[test]
    fn duplicate_bucket_creation_is_tolerated() {
        let remote = MockRemote {
            create_reports_duplicate: true,
            ..MockRemote::default()
        };
        assert!(!ensure_bucket(&remote, &BucketSpec::flipbook("avatars")).unwrap());

        let existing = present();
        assert!(!ensure_bucket(&existing, &BucketSpec::flipbook("avatars")).unwrap());
        assert!(existing.created.lock().unwrap().is_empty());
    }

    #[test]
    fn mode_priority_is_gloss_then_manifest_then_scan() {
        let tmp = TempDir::new().expect("tempdir");
        assert_eq!(resolve_mode(tmp.path(), None, None).unwrap(), PublishMode::Scan);

        let counts = BTreeMap::from([("HELLO".to_string(), 2)]);
        let manifest = Manifest::from_counts(&counts, 24, "avatars");
        let path = manifest.write(tmp.path()).unwrap();
        assert_eq!(
            resolve_mode(tmp.path(), None, None).unwrap(),
            PublishMode::Manifest(path.clone())
        );
        assert_eq!(
            resolve_mode(tmp.path(), Some("HELLO"), Some(&path)).unwrap(),
            PublishMode::Single { gloss: "HELLO".to_string() }
        );

        assert!(resolve_mode(tmp.path(), None, Some(&tmp.path().join("nope.json"))).is_err());
        assert!(resolve_mode(tmp.path(), Some(" "), None).is_err());
    }

    #[test]
    fn uploading_twice_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("HELLO");
        write_frames(&dir, 3);
        let remote = present();
        let mode = PublishMode::Single { gloss: "HELLO".to_string() };
        let opts = PublishOptions::default();

        for _ in 0..2 {
            let summary = publish(&remote, &remote, &dir, &mode, &opts, quiet()).unwrap();
            assert_eq!(summary.report.success_count(), 1);
            assert_eq!(summary.report.total_count(), 3);
        }

        let objects = remote.objects.lock().unwrap();
        assert_eq!(objects.len(), 3);
        for i in 1..=3 {
            let key = format!("avatars/HELLO/{}", gloss::frame_file_name(i));
            assert_eq!(objects[&key], fs::read(dir.join(gloss::frame_file_name(i))).unwrap());
        }
        let rows = remote.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].frame_count, 3);
    }

    #[test]
    fn already_existing_objects_count_as_uploaded() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("WATER");
        write_frames(&dir, 2);
        let remote = MockRemote {
            duplicate_paths: vec!["WATER/0001.webp".to_string()],
            ..present()
        };

        let mode = PublishMode::Single { gloss: "WATER".to_string() };
        let opts = PublishOptions::default();
        let summary = publish(&remote, &remote, &dir, &mode, &opts, quiet()).unwrap();
        assert_eq!(summary.report.outcomes[0].count, 2);
        assert!(summary.report.outcomes[0].notes.is_empty());
    }

    #[test]
    fn zero_uploads_skip_the_table_upsert() {
        let tmp = TempDir::new().expect("tempdir");
        write_frames(&tmp.path().join("HELLO"), 2);
        let remote = MockRemote {
            reject_uploads: true,
            ..present()
        };

        let opts = PublishOptions::default();
        let err = publish(&remote, &remote, tmp.path(), &PublishMode::Scan, &opts, quiet())
            .unwrap_err();
        assert!(err.to_string().contains("No frames uploaded"));
        assert_eq!(*remote.upload_calls.lock().unwrap(), 2);
        assert!(remote.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn scan_mode_uppercases_dirs_and_counts_uploads() {
        let tmp = TempDir::new().expect("tempdir");
        write_frames(&tmp.path().join("hello"), 4);
        write_frames(&tmp.path().join("Water"), 2);
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let remote = present();
        let opts = PublishOptions {
            workers: 3,
            ..PublishOptions::default()
        };

        let summary =
            publish(&remote, &remote, tmp.path(), &PublishMode::Scan, &opts, quiet()).unwrap();
        assert_eq!(summary.mode, "scan");
        assert_eq!(summary.report.success_count(), 2);
        assert_eq!(summary.report.failure_count(), 1);

        let rows = remote.rows.lock().unwrap();
        let mut labels: Vec<_> = rows
            .iter()
            .map(|r| (r.gloss_label.clone(), r.frame_count))
            .collect();
        labels.sort();
        assert_eq!(labels, vec![("HELLO".to_string(), 4), ("WATER".to_string(), 2)]);
        assert!(remote.objects.lock().unwrap().contains_key("avatars/HELLO/0004.webp"));
    }

    #[test]
    fn manifest_mode_uses_manifest_fps_and_skips_missing_dirs() {
        let tmp = TempDir::new().expect("tempdir");
        write_frames(&tmp.path().join("HELLO"), 30);
        let counts = BTreeMap::from([("HELLO".to_string(), 30), ("GONE".to_string(), 5)]);
        let path = Manifest::from_counts(&counts, 30, "avatars").write(tmp.path()).unwrap();
        let remote = present();

        let summary = publish(
            &remote,
            &remote,
            tmp.path(),
            &PublishMode::Manifest(path),
            &PublishOptions::default(),
            quiet(),
        )
        .unwrap();
        assert_eq!(summary.report.success_count(), 1);
        assert_eq!(summary.report.failure_count(), 1);

        let rows = remote.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fps, 30);
        assert_eq!(rows[0].metadata.duration_ms, 1000);
    }

    #[test]
    fn failed_upsert_is_reported_not_fatal() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("YES");
        write_frames(&dir, 1);
        let remote = MockRemote {
            reject_upsert: true,
            ..present()
        };

        let mode = PublishMode::Single { gloss: "YES".to_string() };
        let opts = PublishOptions::default();
        let summary = publish(&remote, &remote, &dir, &mode, &opts, quiet()).unwrap();
        assert_eq!(summary.report.success_count(), 1);
        assert!(summary.report.notes()[0].contains("table upsert failed"));
        assert_eq!(remote.objects.lock().unwrap().len(), 1);
    }

    #[test]
    fn scan_without_directories_fails_before_any_remote_call() {
        let tmp = TempDir::new().expect("tempdir");
        let remote = MockRemote::default();
        let err = publish(
            &remote,
            &remote,
            tmp.path(),
            &PublishMode::Scan,
            &PublishOptions::default(),
            quiet(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No gloss directories found"));
        assert_eq!(*remote.bucket_checks.lock().unwrap(), 0);
        assert!(remote.created.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_manifest_fails_before_any_remote_call() {
        let tmp = TempDir::new().expect("tempdir");
        write_frames(&tmp.path().join("HELLO"), 2);
        let manifest = tmp.path().join(MANIFEST_FILE);
        fs::write(&manifest, "{ not json").unwrap();

        let remote = MockRemote::default();
        let err = publish(
            &remote,
            &remote,
            tmp.path(),
            &PublishMode::Manifest(manifest),
            &PublishOptions::default(),
            quiet(),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("parse manifest"), "{err:#}");
        assert_eq!(*remote.bucket_checks.lock().unwrap(), 0);
        assert!(remote.created.lock().unwrap().is_empty());
        assert_eq!(*remote.upload_calls.lock().unwrap(), 0);
    }
}
