mod config;
mod dataset;
mod extract;
mod gloss;
mod manifest;
mod placeholder;
mod progress;
mod publish;
mod report;
mod software;
mod supabase;
mod util;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use progress::{format_duration, ProgressConfig, ProgressMode};
use report::RunReport;
use std::path::PathBuf;

/// Upper bound for `--workers 0` (auto).
const MAX_AUTO_WORKERS: usize = 8;

#[derive(Parser)]
#[command(
    name = "flipbook",
    version,
    about = "Sign-language flipbook assets: download clips, extract WebP frames, publish to Supabase"
)]
struct Cli {
    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, global = true, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch How2Sign dataset files from Google Drive
    Download {
        /// List the downloadable files and exit
        #[arg(long, default_value_t = false)]
        list: bool,

        /// Download the annotations and validation clips, then unzip them
        #[arg(long, default_value_t = false, conflicts_with = "file")]
        sample: bool,

        /// Download one catalog entry by key (see --list)
        #[arg(long)]
        file: Option<String>,

        /// Destination directory
        #[arg(long, default_value = dataset::DEFAULT_OUTPUT)]
        output: PathBuf,
    },

    /// Render placeholder flipbooks for a fixed set of common glosses
    Generate {
        /// Output root; one directory per gloss plus manifest.json
        #[arg(long, default_value = "./frames")]
        output: PathBuf,

        /// Only these glosses (default: all)
        #[arg(long, num_args = 1..)]
        glosses: Vec<String>,

        /// Storage bucket recorded in manifest storage paths
        #[arg(long, default_value = publish::DEFAULT_BUCKET)]
        bucket: String,
    },

    /// Extract WebP frames from one video or a directory of videos
    Extract {
        /// Video file or directory of videos
        #[arg(short, long)]
        input: PathBuf,

        /// Output root; one directory per gloss plus manifest.json
        #[arg(short, long, default_value = "./frames")]
        output: PathBuf,

        /// Gloss label for a single input file (default: derived from the filename)
        #[arg(long)]
        gloss: Option<String>,

        /// Skip the ffmpeg CLI and use the built-in software decoder
        /// (requires a build with the `software-decode` feature)
        #[arg(long, default_value_t = false)]
        no_ffmpeg: bool,

        /// Concurrent glosses (default 1; 0 picks from the CPU count)
        #[arg(long)]
        workers: Option<usize>,

        /// Storage bucket recorded in manifest storage paths
        #[arg(long, default_value = publish::DEFAULT_BUCKET)]
        bucket: String,
    },

    /// Upload frames to Supabase storage and register them in the avatar library
    Upload {
        /// Frames root (or a single gloss directory with --gloss)
        #[arg(short, long, default_value = "./frames")]
        frames: PathBuf,

        /// Storage bucket
        #[arg(long, default_value = publish::DEFAULT_BUCKET)]
        bucket: String,

        /// Treat --frames as the directory of this one gloss
        #[arg(long)]
        gloss: Option<String>,

        /// Manifest to publish (default: <frames>/manifest.json when present)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Frame rate recorded for glosses not described by a manifest
        #[arg(long, default_value_t = publish::DEFAULT_FPS)]
        fps: u32,

        /// Concurrent glosses (default 1; 0 picks from the CPU count)
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let progress_cfg = ProgressConfig::new(cli.progress);

    match cli.cmd {
        Commands::Download {
            list,
            sample,
            file,
            output,
        } => {
            if list || (!sample && file.is_none()) {
                print!("{}", dataset::format_catalog());
                return Ok(());
            }
            let fetched = if sample {
                dataset::download_sample(&output, progress_cfg)?
            } else {
                let key = file.unwrap_or_default();
                let Some(entry) = dataset::find(&key) else {
                    bail!(
                        "unknown dataset file '{}'; expected one of: {}",
                        key,
                        dataset::catalog_keys().join(", ")
                    );
                };
                vec![dataset::download(entry, &output, progress_cfg)?]
            };
            println!(
                "Download summary: output={} files={}",
                output.display(),
                fetched.len()
            );
            for path in fetched {
                println!("  {}", path.display());
            }
        }

        Commands::Generate {
            output,
            glosses,
            bucket,
        } => {
            let summary = placeholder::generate(&output, &glosses, &bucket, progress_cfg)?;
            println!(
                "Generate summary: output={} glosses={} frames={} skipped={} manifest={}",
                output.display(),
                summary.manifest.glosses.len(),
                summary.manifest.total_frames(),
                summary.skipped.len(),
                summary.manifest_path.display(),
            );
        }

        Commands::Extract {
            input,
            output,
            gloss,
            no_ffmpeg,
            workers,
            bucket,
        } => {
            if !input.exists() {
                bail!("Input does not exist: {}", input.display());
            }
            let opts = extract::ExtractOptions {
                use_ffmpeg: !no_ffmpeg,
                workers: worker_count(workers),
                bucket,
                ..extract::ExtractOptions::default()
            };
            let summary = if input.is_dir() {
                if gloss.is_some() {
                    bail!("--gloss only applies when --input is a single video file");
                }
                extract::extract_directory(&input, &output, &opts, progress_cfg)?
            } else {
                extract::extract_file(&input, &output, gloss.as_deref(), &opts, progress_cfg)?
            };
            println!(
                "Extract summary: output={} duration={} glosses={} frames={} videos={} failed={} workers={} manifest={}",
                summary.output_dir.display(),
                format_duration(summary.elapsed),
                summary.manifest.glosses.len(),
                summary.manifest.total_frames(),
                summary.report.outcomes.len(),
                summary.report.failure_count(),
                opts.workers,
                summary.manifest_path.display(),
            );
            print_failures(&summary.report);
            print_warnings(&summary.warnings);
        }

        Commands::Upload {
            frames,
            bucket,
            gloss,
            manifest,
            fps,
            workers,
        } => {
            if !frames.exists() {
                bail!("Frames path does not exist: {}", frames.display());
            }
            let cwd = std::env::current_dir().context("resolve working directory")?;
            let creds = config::Credentials::load(&cwd)?;
            log::debug!("using {:?}", creds);
            let mode = publish::resolve_mode(&frames, gloss.as_deref(), manifest.as_deref())?;

            let opts = publish::PublishOptions {
                bucket,
                fps,
                workers: worker_count(workers),
            };
            let client = supabase::SupabaseClient::new(&creds);
            let summary = publish::publish(&client, &client, &frames, &mode, &opts, progress_cfg)?;
            println!(
                "Upload summary: mode={} bucket={} duration={} glosses={} frames={} failed={} workers={}",
                summary.mode,
                summary.bucket,
                format_duration(summary.elapsed),
                summary.report.success_count(),
                summary.report.total_count(),
                summary.report.failure_count(),
                opts.workers,
            );
            print_failures(&summary.report);
            print_warnings(&summary.warnings);
        }
    }

    Ok(())
}

fn worker_count(requested: Option<usize>) -> usize {
    match requested {
        None => 1,
        Some(0) => util::resolve_workers(None, MAX_AUTO_WORKERS),
        Some(n) => util::resolve_workers(Some(n), MAX_AUTO_WORKERS),
    }
}

fn print_failures(report: &RunReport) {
    for outcome in report.failed() {
        println!(
            "  failed: {} ({}): {}",
            outcome.gloss,
            outcome.source,
            outcome.error.as_deref().unwrap_or("no output")
        );
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("  warning: {}", warning);
    }
}
