use clap::ValueEnum;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const MAX_STORED_WARNINGS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub plain_interval: Duration,
    tty_override: Option<bool>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Auto,
            plain_interval: Duration::from_secs(2),
            tty_override: None,
        }
    }
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_tty_override(mut self, is_tty: bool) -> Self {
        self.tty_override = Some(is_tty);
        self
    }

    pub fn resolve_mode(self) -> ResolvedProgressMode {
        self.mode.resolve(
            self.tty_override
                .unwrap_or_else(|| std::io::stderr().is_terminal()),
        )
    }
}

impl ProgressMode {
    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

/// Cloneable handle used by workers; all updates funnel through one mutex.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

pub struct ProgressReporter {
    handle: ProgressHandle,
}

struct ProgressInner {
    label: String,
    unit: &'static str,
    mode: ResolvedProgressMode,
    plain_interval: Duration,
    state: Mutex<ProgressState>,
    rich: Option<RichUi>,
    finalized: AtomicBool,
}

struct RichUi {
    multi: MultiProgress,
    overall: ProgressBar,
    ops: Mutex<HashMap<String, ProgressBar>>,
}

#[derive(Debug)]
struct ProgressState {
    started: Instant,
    stage: String,
    total_units: u64,
    processed_units: u64,
    last_plain_emit: Instant,
    current: Option<String>,
    warnings: Vec<String>,
}

impl ProgressReporter {
    pub fn new(
        label: impl Into<String>,
        unit: &'static str,
        total_units: u64,
        config: ProgressConfig,
    ) -> Self {
        let label = label.into();
        let mode = config.resolve_mode();
        let now = Instant::now();

        let rich = if mode == ResolvedProgressMode::Rich {
            Some(RichUi::new(&label, unit, total_units))
        } else {
            None
        };

        let inner = Arc::new(ProgressInner {
            label,
            unit,
            mode,
            plain_interval: config.plain_interval,
            state: Mutex::new(ProgressState {
                started: now,
                stage: "starting".to_string(),
                total_units,
                processed_units: 0,
                last_plain_emit: now.checked_sub(config.plain_interval).unwrap_or(now),
                current: None,
                warnings: Vec::new(),
            }),
            rich,
            finalized: AtomicBool::new(false),
        });

        Self {
            handle: ProgressHandle { inner },
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(self, final_message: impl Into<String>) -> ProgressOutcome {
        self.handle.inner.finalize(Some(final_message.into()))
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        let _ = self.handle.inner.finalize(None);
    }
}

impl ProgressHandle {
    pub fn set_total(&self, total_units: u64) {
        let mut state = self.inner.state.lock().unwrap();
        state.total_units = total_units;
        if let Some(rich) = &self.inner.rich {
            rich.overall.set_length(total_units.max(1));
        }
    }

    pub fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.stage = stage.clone();
        }
        if let Some(rich) = &self.inner.rich {
            rich.overall.set_message(stage);
        }
    }

    /// Marks `delta` units done; `current` names the unit that just finished.
    pub fn inc(&self, delta: u64, current: Option<&str>) {
        let emit_plain = {
            let mut state = self.inner.state.lock().unwrap();
            state.processed_units = state.processed_units.saturating_add(delta);
            if state.total_units > 0 {
                state.processed_units = state.processed_units.min(state.total_units);
            }
            if let Some(c) = current {
                state.current = Some(c.to_string());
            }
            let now = Instant::now();
            let finished = state.total_units > 0 && state.processed_units >= state.total_units;
            let due = now.duration_since(state.last_plain_emit) >= self.inner.plain_interval;
            if due || finished {
                state.last_plain_emit = now;
                Some(self.inner.plain_line(&state))
            } else {
                None
            }
        };

        match self.inner.mode {
            ResolvedProgressMode::Rich => {
                if let Some(rich) = &self.inner.rich {
                    rich.overall.inc(delta);
                    if let Some(c) = current {
                        rich.overall.set_message(format!("last={}", c));
                    }
                }
            }
            ResolvedProgressMode::Plain => {
                if let Some(line) = emit_plain {
                    eprintln!("{}", line);
                }
            }
            ResolvedProgressMode::Quiet => {}
        }
    }

    pub fn set_operation_status(&self, operation_id: impl Into<String>, status: impl Into<String>) {
        if let Some(rich) = &self.inner.rich {
            rich.set_operation(&operation_id.into(), &status.into());
        }
    }

    pub fn clear_operation(&self, operation_id: &str, final_status: Option<&str>) {
        if let Some(rich) = &self.inner.rich {
            rich.clear_operation(operation_id, final_status);
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.inner.emit_message("INFO", &message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.warnings.len() >= MAX_STORED_WARNINGS {
                state.warnings.remove(0);
            }
            state.warnings.push(message.clone());
        }
        self.inner.emit_message("WARN", &message);
    }
}

impl ProgressInner {
    fn plain_line(&self, state: &ProgressState) -> String {
        let elapsed = state.started.elapsed();
        format!(
            "[PROGRESS] {} elapsed={} stage={} done={}/{} {} ETA={} last={}",
            self.label,
            format_duration(elapsed),
            state.stage,
            state.processed_units,
            state.total_units,
            self.unit,
            format_eta(compute_eta(state.total_units, state.processed_units, elapsed)),
            state.current.as_deref().unwrap_or("-"),
        )
    }

    fn emit_message(&self, level: &str, message: &str) {
        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => {
                eprintln!("[{}] {}: {}", level, self.label, message);
            }
            ResolvedProgressMode::Rich => {
                let line = format!("[{}] {}: {}", level, self.label, message);
                match &self.rich {
                    Some(rich) => rich.multi.suspend(|| eprintln!("{}", line)),
                    None => eprintln!("{}", line),
                }
            }
        }
    }

    fn finalize(&self, final_message: Option<String>) -> ProgressOutcome {
        let (outcome, plain) = {
            let state = self.state.lock().unwrap();
            let outcome = ProgressOutcome {
                elapsed: state.started.elapsed(),
                warnings: state.warnings.clone(),
            };
            (outcome, self.plain_line(&state))
        };

        if self.finalized.swap(true, Ordering::Relaxed) {
            return outcome;
        }

        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => {
                eprintln!("{}", plain);
                if let Some(msg) = final_message.as_deref() {
                    eprintln!("[DONE] {}: {}", self.label, msg);
                }
            }
            ResolvedProgressMode::Rich => {
                if let Some(rich) = &self.rich {
                    rich.clear_all_ops();
                    match final_message {
                        Some(msg) => rich.overall.finish_with_message(msg),
                        None => rich.overall.finish_and_clear(),
                    }
                }
            }
        }
        outcome
    }
}

impl RichUi {
    fn new(label: &str, unit: &str, total_units: u64) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_units.max(1)));
        overall.set_style(
            ProgressStyle::with_template(&format!(
                "{{spinner:.green}} {} [{{elapsed_precise}}] {{wide_bar:.cyan/blue}} {{pos}}/{{len}} {} ETA {{eta}} | {{msg}}",
                label, unit
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        overall.enable_steady_tick(Duration::from_millis(120));
        overall.set_message("starting");

        Self {
            multi,
            overall,
            ops: Mutex::new(HashMap::new()),
        }
    }

    fn set_operation(&self, op_id: &str, status: &str) {
        let mut ops = self.ops.lock().unwrap();
        let bar = ops.entry(op_id.to_string()).or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::with_template("{spinner:.magenta} {prefix:.bold} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("|/-\\ "),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_prefix(op_id.to_string());
            pb
        });
        bar.set_message(status.to_string());
    }

    fn clear_operation(&self, op_id: &str, final_status: Option<&str>) {
        let mut ops = self.ops.lock().unwrap();
        if let Some(bar) = ops.remove(op_id) {
            match final_status {
                Some(status) => bar.finish_with_message(status.to_string()),
                None => bar.finish_and_clear(),
            }
        }
    }

    fn clear_all_ops(&self) {
        let mut ops = self.ops.lock().unwrap();
        for (_id, bar) in ops.drain() {
            bar.finish_and_clear();
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    eta.map(format_duration)
        .unwrap_or_else(|| "--:--".to_string())
}

/// Linear projection from the average rate so far.
fn compute_eta(total: u64, processed: u64, elapsed: Duration) -> Option<Duration> {
    if processed == 0 || processed >= total {
        return None;
    }
    let per_unit = elapsed.as_secs_f64() / processed as f64;
    let remaining = (total - processed) as f64;
    Some(Duration::from_secs_f64((per_unit * remaining).max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution_respects_tty_override() {
        let cfg_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(true);
        assert_eq!(cfg_tty.resolve_mode(), ResolvedProgressMode::Rich);

        let cfg_not_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(false);
        assert_eq!(cfg_not_tty.resolve_mode(), ResolvedProgressMode::Plain);

        let cfg_quiet = ProgressConfig::new(ProgressMode::Quiet).with_tty_override(true);
        assert_eq!(cfg_quiet.resolve_mode(), ResolvedProgressMode::Quiet);
    }

    #[test]
    fn eta_projects_average_rate() {
        // 4 of 10 units in 8s -> 2s/unit -> 12s left
        let eta = compute_eta(10, 4, Duration::from_secs(8)).expect("eta should exist");
        assert_eq!(eta.as_secs(), 12);

        assert!(compute_eta(10, 10, Duration::from_secs(3)).is_none());
        assert!(compute_eta(10, 0, Duration::from_secs(3)).is_none());
    }

    #[test]
    fn quiet_reporter_counts_units_and_warnings() {
        let cfg = ProgressConfig::new(ProgressMode::Quiet);
        let reporter = ProgressReporter::new("extract", "videos", 3, cfg);
        let handle = reporter.handle();
        handle.inc(1, Some("HELLO"));
        handle.inc(5, Some("WATER"));
        handle.warn("BAD: no frames");

        {
            let state = handle.inner.state.lock().unwrap();
            assert_eq!(state.processed_units, 3);
            assert_eq!(state.total_units, 3);
            assert_eq!(state.current.as_deref(), Some("WATER"));
        }

        let outcome = reporter.finish("done");
        assert_eq!(outcome.warnings, vec!["BAD: no frames".to_string()]);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }
}
