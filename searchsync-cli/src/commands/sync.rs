//! `searchsync sync` — run one job against its index service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use searchsync_core::config;
use searchsync_engine::{
    pipeline::{self, SyncContext},
    IndexOutcome, JsonSnapshotStore, LocalIndexService, SyncReport, TracingActivity,
};

/// Arguments for `searchsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Job file to run.
    #[arg(long, default_value = "searchsync.yml")]
    pub config: PathBuf,

    /// Directory of the local index service (overrides `local_index_dir`).
    #[arg(long)]
    pub local_index_dir: Option<PathBuf>,

    /// Compute the plan without writing to any index or the hash cache.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = config::home().context("could not determine home directory")?;
        let job = config::load_at(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        let base = config::base_dir(&self.config);
        let mode = job.mode()?;
        let sources = job
            .resolve_sources(&base)
            .with_context(|| format!("invalid job '{}'", job.name))?;

        let root = self
            .local_index_dir
            .clone()
            .or_else(|| job.local_index_dir(&base))
            .context("no index service configured; set `local_index_dir` or pass --local-index-dir")?;

        tracing::debug!(job = %job.name, root = %root.display(), "using local index service");
        let service = LocalIndexService::new(root);
        let store = JsonSnapshotStore::at(&home, &job.name);
        let activity = TracingActivity::start(job.name.clone());
        let ctx = SyncContext::new(&service, &activity, mode)
            .with_hash_store(&store)
            .dry_run(self.dry_run);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let result = runtime.block_on(pipeline::run(&ctx, sources));
        activity.end();
        let report = result.with_context(|| format!("sync failed for '{}'", job.name))?;

        if self.json {
            let payload = ReportJson::from(&report);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
            );
            return Ok(());
        }
        print_report(&job.name, &report);
        Ok(())
    }
}

#[derive(Serialize)]
struct ReportJson {
    strategy: String,
    dry_run: bool,
    hash_cache_saved: bool,
    indexes: Vec<IndexJson>,
}

#[derive(Serialize)]
struct IndexJson {
    index: String,
    target: Option<String>,
    phase: String,
    deleted: Vec<String>,
    sources: Vec<SourceJson>,
}

#[derive(Serialize)]
struct SourceJson {
    ordinal: usize,
    records: usize,
    changed: usize,
    batches: usize,
}

impl From<&SyncReport> for ReportJson {
    fn from(report: &SyncReport) -> Self {
        Self {
            strategy: report.strategy.to_string(),
            dry_run: report.dry_run,
            hash_cache_saved: report.hash_cache_saved,
            indexes: report
                .indexes
                .iter()
                .map(|outcome| IndexJson {
                    index: outcome.index.to_string(),
                    target: outcome.target.as_ref().map(|t| t.index().to_string()),
                    phase: outcome.phase.to_string(),
                    deleted: outcome.deleted.iter().map(|id| id.0.clone()).collect(),
                    sources: outcome
                        .sources
                        .iter()
                        .map(|s| SourceJson {
                            ordinal: s.ordinal,
                            records: s.records,
                            changed: s.changed,
                            batches: s.batches,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn print_report(job: &str, report: &SyncReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{} '{job}' synced ({}; {} changed, {} deleted)",
        "✓".green().bold(),
        report.strategy,
        report.changed(),
        report.deleted()
    );
    for outcome in &report.indexes {
        print_index(outcome, report.dry_run);
    }
    if report.hash_cache_saved {
        println!("  hash cache updated");
    }
}

fn print_index(outcome: &IndexOutcome, dry_run: bool) {
    let target = outcome
        .target
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| outcome.index.to_string());
    println!("  {} → {target} [{}]", outcome.index.to_string().bold(), outcome.phase);
    let verb = if dry_run { "would upload" } else { "uploaded" };
    for source in &outcome.sources {
        println!(
            "    ·  source {}: {verb} {}/{} records in {} batches",
            source.ordinal, source.changed, source.records, source.batches
        );
    }
    if !outcome.deleted.is_empty() {
        let verb = if dry_run { "would delete" } else { "deleted" };
        println!("    ✗  {verb} {} stale records", outcome.deleted.len());
    }
}
