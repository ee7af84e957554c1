//! `searchsync status` — what the hash cache tracks for a job.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use searchsync_core::config::{self, SyncConfig};
use searchsync_engine::hash_store;

/// Arguments for `searchsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job file whose hash cache is inspected.
    #[arg(long, default_value = "searchsync.yml")]
    pub config: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = config::home().context("could not determine home directory")?;
        let job = config::load_at(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;

        let report = build_report(&home, &job)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    job: String,
    strategy: String,
    synced_at: Option<DateTime<Utc>>,
    sources: Vec<SourceStatus>,
}

#[derive(Debug, Serialize, Tabled)]
struct SourceStatus {
    #[tabled(rename = "index")]
    index: String,
    #[tabled(rename = "source")]
    source: usize,
    #[tabled(rename = "tracked records")]
    tracked: usize,
}

fn build_report(home: &Path, job: &SyncConfig) -> Result<StatusReport> {
    let strategy = job
        .mode()
        .and_then(|mode| mode.strategy())
        .map(|s| s.to_string())
        .unwrap_or_else(|e| format!("invalid ({e})"));

    let path = hash_store::store_path_at(home, &job.name);
    if !path.exists() {
        return Ok(StatusReport {
            job: job.name.clone(),
            strategy,
            synced_at: None,
            sources: Vec::new(),
        });
    }

    let store = hash_store::load_at(home, &job.name)
        .with_context(|| format!("failed to load hash cache for '{}'", job.name))?;
    let sources = store
        .indexes
        .iter()
        .flat_map(|(index, per_source)| {
            per_source.iter().map(move |(ordinal, hashes)| SourceStatus {
                index: index.to_string(),
                source: *ordinal,
                tracked: hashes.len(),
            })
        })
        .collect();

    Ok(StatusReport {
        job: job.name.clone(),
        strategy,
        synced_at: Some(store.synced_at),
        sources,
    })
}

fn print_table(report: StatusReport) {
    let last_sync = match report.synced_at {
        Some(at) => format!("{} ({})", format_age(at, Utc::now()), at.to_rfc3339()),
        None => "never".to_string(),
    };
    println!(
        "searchsync v{} | job {} | {} | last sync {}",
        env!("CARGO_PKG_VERSION"),
        report.job.bold(),
        report.strategy,
        last_sync
    );

    if report.sources.is_empty() {
        println!("{}", "No hash cache entries.".bright_black());
        return;
    }

    let mut table = Table::new(report.sources);
    table.with(Style::rounded());
    println!("{table}");
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
