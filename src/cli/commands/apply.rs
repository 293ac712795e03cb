//! cli::commands::apply
//!
//! Reconcile a desired-state manifest.
//!
//! # Design
//!
//! Entries are reconciled one at a time in manifest order. Each reports
//! changed, unchanged or failed. By default the first failure stops the run;
//! with `--keep-going` later entries are still attempted. Cancellation always
//! stops the run.

use std::fmt;
use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::cli::manifest::{Manifest, ManifestEntry};
use crate::context::CallContext;
use crate::error::{ErrorKind, ProviderError};
use crate::provider::GitProvider;

/// Result of reconciling one entry.
#[derive(Debug)]
pub enum Outcome {
    Changed,
    Unchanged,
    Failed(ProviderError),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Outcome::Changed => "changed",
            Outcome::Unchanged => "unchanged",
            Outcome::Failed(_) => "failed",
        })
    }
}

/// Outcomes of an apply run, in the order entries were attempted.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub results: Vec<(ManifestEntry, Outcome)>,
}

impl ApplyReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Changed))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Reconcile one entry through the provider.
pub async fn apply_entry(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    entry: &ManifestEntry,
) -> Result<bool, ProviderError> {
    match entry {
        ManifestEntry::Repository { organization, spec } => {
            provider
                .reconcile_repository(ctx, organization, spec.clone())
                .await
        }
        ManifestEntry::DeployKey { repository, spec } => {
            provider
                .reconcile_deploy_key(ctx, repository, spec.clone())
                .await
        }
        ManifestEntry::TeamAccess { repository, spec } => {
            provider
                .reconcile_team_access(ctx, repository, spec.clone())
                .await
        }
        ManifestEntry::PullRequest { repository, spec } => {
            provider
                .reconcile_pull_request(ctx, repository, spec.clone())
                .await
        }
    }
}

/// Reconcile `entries` in order.
pub async fn apply_entries(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    entries: Vec<ManifestEntry>,
    keep_going: bool,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for entry in entries {
        let outcome = match apply_entry(provider, ctx, &entry).await {
            Ok(true) => Outcome::Changed,
            Ok(false) => Outcome::Unchanged,
            Err(e) => {
                if e.kind() == ErrorKind::RecreateFailed {
                    tracing::error!(entry = %entry, error = %e, "resource was deleted and not recreated");
                } else {
                    tracing::warn!(entry = %entry, error = %e, "entry failed");
                }
                Outcome::Failed(e)
            }
        };

        let stop = match &outcome {
            Outcome::Failed(e) => !keep_going || e.is_context_error(),
            _ => false,
        };
        report.results.push((entry, outcome));
        if stop {
            break;
        }
    }

    report
}

/// Run `apply`.
pub async fn apply(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    path: &Path,
    keep_going: bool,
    quiet: bool,
) -> Result<()> {
    let manifest = Manifest::load(path)?;
    let entries = manifest
        .entries()
        .with_context(|| format!("invalid manifest '{}'", path.display()))?;
    if entries.is_empty() {
        if !quiet {
            println!("Nothing to apply.");
        }
        return Ok(());
    }

    let total = entries.len();
    let report = apply_entries(provider, ctx, entries, keep_going).await;

    for (entry, outcome) in &report.results {
        match outcome {
            Outcome::Failed(e) => eprintln!("{outcome:>9}  {entry}: {e}"),
            _ if !quiet => println!("{outcome:>9}  {entry}"),
            _ => {}
        }
    }
    if !quiet {
        println!(
            "\n{} changed, {} unchanged, {} failed, {} not attempted",
            report.changed(),
            report.unchanged(),
            report.failed(),
            total - report.results.len()
        );
    }

    if !report.is_success() {
        bail!("{} of {} entries failed", report.failed(), total);
    }
    Ok(())
}
