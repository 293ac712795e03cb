//! cli::commands::branch
//!
//! Branch and commit listings.

use anyhow::{Context as _, Result};

use crate::context::CallContext;
use crate::provider::GitProvider;
use crate::resource::RepositoryRef;

/// Run `branch list`. The default branch is marked with `*`.
pub async fn list(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
) -> Result<()> {
    let branches = provider
        .list_branches(ctx, repository)
        .await
        .with_context(|| format!("failed to list branches of {repository}"))?;
    for branch in &branches {
        let marker = if branch.is_default { "*" } else { " " };
        println!(
            "{marker} {}\t{}",
            branch.name,
            branch.latest_commit.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Run `commit list`.
pub async fn commits(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
    branch: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let commits = provider
        .list_commits(ctx, repository, branch, limit)
        .await
        .with_context(|| format!("failed to list commits of {repository}"))?;
    for commit in &commits {
        let date = commit
            .timestamp
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{} {} {} ({})",
            commit.short_id(),
            date,
            commit.summary(),
            commit.author_name
        );
    }
    Ok(())
}
