//! cli::commands::repo
//!
//! Repository listing, lookup and deletion.
//!
//! # Example
//!
//! ```bash
//! gitprovider repo list PRJ
//! gitprovider repo get PRJ/billing
//! gitprovider repo delete PRJ/billing --yes
//! ```

use anyhow::{bail, Context as _, Result};

use crate::context::CallContext;
use crate::provider::GitProvider;
use crate::resource::RepositoryRef;

/// Run `repo list`.
pub async fn list(provider: &dyn GitProvider, ctx: &CallContext, organization: &str) -> Result<()> {
    let repos = provider
        .list_repositories(ctx, organization)
        .await
        .with_context(|| format!("failed to list repositories of '{organization}'"))?;
    for repo in &repos {
        println!(
            "{}\t{}\t{}",
            repo.reference(),
            repo.visibility,
            repo.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Run `repo get`.
pub async fn get(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
) -> Result<()> {
    let repo = provider
        .get_repository(ctx, repository)
        .await
        .with_context(|| format!("failed to get repository {repository}"))?;

    println!("repository:     {}", repo.reference());
    println!("name:           {}", repo.name);
    println!("visibility:     {}", repo.visibility);
    println!(
        "default branch: {}",
        repo.default_branch.as_deref().unwrap_or("-")
    );
    if let Some(description) = &repo.description {
        println!("description:    {description}");
    }
    for url in &repo.clone_urls {
        println!("clone:          {url}");
    }
    Ok(())
}

/// Run `repo delete`. Refuses without `--yes`.
pub async fn delete(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
    yes: bool,
    quiet: bool,
) -> Result<()> {
    if !yes {
        bail!("refusing to delete {repository} without --yes");
    }
    provider
        .delete_repository(ctx, repository)
        .await
        .with_context(|| format!("failed to delete repository {repository}"))?;
    if !quiet {
        println!("Deleted {repository}");
    }
    Ok(())
}
