//! cli::commands::access
//!
//! Deploy key and team access listings.

use anyhow::{Context as _, Result};

use crate::context::CallContext;
use crate::provider::GitProvider;
use crate::resource::{normalize_public_key, RepositoryRef};

/// Run `key list`.
pub async fn keys(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
) -> Result<()> {
    let keys = provider
        .list_deploy_keys(ctx, repository)
        .await
        .with_context(|| format!("failed to list deploy keys of {repository}"))?;
    for key in &keys {
        let mode = if key.read_only { "read" } else { "write" };
        println!(
            "{}\t{}\t{}\t{}",
            key.id,
            key.label,
            mode,
            normalize_public_key(&key.key)
        );
    }
    Ok(())
}

/// Run `access list`.
pub async fn teams(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
) -> Result<()> {
    let grants = provider
        .list_team_access(ctx, repository)
        .await
        .with_context(|| format!("failed to list team access on {repository}"))?;
    for grant in &grants {
        println!("{}\t{}", grant.team, grant.permission);
    }
    Ok(())
}
