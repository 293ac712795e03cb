//! cli::commands::pr
//!
//! Show a pull request.
//!
//! # Example
//!
//! ```bash
//! gitprovider pr get PRJ/billing 42
//! ```

use anyhow::{Context as _, Result};

use crate::context::CallContext;
use crate::provider::GitProvider;
use crate::resource::RepositoryRef;

/// Run `pr get`.
pub async fn get(
    provider: &dyn GitProvider,
    ctx: &CallContext,
    repository: &RepositoryRef,
    id: u64,
) -> Result<()> {
    let pr = provider
        .get_pull_request(ctx, repository, id)
        .await
        .with_context(|| format!("failed to get pull request {id} on {repository}"))?;

    println!("#{} {}", pr.id, pr.title);
    println!("state:  {}", pr.state);
    println!("branch: {} -> {}", pr.source_branch, pr.target_branch);
    if let Some(version) = pr.version {
        println!("version: {version}");
    }
    if let Some(url) = &pr.url {
        println!("url:    {url}");
    }
    if let Some(description) = &pr.description {
        println!();
        println!("{description}");
    }
    Ok(())
}
