//! cli::commands::org
//!
//! Organization (GitHub) or project (Bitbucket Server) lookups.

use anyhow::{Context as _, Result};

use crate::context::CallContext;
use crate::provider::{GitProvider, Organization};

fn print_organization(org: &Organization) {
    match &org.description {
        Some(description) => println!("{}\t{}\t{}", org.key, org.name, description),
        None => println!("{}\t{}", org.key, org.name),
    }
}

/// Run `org list`.
pub async fn list(provider: &dyn GitProvider, ctx: &CallContext) -> Result<()> {
    let orgs = provider
        .list_organizations(ctx)
        .await
        .context("failed to list organizations")?;
    orgs.iter().for_each(print_organization);
    Ok(())
}

/// Run `org get`.
pub async fn get(provider: &dyn GitProvider, ctx: &CallContext, key: &str) -> Result<()> {
    let org = provider
        .get_organization(ctx, key)
        .await
        .with_context(|| format!("failed to get organization '{key}'"))?;
    print_organization(&org);
    Ok(())
}

/// Run `org children`.
pub async fn children(provider: &dyn GitProvider, ctx: &CallContext, key: &str) -> Result<()> {
    let children = provider
        .organization_children(ctx, key)
        .await
        .with_context(|| format!("failed to list children of '{key}'"))?;
    children.iter().for_each(print_organization);
    Ok(())
}
