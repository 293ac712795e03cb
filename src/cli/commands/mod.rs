//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Calls one or more [`GitProvider`] operations
//! 2. Formats and displays output
//!
//! Handlers never build requests themselves. Listings print one
//! tab-separated line per item so output can be piped.

mod access;
mod apply;
mod branch;
mod completion;
mod org;
mod pr;
mod repo;

// Re-export command functions for testing and direct invocation
pub use apply::{apply, apply_entries, apply_entry, ApplyReport, Outcome};
pub use completion::completion;

use anyhow::Result;

use crate::cli::args::{
    AccessAction, BranchAction, Command, CommitAction, KeyAction, OrgAction, PrAction, RepoAction,
};
use crate::context::CallContext;
use crate::provider::GitProvider;

/// Dispatch a command to its handler.
pub async fn dispatch(
    command: Command,
    provider: &dyn GitProvider,
    ctx: &CallContext,
    quiet: bool,
) -> Result<()> {
    match command {
        Command::Apply {
            manifest,
            keep_going,
        } => apply::apply(provider, ctx, &manifest, keep_going, quiet).await,

        Command::Org { action } => match action {
            OrgAction::List => org::list(provider, ctx).await,
            OrgAction::Get { key } => org::get(provider, ctx, &key).await,
            OrgAction::Children { key } => org::children(provider, ctx, &key).await,
        },
        Command::Repo { action } => match action {
            RepoAction::List { organization } => repo::list(provider, ctx, &organization).await,
            RepoAction::Get { repository } => repo::get(provider, ctx, &repository).await,
            RepoAction::Delete { repository, yes } => {
                repo::delete(provider, ctx, &repository, yes, quiet).await
            }
        },
        Command::Branch { action } => match action {
            BranchAction::List { repository } => branch::list(provider, ctx, &repository).await,
        },
        Command::Commit { action } => match action {
            CommitAction::List {
                repository,
                branch,
                limit,
            } => branch::commits(provider, ctx, &repository, branch.as_deref(), limit).await,
        },
        Command::Key { action } => match action {
            KeyAction::List { repository } => access::keys(provider, ctx, &repository).await,
        },
        Command::Access { action } => match action {
            AccessAction::List { repository } => access::teams(provider, ctx, &repository).await,
        },
        Command::Pr { action } => match action {
            PrAction::Get { repository, id } => pr::get(provider, ctx, &repository, id).await,
        },

        // Handled before a provider is built
        Command::Completion { shell } => completion::completion(shell),
    }
}
