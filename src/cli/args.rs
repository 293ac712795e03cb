//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Read configuration from this file
//! - `--provider <name>` / `--base-url <url>`: Override the configured provider
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::resource::RepositoryRef;

/// gitprovider - Reconcile repositories, keys, access and pull requests on
/// GitHub and Bitbucket Server
#[derive(Parser, Debug)]
#[command(name = "gitprovider")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Provider to talk to (github, stash, bitbucket-server)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// API root URL of the provider
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile every entry of a desired-state manifest
    #[command(
        name = "apply",
        long_about = "Reconcile every entry of a desired-state manifest.\n\n\
            Each entry is fetched, compared with the manifest, and created or \
            updated only when it differs. Entries are applied in file order: \
            repositories, deploy keys, team access, then pull requests.",
        after_help = "\
MANIFEST EXAMPLE:
    [[repository]]
    organization = \"PRJ\"
    name = \"billing\"
    description = \"Billing service\"
    visibility = \"private\"

    [[deploy_key]]
    repository = \"PRJ/billing\"
    label = \"ci\"
    key = \"ssh-ed25519 AAAA...\"

    [[team_access]]
    repository = \"PRJ/billing\"
    team = \"developers\"
    permission = \"write\"

WORKFLOW EXAMPLES:
    gitprovider apply desired.toml
    gitprovider apply desired.toml --keep-going"
    )]
    Apply {
        /// Manifest file (TOML)
        manifest: PathBuf,

        /// Continue with later entries after one fails
        #[arg(long)]
        keep_going: bool,
    },

    /// Organizations (GitHub) or projects (Bitbucket Server)
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// Repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Commits
    Commit {
        #[command(subcommand)]
        action: CommitAction,
    },

    /// Deploy keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Team access grants
    Access {
        #[command(subcommand)]
        action: AccessAction,
    },

    /// Pull requests
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    gitprovider completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    gitprovider completion zsh >> ~/.zshrc"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum OrgAction {
    /// List organizations visible to the configured credentials
    List,
    /// Show one organization
    Get { key: String },
    /// List sub-organizations
    Children { key: String },
}

#[derive(Subcommand, Debug)]
pub enum RepoAction {
    /// List repositories of an organization
    List { organization: String },
    /// Show one repository
    Get {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,
    },
    /// Delete a repository
    Delete {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum BranchAction {
    /// List branches of a repository
    List {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,
    },
}

#[derive(Subcommand, Debug)]
pub enum CommitAction {
    /// List commits of a repository
    List {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,

        /// Branch to list from; defaults to the default branch
        #[arg(long)]
        branch: Option<String>,

        /// Show at most this many commits
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// List deploy keys of a repository
    List {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccessAction {
    /// List team access grants on a repository
    List {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrAction {
    /// Show one pull request
    Get {
        /// Repository as ORG/SLUG
        #[arg(value_parser = parse_repository_ref)]
        repository: RepositoryRef,

        /// Pull request id or number
        id: u64,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Parse `ORG/SLUG`.
pub fn parse_repository_ref(s: &str) -> Result<RepositoryRef, String> {
    match s.split_once('/') {
        Some((org, slug)) if !org.is_empty() && !slug.is_empty() && !slug.contains('/') => {
            Ok(RepositoryRef::new(org, slug))
        }
        _ => Err(format!("expected ORG/SLUG, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repository_ref_parses() {
        let r = parse_repository_ref("PRJ/billing").unwrap();
        assert_eq!(r.organization, "PRJ");
        assert_eq!(r.slug, "billing");
    }

    #[test]
    fn repository_ref_rejects_malformed() {
        assert!(parse_repository_ref("billing").is_err());
        assert!(parse_repository_ref("/billing").is_err());
        assert!(parse_repository_ref("a/b/c").is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gitprovider",
            "repo",
            "get",
            "PRJ/svc",
            "--provider",
            "stash",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("stash"));
        assert!(cli.debug);
    }

    #[test]
    fn apply_flags() {
        let cli = Cli::try_parse_from(["gitprovider", "apply", "m.toml", "--keep-going"]).unwrap();
        match cli.command {
            Command::Apply {
                manifest,
                keep_going,
            } => {
                assert_eq!(manifest, PathBuf::from("m.toml"));
                assert!(keep_going);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
