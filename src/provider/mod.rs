//! provider
//!
//! Provider-agnostic client over Git-hosting REST APIs.
//!
//! # Architecture
//!
//! [`GitProvider`] is the uniform surface. Callers obtain one from
//! [`create_provider`] rather than naming a backend directly.
//!
//! Each backend is a plain struct holding a shared [`Transport`] and its page
//! options, plus one [`ResourceKind`](crate::resource::ResourceKind) type per
//! reconcilable resource. Reconcile methods build a
//! [`ResourceHandle`](crate::resource::ResourceHandle) for the requested
//! reference and run it.
//!
//! # Modules
//!
//! - [`stash`]: Bitbucket Server REST API 1.0
//! - [`github`]: GitHub REST API v3
//! - `factory`: provider selection and construction
//!
//! # Example
//!
//! ```no_run
//! use gitprovider::config::Config;
//! use gitprovider::provider::create_provider;
//! use gitprovider::resource::{RepositorySpec, Visibility};
//! use gitprovider::CallContext;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let provider = create_provider(&Config::load()?)?;
//! let changed = provider
//!     .reconcile_repository(
//!         &CallContext::new(),
//!         "PRJ",
//!         RepositorySpec::new("billing").with_visibility(Visibility::Private),
//!     )
//!     .await?;
//! println!("changed: {changed}");
//! # Ok(())
//! # }
//! ```

mod factory;
pub mod github;
pub mod stash;
mod types;

pub use factory::{
    create_provider, create_provider_with_transport, valid_provider_names, ProviderKind,
};
pub use types::{
    Branch, Commit, DeployKey, Organization, PullRequest, PullRequestState, Repository, TeamAccess,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::context::CallContext;
use crate::error::ProviderError;
use crate::pagination::PageOptions;
use crate::permission::PermissionMapper;
use crate::resource::{
    DeployKeyRef, DeployKeySpec, PullRequestSpec, RepositoryRef, RepositorySpec, TeamAccessRef,
    TeamAccessSpec,
};
use crate::transport::{Request, Response, Session, Transport};

/// Uniform operations over a Git-hosting provider.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync` and hold no per-call state; one value
/// can serve concurrent callers.
///
/// # Error Handling
///
/// Errors are [`ProviderError`]s; match on [`ProviderError::kind`]:
/// - `NotFound`: the resource does not exist
/// - `NoProviderSupport`: this backend has no such capability
/// - `VersionConflict`: someone else changed the resource first
/// - `RecreateFailed`: a delete-then-create lost the resource
///
/// Every `reconcile_*` method returns whether it changed anything.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Provider name, e.g. "github".
    fn name(&self) -> &'static str;

    /// Permission mapping used by this provider.
    fn permission_mapper(&self) -> PermissionMapper;

    async fn get_organization(
        &self,
        ctx: &CallContext,
        key: &str,
    ) -> Result<Organization, ProviderError>;

    async fn list_organizations(&self, ctx: &CallContext)
        -> Result<Vec<Organization>, ProviderError>;

    /// Sub-organizations. Backends without a hierarchy always return
    /// `NoProviderSupport`.
    async fn organization_children(
        &self,
        _ctx: &CallContext,
        _key: &str,
    ) -> Result<Vec<Organization>, ProviderError> {
        Err(ProviderError::unsupported(self.name(), "sub-organizations"))
    }

    async fn get_repository(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Repository, ProviderError>;

    async fn list_repositories(
        &self,
        ctx: &CallContext,
        organization: &str,
    ) -> Result<Vec<Repository>, ProviderError>;

    async fn delete_repository(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<(), ProviderError>;

    /// Create or update the repository named by `spec` in `organization`.
    async fn reconcile_repository(
        &self,
        ctx: &CallContext,
        organization: &str,
        spec: RepositorySpec,
    ) -> Result<bool, ProviderError>;

    async fn list_branches(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<Branch>, ProviderError>;

    /// Commits reachable from `branch`, or from the default branch, newest
    /// first. With `limit` set, paging stops once that many are collected.
    async fn list_commits(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        branch: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Commit>, ProviderError>;

    async fn list_deploy_keys(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<DeployKey>, ProviderError>;

    async fn reconcile_deploy_key(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: DeployKeySpec,
    ) -> Result<bool, ProviderError>;

    async fn delete_deploy_key(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
    ) -> Result<(), ProviderError>;

    async fn list_team_access(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<TeamAccess>, ProviderError>;

    async fn reconcile_team_access(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: TeamAccessSpec,
    ) -> Result<bool, ProviderError>;

    /// Remove the team's repository-level grant.
    async fn revoke_team_access(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
    ) -> Result<(), ProviderError>;

    async fn get_pull_request(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        id: u64,
    ) -> Result<PullRequest, ProviderError>;

    /// Open, or bring up to date, the pull request from `spec.source_branch`.
    async fn reconcile_pull_request(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: PullRequestSpec,
    ) -> Result<bool, ProviderError>;
}

/// Transport plus page options, shared by a provider and its resource kinds.
#[derive(Clone)]
pub(crate) struct ApiClient {
    transport: Arc<dyn Transport>,
    pages: PageOptions,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub(crate) fn new(transport: Arc<dyn Transport>, pages: PageOptions) -> Self {
        Self { transport, pages }
    }

    pub(crate) fn pages(&self) -> &PageOptions {
        &self.pages
    }

    pub(crate) async fn execute(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<Response, ProviderError> {
        self.transport.execute(ctx, request).await
    }

    /// Execute and decode, returning the response session alongside.
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: &Request,
    ) -> Result<(T, Session), ProviderError> {
        let response = self.execute(ctx, request).await?;
        let value = response.decode()?;
        Ok((value, response.meta().session.clone()))
    }
}

/// First candidate whose key matches exactly. List filters are hints, not
/// guarantees.
pub(crate) fn exact_match<T>(
    candidates: Vec<T>,
    key: impl Fn(&T) -> &str,
    wanted: &str,
    what: impl FnOnce() -> String,
) -> Result<T, ProviderError> {
    candidates
        .into_iter()
        .find(|c| key(c) == wanted)
        .ok_or_else(|| ProviderError::NotFound(what()))
}
