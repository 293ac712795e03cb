//! provider::github
//!
//! GitHub REST API v3 (github.com and GitHub Enterprise).
//!
//! Collections are paged with `page`/`per_page`; the next page number comes
//! from the `Link` header. Organizations on github.com have no
//! sub-organizations.

mod kinds;
pub mod types;

pub use kinds::{DeployKeyKind, PullRequestKind, RepositoryKind, TeamAccessKind};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use self::types::{GitHubBranch, GitHubCommit, GitHubOrganization, GitHubRepository, GitHubTeam};
use super::{
    ApiClient, Branch, Commit, DeployKey, GitProvider, Organization, PullRequest, Repository,
    TeamAccess,
};
use crate::context::CallContext;
use crate::error::ProviderError;
use crate::pagination::{all_pages, Page, PageCursor, PageOptions};
use crate::permission::{PermissionMapper, PermissionScope};
use crate::resource::{
    DeployKeyRef, DeployKeySpec, PullRequestRef, PullRequestSpec, RepositoryRef, RepositorySpec,
    ResourceHandle, TeamAccessRef, TeamAccessSpec,
};
use crate::transport::{Request, Session, Transport};

pub(crate) const PROVIDER: &str = "github";

/// Media type that makes the team repository endpoint include `permissions`.
pub(crate) const REPOSITORY_MEDIA_TYPE: &str = "application/vnd.github.v3.repository+json";

pub(crate) fn repo_path(reference: &RepositoryRef) -> String {
    format!("repos/{}/{}", reference.organization, reference.slug)
}

/// GitHub reports duplicates on create as 422 rather than 409.
pub(crate) fn already_exists_on_create(err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Http { status: 422, body } if body.contains("already exists") => {
            ProviderError::AlreadyExists(body)
        }
        ProviderError::Http { status: 422, body } => ProviderError::Validation {
            status_text: "Unprocessable Entity".into(),
            message: body,
        },
        other => other,
    }
}

/// Walk every page of `request` by page number.
pub(crate) async fn paged<T>(
    api: &ApiClient,
    ctx: &CallContext,
    request: Request,
) -> Result<Vec<(T, Session)>, ProviderError>
where
    T: DeserializeOwned + Send,
{
    paged_up_to(api, ctx, request, None).await
}

/// Like [`paged`], stopping after `max_items` items.
pub(crate) async fn paged_up_to<T>(
    api: &ApiClient,
    ctx: &CallContext,
    request: Request,
    max_items: Option<usize>,
) -> Result<Vec<(T, Session)>, ProviderError>
where
    T: DeserializeOwned + Send,
{
    let options = api.pages().up_to(max_items);
    let mut cursor = PageCursor::starting_at(1, None);
    let request = &request;
    all_pages(ctx, &mut cursor, &options, move |c| {
        let page = c.start;
        let request = request
            .clone()
            .with_query("page", page)
            .with_optional_query("per_page", c.limit);
        async move {
            let response = api.execute(ctx, &request).await?;
            let meta = response.meta().clone();
            let values: Vec<T> = response.decode()?;
            Ok(Page::from_link(values, page, meta.next_page).map(|value| (value, meta.session.clone())))
        }
    })
    .await
}

/// GitHub client.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    api: ApiClient,
    mapper: PermissionMapper,
}

impl GitHubProvider {
    pub fn new(transport: Arc<dyn Transport>, pages: PageOptions) -> Self {
        Self {
            api: ApiClient::new(transport, pages),
            mapper: PermissionMapper::github(),
        }
    }

    pub fn repository_kind(&self) -> RepositoryKind {
        RepositoryKind::new(self.api.clone())
    }

    pub fn deploy_key_kind(&self) -> DeployKeyKind {
        DeployKeyKind::new(self.api.clone())
    }

    pub fn team_access_kind(&self) -> TeamAccessKind {
        TeamAccessKind::new(self.api.clone(), self.mapper)
    }

    pub fn pull_request_kind(&self) -> PullRequestKind {
        PullRequestKind::new(self.api.clone())
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn permission_mapper(&self) -> PermissionMapper {
        self.mapper
    }

    async fn get_organization(
        &self,
        ctx: &CallContext,
        key: &str,
    ) -> Result<Organization, ProviderError> {
        let request = Request::get(format!("orgs/{key}"));
        let (org, session) = self.api.fetch::<GitHubOrganization>(ctx, &request).await?;
        org.into_organization(session)
    }

    /// Organizations the authenticated user belongs to.
    async fn list_organizations(
        &self,
        ctx: &CallContext,
    ) -> Result<Vec<Organization>, ProviderError> {
        paged::<GitHubOrganization>(&self.api, ctx, Request::get("user/orgs"))
            .await?
            .into_iter()
            .map(|(org, session)| org.into_organization(session))
            .collect()
    }

    async fn get_repository(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Repository, ProviderError> {
        let handle = ResourceHandle::get(self.repository_kind(), ctx, reference.clone()).await?;
        let raw = handle
            .api_object()
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(reference.to_string()))?;
        raw.into_repository()
    }

    async fn list_repositories(
        &self,
        ctx: &CallContext,
        organization: &str,
    ) -> Result<Vec<Repository>, ProviderError> {
        let request = Request::get(format!("orgs/{organization}/repos"));
        paged::<GitHubRepository>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(mut repo, session)| {
                repo.session = session;
                repo.into_repository()
            })
            .collect()
    }

    async fn delete_repository(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<(), ProviderError> {
        ResourceHandle::new(self.repository_kind(), reference.clone())
            .delete(ctx)
            .await
    }

    async fn reconcile_repository(
        &self,
        ctx: &CallContext,
        organization: &str,
        spec: RepositorySpec,
    ) -> Result<bool, ProviderError> {
        let reference = RepositoryRef::for_name(organization, &spec.name);
        let mut handle = ResourceHandle::new(self.repository_kind(), reference);
        handle.set(spec);
        handle.reconcile(ctx).await
    }

    async fn list_branches(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<Branch>, ProviderError> {
        let repository = self.get_repository(ctx, reference).await?;
        let request = Request::get(format!("{}/branches", repo_path(reference)));
        paged::<GitHubBranch>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(branch, session)| {
                branch.into_branch(repository.default_branch.as_deref(), session)
            })
            .collect()
    }

    async fn list_commits(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        branch: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Commit>, ProviderError> {
        let request = Request::get(format!("{}/commits", repo_path(reference)))
            .with_optional_query("sha", branch);
        paged_up_to::<GitHubCommit>(&self.api, ctx, request, limit)
            .await?
            .into_iter()
            .map(|(commit, session)| commit.into_commit(session))
            .collect()
    }

    async fn list_deploy_keys(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<DeployKey>, ProviderError> {
        let keys = self.deploy_key_kind().list(ctx, reference).await?;
        Ok(keys.iter().map(|k| k.to_deploy_key()).collect())
    }

    async fn reconcile_deploy_key(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: DeployKeySpec,
    ) -> Result<bool, ProviderError> {
        let key_ref = DeployKeyRef {
            repository: reference.clone(),
            label: spec.label.clone(),
        };
        let mut handle = ResourceHandle::new(self.deploy_key_kind(), key_ref);
        handle.set(spec);
        handle.reconcile(ctx).await
    }

    async fn delete_deploy_key(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
    ) -> Result<(), ProviderError> {
        ResourceHandle::new(self.deploy_key_kind(), reference.clone())
            .delete(ctx)
            .await
    }

    /// Team grants as GitHub lists them; the organization base permission is
    /// not folded in here.
    async fn list_team_access(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<TeamAccess>, ProviderError> {
        let request = Request::get(format!("{}/teams", repo_path(reference)));
        paged::<GitHubTeam>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(team, session)| {
                let permission = self
                    .mapper
                    .to_ordinal(PermissionScope::Repository, &team.permission)?;
                Ok(TeamAccess {
                    team: team.slug,
                    permission,
                    session,
                })
            })
            .collect()
    }

    async fn reconcile_team_access(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: TeamAccessSpec,
    ) -> Result<bool, ProviderError> {
        let access_ref = TeamAccessRef {
            repository: reference.clone(),
            team: spec.team.clone(),
        };
        let mut handle = ResourceHandle::new(self.team_access_kind(), access_ref);
        handle.set(spec);
        handle.reconcile(ctx).await
    }

    async fn revoke_team_access(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
    ) -> Result<(), ProviderError> {
        ResourceHandle::new(self.team_access_kind(), reference.clone())
            .delete(ctx)
            .await
    }

    async fn get_pull_request(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        id: u64,
    ) -> Result<PullRequest, ProviderError> {
        let raw = self.pull_request_kind().get(ctx, reference, id).await?;
        Ok(raw.to_pull_request())
    }

    async fn reconcile_pull_request(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: PullRequestSpec,
    ) -> Result<bool, ProviderError> {
        let pr_ref = PullRequestRef {
            repository: reference.clone(),
            source_branch: spec.source_branch.clone(),
        };
        let mut handle = ResourceHandle::new(self.pull_request_kind(), pr_ref);
        handle.set(spec);
        handle.reconcile(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn duplicate_name_on_create_is_already_exists() {
        let err = already_exists_on_create(ProviderError::Http {
            status: 422,
            body: "Validation Failed (name already exists on this account)".into(),
        });
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn other_unprocessable_is_validation() {
        let err = already_exists_on_create(ProviderError::Http {
            status: 422,
            body: "Validation Failed (key is invalid)".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn other_errors_pass_through() {
        let err = already_exists_on_create(ProviderError::NotFound("x".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn repo_path_uses_owner_and_name() {
        assert_eq!(repo_path(&RepositoryRef::new("acme", "svc")), "repos/acme/svc");
    }
}
