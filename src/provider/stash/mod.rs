//! provider::stash
//!
//! Bitbucket Server (formerly Stash) REST API 1.0.
//!
//! # Endpoints
//!
//! - `rest/api/1.0/projects[/{key}]`: organizations
//! - `rest/api/1.0/projects/{key}/repos[/{slug}]`: repositories, plus
//!   `branches`, `commits`, `permissions/groups` and `pull-requests` below
//! - `rest/keys/1.0/projects/{key}/repos/{slug}/ssh[/{id}]`: deploy keys
//!
//! Collections are paged with `start`/`limit` and the standard envelope; see
//! [`Page`](crate::pagination::Page).
//!
//! Projects have no sub-projects, so
//! [`organization_children`](GitProvider::organization_children) is
//! `NoProviderSupport`.

mod kinds;
pub mod types;

pub use kinds::{DeployKeyKind, PullRequestKind, RepositoryKind, TeamAccessKind};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use self::types::{StashBranch, StashCommit, StashProject, StashRepository};
use super::{
    ApiClient, Branch, Commit, DeployKey, GitProvider, Organization, PullRequest, Repository,
    TeamAccess,
};
use crate::context::CallContext;
use crate::error::ProviderError;
use crate::pagination::{all_pages, Page, PageCursor, PageOptions};
use crate::permission::PermissionMapper;
use crate::resource::{
    DeployKeyRef, DeployKeySpec, PullRequestRef, PullRequestSpec, RepositoryRef, RepositorySpec,
    ResourceHandle, TeamAccessRef, TeamAccessSpec,
};
use crate::transport::{Request, Session, Transport};

pub(crate) const PROVIDER: &str = "stash";

pub(crate) fn repo_path(reference: &RepositoryRef) -> String {
    format!(
        "rest/api/1.0/projects/{}/repos/{}",
        reference.organization, reference.slug
    )
}

pub(crate) fn keys_path(reference: &RepositoryRef) -> String {
    format!(
        "rest/keys/1.0/projects/{}/repos/{}/ssh",
        reference.organization, reference.slug
    )
}

/// Walk every page of `request`, pairing each item with its page's session.
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
    let mut cursor = PageCursor::default();
    let request = &request;
    all_pages(ctx, &mut cursor, &options, move |c| {
        let request = request
            .clone()
            .with_query("start", c.start)
            .with_optional_query("limit", c.limit);
        async move {
            let response = api.execute(ctx, &request).await?;
            let session = response.meta().session.clone();
            Ok(response
                .decode::<Page<T>>()?
                .map(|value| (value, session.clone())))
        }
    })
    .await
}

/// Bitbucket Server client.
#[derive(Debug, Clone)]
pub struct StashProvider {
    api: ApiClient,
    mapper: PermissionMapper,
}

impl StashProvider {
    pub fn new(transport: Arc<dyn Transport>, pages: PageOptions) -> Self {
        Self {
            api: ApiClient::new(transport, pages),
            mapper: PermissionMapper::stash(),
        }
    }

    pub fn repository_kind(&self) -> RepositoryKind {
        RepositoryKind::new(self.api.clone())
    }

    pub fn deploy_key_kind(&self) -> DeployKeyKind {
        DeployKeyKind::new(self.api.clone(), self.mapper)
    }

    pub fn team_access_kind(&self) -> TeamAccessKind {
        TeamAccessKind::new(self.api.clone(), self.mapper)
    }

    pub fn pull_request_kind(&self) -> PullRequestKind {
        PullRequestKind::new(self.api.clone())
    }
}

#[async_trait]
impl GitProvider for StashProvider {
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
        let request = Request::get(format!("rest/api/1.0/projects/{key}"));
        let (project, session) = self.api.fetch::<StashProject>(ctx, &request).await?;
        project.into_organization(session)
    }

    async fn list_organizations(
        &self,
        ctx: &CallContext,
    ) -> Result<Vec<Organization>, ProviderError> {
        paged::<StashProject>(&self.api, ctx, Request::get("rest/api/1.0/projects"))
            .await?
            .into_iter()
            .map(|(project, session)| project.into_organization(session))
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

    /// Listed repositories carry no default branch; use
    /// [`get_repository`](GitProvider::get_repository) for it.
    async fn list_repositories(
        &self,
        ctx: &CallContext,
        organization: &str,
    ) -> Result<Vec<Repository>, ProviderError> {
        let request = Request::get(format!("rest/api/1.0/projects/{organization}/repos"));
        paged::<StashRepository>(&self.api, ctx, request)
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
        let request = Request::get(format!("{}/branches", repo_path(reference)))
            .with_query("details", "true");
        paged::<StashBranch>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(branch, session)| branch.into_branch(session))
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
            .with_optional_query("until", branch);
        paged_up_to::<StashCommit>(&self.api, ctx, request, limit)
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

    async fn list_team_access(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<TeamAccess>, ProviderError> {
        let grants = self.team_access_kind().list(ctx, reference).await?;
        Ok(grants
            .into_iter()
            .filter_map(|grant| {
                grant.effective().map(|permission| TeamAccess {
                    team: grant.team,
                    permission,
                    session: grant.session,
                })
            })
            .collect())
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
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::transport::{Response, ResponseMeta};

    /// Replays canned JSON bodies and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<serde_json::Value, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(
            &self,
            ctx: &CallContext,
            request: &Request,
        ) -> Result<Response, ProviderError> {
            ctx.check()?;
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request {} {}", request.method(), request.path()));
            let body = next?;
            Ok(Response::new(
                serde_json::to_vec(&body).unwrap(),
                ResponseMeta {
                    status: 200,
                    ..Default::default()
                },
            ))
        }
    }

    fn provider(transport: Arc<ScriptedTransport>) -> StashProvider {
        StashProvider::new(transport, PageOptions::default())
    }

    fn repo_json(description: &str) -> serde_json::Value {
        serde_json::json!({
            "slug": "billing", "name": "billing", "public": false,
            "description": description, "defaultBranch": "refs/heads/main",
            "project": {"key": "PRJ"}
        })
    }

    #[tokio::test]
    async fn list_organizations_follows_next_page_start() {
        let transport = ScriptedTransport::new(vec![
            Ok(serde_json::json!({
                "values": [{"key": "A"}, {"key": "B"}],
                "isLastPage": false, "nextPageStart": 2, "start": 0, "size": 2
            })),
            Ok(serde_json::json!({
                "values": [{"key": "C"}], "isLastPage": true, "start": 2, "size": 1
            })),
        ]);
        let orgs = provider(Arc::clone(&transport))
            .list_organizations(&CallContext::new())
            .await
            .unwrap();

        let keys: Vec<_> = orgs.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        let starts: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.query()[0].1.clone())
            .collect();
        assert_eq!(starts, vec!["0", "2"]);
    }

    #[tokio::test]
    async fn children_are_unsupported() {
        let transport = ScriptedTransport::new(vec![]);
        let err = provider(Arc::clone(&transport))
            .organization_children(&CallContext::new(), "PRJ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NoProviderSupport);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn reconcile_satisfied_repository_makes_one_call() {
        let transport = ScriptedTransport::new(vec![Ok(repo_json("Payments"))]);
        let changed = provider(Arc::clone(&transport))
            .reconcile_repository(
                &CallContext::new(),
                "PRJ",
                RepositorySpec::new("billing").with_description("Payments"),
            )
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_changed_repository_puts_merged_form() {
        let transport = ScriptedTransport::new(vec![
            Ok(repo_json("Old")),
            Ok(repo_json("Payments")),
        ]);
        let changed = provider(Arc::clone(&transport))
            .reconcile_repository(
                &CallContext::new(),
                "PRJ",
                RepositorySpec::new("billing").with_description("Payments"),
            )
            .await
            .unwrap();
        assert!(changed);

        let requests = transport.requests();
        let put = &requests[1];
        assert_eq!(put.method(), crate::transport::Method::Put);
        assert_eq!(put.path(), "rest/api/1.0/projects/PRJ/repos/billing");
        let body = put.body().unwrap();
        assert_eq!(body["description"], "Payments");
        assert_eq!(body["defaultBranch"], "main");
        assert_eq!(body["public"], false);
    }

    #[tokio::test]
    async fn missing_default_branch_is_fetched_separately() {
        let transport = ScriptedTransport::new(vec![
            Ok(serde_json::json!({
                "slug": "billing", "name": "billing", "project": {"key": "PRJ"}
            })),
            Ok(serde_json::json!({"id": "refs/heads/develop", "displayId": "develop"})),
        ]);
        let repo = provider(Arc::clone(&transport))
            .get_repository(&CallContext::new(), &RepositoryRef::new("PRJ", "billing"))
            .await
            .unwrap();
        assert_eq!(repo.default_branch.as_deref(), Some("develop"));
        assert_eq!(
            transport.requests()[1].path(),
            "rest/api/1.0/projects/PRJ/repos/billing/branches/default"
        );
    }

    #[tokio::test]
    async fn team_access_prefers_exact_name_over_filter_hits() {
        let transport = ScriptedTransport::new(vec![
            Ok(serde_json::json!({"values": [
                {"group": {"name": "devs-ops"}, "permission": "REPO_ADMIN"},
                {"group": {"name": "devs"}, "permission": "REPO_WRITE"}
            ]})),
            Ok(serde_json::json!({"values": []})),
        ]);
        let changed = provider(Arc::clone(&transport))
            .reconcile_team_access(
                &CallContext::new(),
                &RepositoryRef::new("PRJ", "billing"),
                TeamAccessSpec::new("devs", crate::permission::PermissionLevel::Write),
            )
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(transport.requests()[0].query()[0], ("filter".into(), "devs".into()));
    }
}
