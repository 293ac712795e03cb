//! provider::github::kinds
//!
//! [`ResourceKind`] implementations for GitHub.
//!
//! Repositories and pull requests use `Patch`: `apply_spec` records only the
//! fields that differ in the raw form's `patch` map, and that map is the
//! PATCH body. Deploy keys cannot be edited and are recreated. Team grants
//! are replaced with a PUT.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::types::{GitHubDeployKey, GitHubOrganization, GitHubPullRequest, GitHubRepository, GitHubTeamGrant};
use super::{already_exists_on_create, paged, repo_path, PROVIDER, REPOSITORY_MEDIA_TYPE};
use crate::context::CallContext;
use crate::error::ProviderError;
use crate::permission::{PermissionLevel, PermissionMapper, PermissionScope};
use crate::provider::types::non_empty;
use crate::provider::{exact_match, ApiClient};
use crate::resource::{
    normalize_public_key, DeployKeyRef, DeployKeySpec, PullRequestRef, PullRequestSpec,
    RepositoryRef, RepositorySpec, ResourceKind, TeamAccessRef, TeamAccessSpec, UpdateStrategy,
};
use crate::transport::Request;

/// Record `value` under `key` when it differs from `current`.
fn stage<T: PartialEq + Into<Value> + Clone>(
    patch: &mut Map<String, Value>,
    key: &str,
    current: &T,
    value: &T,
) {
    if current != value {
        patch.insert(key.to_string(), value.clone().into());
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct RepositoryKind {
    api: ApiClient,
}

impl RepositoryKind {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ResourceKind for RepositoryKind {
    type Ref = RepositoryRef;
    type Spec = RepositorySpec;
    type Raw = GitHubRepository;

    fn name(&self) -> &'static str {
        "repository"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Patch
    }

    fn spec_of(&self, raw: &GitHubRepository) -> RepositorySpec {
        RepositorySpec {
            name: raw.name.clone(),
            description: non_empty(raw.description.clone()),
            default_branch: raw.default_branch.clone(),
            visibility: Some(raw.visibility()),
        }
    }

    fn apply_spec(&self, raw: &mut GitHubRepository, spec: &RepositorySpec) {
        let mut patch = std::mem::take(&mut raw.patch);
        stage(&mut patch, "name", &raw.name, &spec.name);
        raw.name = spec.name.clone();

        if let Some(description) = &spec.description {
            let current = raw.description.clone().unwrap_or_default();
            stage(&mut patch, "description", &current, description);
            raw.description = Some(description.clone());
        }
        if let Some(branch) = &spec.default_branch {
            let current = raw.default_branch.clone().unwrap_or_default();
            stage(&mut patch, "default_branch", &current, branch);
            raw.default_branch = Some(branch.clone());
        }
        if let Some(visibility) = spec.visibility {
            let current = raw.visibility().as_str().to_string();
            stage(&mut patch, "visibility", &current, &visibility.as_str().to_string());
            raw.visibility = Some(visibility.as_str().to_string());
            raw.private = visibility != crate::resource::Visibility::Public;
        }
        raw.patch = patch;
    }

    fn validate(&self, spec: &mut RepositorySpec) -> Result<(), ProviderError> {
        spec.description = non_empty(spec.description.take());
        if spec.name.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "repository name must not be empty".into(),
            ));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<GitHubRepository, ProviderError> {
        let (mut raw, session) = self
            .api
            .fetch::<GitHubRepository>(ctx, &Request::get(repo_path(reference)))
            .await?;
        raw.session = session;
        raw.validate()?;
        Ok(raw)
    }

    /// GitHub picks the default branch of a new repository; a requested one
    /// is applied by the next reconcile once the branch exists.
    async fn create(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: &RepositorySpec,
    ) -> Result<GitHubRepository, ProviderError> {
        let mut body = json!({ "name": spec.name });
        if let Some(description) = &spec.description {
            body["description"] = json!(description);
        }
        if let Some(visibility) = spec.visibility {
            body["visibility"] = json!(visibility.as_str());
            body["private"] = json!(visibility != crate::resource::Visibility::Public);
        }
        let request =
            Request::post(format!("orgs/{}/repos", reference.organization)).with_body(body);
        let (mut raw, session) = self
            .api
            .fetch::<GitHubRepository>(ctx, &request)
            .await
            .map_err(already_exists_on_create)?;
        raw.session = session;
        raw.validate()?;
        if spec.default_branch.is_some() && spec.default_branch != raw.default_branch {
            tracing::debug!(
                resource = %reference,
                requested = ?spec.default_branch,
                actual = ?raw.default_branch,
                "default branch set by GitHub; a later reconcile applies the requested one"
            );
        }
        Ok(raw)
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        raw: &GitHubRepository,
    ) -> Result<GitHubRepository, ProviderError> {
        let mut patch = raw.patch.clone();
        if patch.is_empty() {
            patch.insert("name".into(), json!(raw.name));
        }
        let request = Request::patch(repo_path(reference)).with_body(Value::Object(patch));
        let (mut updated, session) = self.api.fetch::<GitHubRepository>(ctx, &request).await?;
        updated.session = session;
        updated.validate()?;
        Ok(updated)
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        _raw: &GitHubRepository,
    ) -> Result<(), ProviderError> {
        self.api
            .execute(ctx, &Request::delete(repo_path(reference)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Deploy key
// =============================================================================

#[derive(Debug, Clone)]
pub struct DeployKeyKind {
    api: ApiClient,
}

impl DeployKeyKind {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn keys_path(reference: &RepositoryRef) -> String {
        format!("{}/keys", repo_path(reference))
    }

    pub(crate) async fn list(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<GitHubDeployKey>, ProviderError> {
        paged::<GitHubDeployKey>(&self.api, ctx, Request::get(Self::keys_path(reference)))
            .await?
            .into_iter()
            .map(|(mut key, session)| {
                key.session = session;
                key.validate()?;
                Ok(key)
            })
            .collect()
    }
}

#[async_trait]
impl ResourceKind for DeployKeyKind {
    type Ref = DeployKeyRef;
    type Spec = DeployKeySpec;
    type Raw = GitHubDeployKey;

    fn name(&self) -> &'static str {
        "deploy key"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Recreate
    }

    fn spec_of(&self, raw: &GitHubDeployKey) -> DeployKeySpec {
        DeployKeySpec::new(raw.title.clone(), normalize_public_key(&raw.key), raw.read_only)
    }

    fn apply_spec(&self, raw: &mut GitHubDeployKey, spec: &DeployKeySpec) {
        raw.title = spec.label.clone();
        raw.key = spec.key.clone();
        raw.read_only = spec.read_only;
    }

    fn validate(&self, spec: &mut DeployKeySpec) -> Result<(), ProviderError> {
        spec.key = normalize_public_key(&spec.key);
        if spec.label.trim().is_empty() || spec.key.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "deploy key needs a label and key text".into(),
            ));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
    ) -> Result<GitHubDeployKey, ProviderError> {
        let keys = self.list(ctx, &reference.repository).await?;
        exact_match(keys, |k| k.title.as_str(), &reference.label, || {
            reference.to_string()
        })
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
        spec: &DeployKeySpec,
    ) -> Result<GitHubDeployKey, ProviderError> {
        let request = Request::post(Self::keys_path(&reference.repository)).with_body(json!({
            "title": spec.label,
            "key": spec.key,
            "read_only": spec.read_only,
        }));
        let (mut key, session) = self
            .api
            .fetch::<GitHubDeployKey>(ctx, &request)
            .await
            .map_err(already_exists_on_create)?;
        key.session = session;
        key.validate()?;
        Ok(key)
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
        raw: &GitHubDeployKey,
    ) -> Result<(), ProviderError> {
        let request = Request::delete(format!(
            "{}/{}",
            Self::keys_path(&reference.repository),
            raw.id
        ));
        self.api.execute(ctx, &request).await?;
        Ok(())
    }
}

// =============================================================================
// Team access
// =============================================================================

#[derive(Debug, Clone)]
pub struct TeamAccessKind {
    api: ApiClient,
    mapper: PermissionMapper,
}

impl TeamAccessKind {
    pub(crate) fn new(api: ApiClient, mapper: PermissionMapper) -> Self {
        Self { api, mapper }
    }

    fn grant_path(reference: &TeamAccessRef) -> String {
        let repository = &reference.repository;
        format!(
            "orgs/{}/teams/{}/repos/{}/{}",
            repository.organization, reference.team, repository.organization, repository.slug
        )
    }

    /// The organization's base repository permission, if visible and set.
    async fn organization_level(
        &self,
        ctx: &CallContext,
        organization: &str,
    ) -> Result<Option<PermissionLevel>, ProviderError> {
        let request = Request::get(format!("orgs/{organization}"));
        let org = match self.api.fetch::<GitHubOrganization>(ctx, &request).await {
            Ok((org, _)) => org,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match org.default_repository_permission.as_deref() {
            None | Some("none") => Ok(None),
            Some(permission) => self
                .mapper
                .to_ordinal(PermissionScope::Organization, permission)
                .map(Some),
        }
    }

    async fn put_grant(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        level: PermissionLevel,
    ) -> Result<(), ProviderError> {
        let permission = self
            .mapper
            .to_provider_level(PermissionScope::Repository, level)?;
        let request = Request::put(Self::grant_path(reference))
            .with_body(json!({ "permission": permission }));
        self.api.execute(ctx, &request).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceKind for TeamAccessKind {
    type Ref = TeamAccessRef;
    type Spec = TeamAccessSpec;
    type Raw = GitHubTeamGrant;

    fn name(&self) -> &'static str {
        "team access"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Replace
    }

    fn spec_of(&self, raw: &GitHubTeamGrant) -> TeamAccessSpec {
        TeamAccessSpec::new(
            raw.team.clone(),
            raw.effective().unwrap_or(PermissionLevel::Read),
        )
    }

    fn apply_spec(&self, raw: &mut GitHubTeamGrant, spec: &TeamAccessSpec) {
        raw.team = spec.team.clone();
        raw.repository = Some(spec.permission);
    }

    /// The effective level is compared, except that a repository grant
    /// already at the desired level is accepted when the organization base permission
    /// keeps the effective level higher; no repository write can lower it.
    fn satisfies(&self, raw: &GitHubTeamGrant, desired: &TeamAccessSpec) -> bool {
        if self.spec_of(raw) == *desired {
            return true;
        }
        let shadowed = raw.repository == Some(desired.permission)
            && raw.organization > Some(desired.permission);
        if shadowed {
            tracing::warn!(
                team = %raw.team,
                desired = %desired.permission,
                organization = ?raw.organization,
                "organization base permission is higher than the desired level; leaving the repository grant as is"
            );
        }
        shadowed
    }

    fn validate(&self, spec: &mut TeamAccessSpec) -> Result<(), ProviderError> {
        self.mapper
            .to_provider_level(PermissionScope::Repository, spec.permission)?;
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
    ) -> Result<GitHubTeamGrant, ProviderError> {
        let request =
            Request::get(Self::grant_path(reference)).with_header("Accept", REPOSITORY_MEDIA_TYPE);
        let (repo, session) = self.api.fetch::<GitHubRepository>(ctx, &request).await?;
        let repository = repo.granted_level(&self.mapper)?;
        let organization = self
            .organization_level(ctx, &reference.repository.organization)
            .await?;

        let grant = GitHubTeamGrant {
            team: reference.team.clone(),
            repository,
            organization,
            session,
        };
        if grant.effective().is_none() {
            return Err(ProviderError::NotFound(reference.to_string()));
        }
        Ok(grant)
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        spec: &TeamAccessSpec,
    ) -> Result<GitHubTeamGrant, ProviderError> {
        self.put_grant(ctx, reference, spec.permission).await?;
        Ok(GitHubTeamGrant {
            team: reference.team.clone(),
            repository: Some(spec.permission),
            organization: None,
            session: Default::default(),
        })
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        raw: &GitHubTeamGrant,
    ) -> Result<GitHubTeamGrant, ProviderError> {
        let level = raw.repository.ok_or_else(|| {
            ProviderError::InvalidRequest(format!("no repository grant to send for {reference}"))
        })?;
        self.put_grant(ctx, reference, level).await?;
        if raw.organization > raw.repository {
            tracing::warn!(
                resource = %reference,
                repository = %level,
                "organization base permission is higher than the team grant; effective access is unchanged"
            );
        }
        Ok(raw.clone())
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        _raw: &GitHubTeamGrant,
    ) -> Result<(), ProviderError> {
        self.api
            .execute(ctx, &Request::delete(Self::grant_path(reference)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Pull request
// =============================================================================

#[derive(Debug, Clone)]
pub struct PullRequestKind {
    api: ApiClient,
}

impl PullRequestKind {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn pulls_path(reference: &RepositoryRef) -> String {
        format!("{}/pulls", repo_path(reference))
    }

    pub(crate) async fn get(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        number: u64,
    ) -> Result<GitHubPullRequest, ProviderError> {
        let request = Request::get(format!("{}/{number}", Self::pulls_path(reference)));
        let (mut raw, session) = self.api.fetch::<GitHubPullRequest>(ctx, &request).await?;
        raw.session = session;
        raw.validate()?;
        Ok(raw)
    }
}

#[async_trait]
impl ResourceKind for PullRequestKind {
    type Ref = PullRequestRef;
    type Spec = PullRequestSpec;
    type Raw = GitHubPullRequest;

    fn name(&self) -> &'static str {
        "pull request"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Patch
    }

    fn spec_of(&self, raw: &GitHubPullRequest) -> PullRequestSpec {
        PullRequestSpec {
            title: raw.title.clone(),
            description: non_empty(raw.body.clone()),
            source_branch: raw.head.ref_name.clone(),
            target_branch: raw.base.ref_name.clone(),
        }
    }

    fn apply_spec(&self, raw: &mut GitHubPullRequest, spec: &PullRequestSpec) {
        let mut patch = std::mem::take(&mut raw.patch);
        stage(&mut patch, "title", &raw.title, &spec.title);
        raw.title = spec.title.clone();

        if let Some(description) = &spec.description {
            let current = raw.body.clone().unwrap_or_default();
            stage(&mut patch, "body", &current, description);
            raw.body = Some(description.clone());
        }
        stage(&mut patch, "base", &raw.base.ref_name, &spec.target_branch);
        raw.base.ref_name = spec.target_branch.clone();
        raw.patch = patch;
    }

    fn validate(&self, spec: &mut PullRequestSpec) -> Result<(), ProviderError> {
        spec.description = non_empty(spec.description.take());
        if spec.source_branch == spec.target_branch {
            return Err(ProviderError::InvalidRequest(format!(
                "pull request source and target are both '{}'",
                spec.source_branch
            )));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
    ) -> Result<GitHubPullRequest, ProviderError> {
        let repository = &reference.repository;
        let request = Request::get(Self::pulls_path(repository))
            .with_query(
                "head",
                format!("{}:{}", repository.organization, reference.source_branch),
            )
            .with_query("state", "open");
        let candidates = paged::<GitHubPullRequest>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(mut pr, session)| {
                pr.session = session;
                pr
            })
            .collect();
        let raw = exact_match(
            candidates,
            |pr| pr.head.ref_name.as_str(),
            &reference.source_branch,
            || reference.to_string(),
        )?;
        raw.validate()?;
        Ok(raw)
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        spec: &PullRequestSpec,
    ) -> Result<GitHubPullRequest, ProviderError> {
        let request = Request::post(Self::pulls_path(&reference.repository)).with_body(json!({
            "title": spec.title,
            "body": spec.description,
            "head": spec.source_branch,
            "base": spec.target_branch,
        }));
        let (mut raw, session) = self
            .api
            .fetch::<GitHubPullRequest>(ctx, &request)
            .await
            .map_err(already_exists_on_create)?;
        raw.session = session;
        raw.validate()?;
        Ok(raw)
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        raw: &GitHubPullRequest,
    ) -> Result<GitHubPullRequest, ProviderError> {
        let mut patch = raw.patch.clone();
        if patch.is_empty() {
            patch.insert("title".into(), json!(raw.title));
        }
        let request = Request::patch(format!(
            "{}/{}",
            Self::pulls_path(&reference.repository),
            raw.number
        ))
        .with_body(Value::Object(patch));
        let (mut updated, session) = self.api.fetch::<GitHubPullRequest>(ctx, &request).await?;
        updated.session = session;
        updated.validate()?;
        Ok(updated)
    }

    /// GitHub cannot delete pull requests; this closes it.
    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        raw: &GitHubPullRequest,
    ) -> Result<(), ProviderError> {
        let request = Request::patch(format!(
            "{}/{}",
            Self::pulls_path(&reference.repository),
            raw.number
        ))
        .with_body(json!({ "state": "closed" }));
        self.api.execute(ctx, &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Visibility;
    use crate::transport::HttpTransport;

    fn api() -> ApiClient {
        let transport = HttpTransport::builder("http://127.0.0.1:9").build().unwrap();
        ApiClient::new(std::sync::Arc::new(transport), Default::default())
    }

    fn repo() -> GitHubRepository {
        GitHubRepository {
            name: "svc".into(),
            description: Some("old".into()),
            default_branch: Some("main".into()),
            visibility: Some("private".into()),
            private: true,
            ..Default::default()
        }
    }

    #[test]
    fn repository_patch_holds_only_changed_fields() {
        let kind = RepositoryKind::new(api());
        let mut raw = repo();
        kind.apply_spec(
            &mut raw,
            &RepositorySpec::new("svc")
                .with_description("new")
                .with_visibility(Visibility::Private),
        );
        assert_eq!(raw.patch.len(), 1);
        assert_eq!(raw.patch["description"], "new");
    }

    #[test]
    fn repository_visibility_change_is_staged() {
        let kind = RepositoryKind::new(api());
        let mut raw = repo();
        kind.apply_spec(&mut raw, &RepositorySpec::new("svc").with_visibility(Visibility::Public));
        assert_eq!(raw.patch["visibility"], "public");
        assert!(!raw.private);
        assert_eq!(kind.spec_of(&raw).visibility, Some(Visibility::Public));
    }

    #[test]
    fn pull_request_patch_targets_base() {
        let kind = PullRequestKind::new(api());
        let mut raw = GitHubPullRequest {
            title: "T".into(),
            ..Default::default()
        };
        raw.head.ref_name = "feature".into();
        raw.base.ref_name = "main".into();

        kind.apply_spec(&mut raw, &PullRequestSpec::new("T", "feature", "develop"));
        assert_eq!(raw.patch.len(), 1);
        assert_eq!(raw.patch["base"], "develop");
    }

    #[test]
    fn deploy_key_spec_ignores_id() {
        let kind = DeployKeyKind::new(api());
        let a = GitHubDeployKey {
            id: 1,
            key: "ssh-ed25519 AAAA deploy@ci".into(),
            title: "ci".into(),
            read_only: true,
            ..Default::default()
        };
        let b = GitHubDeployKey { id: 2, ..a.clone() };
        assert_eq!(kind.spec_of(&a), kind.spec_of(&b));
    }

    #[test]
    fn team_grant_path() {
        let reference = TeamAccessRef {
            repository: RepositoryRef::new("acme", "svc"),
            team: "platform".into(),
        };
        assert_eq!(
            TeamAccessKind::grant_path(&reference),
            "orgs/acme/teams/platform/repos/acme/svc"
        );
    }
}
