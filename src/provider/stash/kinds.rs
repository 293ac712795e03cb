//! provider::stash::kinds
//!
//! [`ResourceKind`] implementations for Bitbucket Server.
//!
//! | Kind | Strategy | Raw form |
//! |------|----------|----------|
//! | repository | Patch (PUT of the merged form) | [`StashRepository`] |
//! | deploy key | Recreate | [`StashDeployKey`] |
//! | team access | Replace | [`StashTeamGrant`] |
//! | pull request | Replace, echoing `version` | [`StashPullRequest`] |

use async_trait::async_trait;
use serde_json::json;

use super::types::{
    StashAccessKey, StashBranch, StashDeployKey, StashGroupPermission, StashPullRequest,
    StashRepository, StashTeamGrant,
};
use super::{keys_path, paged, repo_path, PROVIDER};
use crate::context::CallContext;
use crate::error::ProviderError;
use crate::permission::{PermissionLevel, PermissionMapper, PermissionScope};
use crate::provider::types::non_empty;
use crate::provider::{exact_match, ApiClient};
use crate::resource::{
    branch_display_id, branch_ref_id, normalize_public_key, DeployKeyRef, DeployKeySpec,
    PullRequestRef, PullRequestSpec, RepositoryRef, RepositorySpec, ResourceKind, TeamAccessRef,
    TeamAccessSpec, UpdateStrategy, Visibility,
};
use crate::transport::Request;

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

    /// Older servers leave `defaultBranch` out of the repository; ask for it
    /// separately. An empty repository has none.
    async fn default_branch(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Option<String>, ProviderError> {
        let request = Request::get(format!("{}/branches/default", repo_path(reference)));
        let response = match self.api.execute(ctx, &request).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if response.status() == 204 || response.body().is_empty() {
            return Ok(None);
        }
        let branch: StashBranch = response.decode()?;
        Ok(Some(branch.display_id).filter(|b| !b.is_empty()))
    }

    async fn complete(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        mut raw: StashRepository,
    ) -> Result<StashRepository, ProviderError> {
        raw.validate()?;
        if raw.default_branch.is_none() {
            raw.default_branch = self.default_branch(ctx, reference).await?;
        }
        Ok(raw)
    }
}

fn repository_body(raw: &StashRepository) -> serde_json::Value {
    let mut body = json!({
        "name": raw.name,
        "scmId": "git",
        "public": raw.public,
    });
    if let Some(description) = &raw.description {
        body["description"] = json!(description);
    }
    if let Some(branch) = &raw.default_branch {
        body["defaultBranch"] = json!(branch_display_id(branch));
    }
    body
}

#[async_trait]
impl ResourceKind for RepositoryKind {
    type Ref = RepositoryRef;
    type Spec = RepositorySpec;
    type Raw = StashRepository;

    fn name(&self) -> &'static str {
        "repository"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Patch
    }

    fn spec_of(&self, raw: &StashRepository) -> RepositorySpec {
        RepositorySpec {
            name: raw.name.clone(),
            description: non_empty(raw.description.clone()),
            default_branch: raw
                .default_branch
                .as_deref()
                .map(|b| branch_display_id(b).to_string()),
            visibility: Some(raw.visibility()),
        }
    }

    fn apply_spec(&self, raw: &mut StashRepository, spec: &RepositorySpec) {
        raw.name = spec.name.clone();
        if let Some(description) = &spec.description {
            raw.description = Some(description.clone());
        }
        if let Some(branch) = &spec.default_branch {
            raw.default_branch = Some(branch.clone());
        }
        if let Some(visibility) = spec.visibility {
            raw.public = visibility == Visibility::Public;
        }
    }

    fn validate(&self, spec: &mut RepositorySpec) -> Result<(), ProviderError> {
        spec.description = non_empty(spec.description.take());
        if spec.name.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "repository name must not be empty".into(),
            ));
        }
        if spec.visibility == Some(Visibility::Internal) {
            return Err(ProviderError::unsupported(PROVIDER, "internal visibility"));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<StashRepository, ProviderError> {
        let (mut raw, session) = self
            .api
            .fetch::<StashRepository>(ctx, &Request::get(repo_path(reference)))
            .await?;
        raw.session = session;
        self.complete(ctx, reference, raw).await
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        spec: &RepositorySpec,
    ) -> Result<StashRepository, ProviderError> {
        let mut raw = StashRepository::default();
        self.apply_spec(&mut raw, spec);
        let request = Request::post(format!(
            "rest/api/1.0/projects/{}/repos",
            reference.organization
        ))
        .with_body(repository_body(&raw));

        let (mut created, session) = self.api.fetch::<StashRepository>(ctx, &request).await?;
        created.session = session;
        if created.default_branch.is_none() {
            created.default_branch = raw.default_branch;
        }
        created.validate()?;
        Ok(created)
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        raw: &StashRepository,
    ) -> Result<StashRepository, ProviderError> {
        let request = Request::put(repo_path(reference)).with_body(repository_body(raw));
        let (mut updated, session) = self.api.fetch::<StashRepository>(ctx, &request).await?;
        updated.session = session;
        if updated.default_branch.is_none() {
            updated.default_branch = raw.default_branch.clone();
        }
        updated.validate()?;
        Ok(updated)
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        _raw: &StashRepository,
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
    mapper: PermissionMapper,
}

impl DeployKeyKind {
    pub(crate) fn new(api: ApiClient, mapper: PermissionMapper) -> Self {
        Self { api, mapper }
    }

    pub(crate) async fn list(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<StashDeployKey>, ProviderError> {
        paged::<StashAccessKey>(&self.api, ctx, Request::get(keys_path(reference)))
            .await?
            .into_iter()
            .map(|(key, session)| key.into_deploy_key(&self.mapper, session))
            .collect()
    }

    fn permission_for(&self, read_only: bool) -> Result<&'static str, ProviderError> {
        let level = if read_only {
            PermissionLevel::Read
        } else {
            PermissionLevel::Write
        };
        self.mapper
            .to_provider_level(PermissionScope::Repository, level)
    }
}

#[async_trait]
impl ResourceKind for DeployKeyKind {
    type Ref = DeployKeyRef;
    type Spec = DeployKeySpec;
    type Raw = StashDeployKey;

    fn name(&self) -> &'static str {
        "deploy key"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Recreate
    }

    fn spec_of(&self, raw: &StashDeployKey) -> DeployKeySpec {
        DeployKeySpec::new(
            raw.label.clone(),
            normalize_public_key(&raw.text),
            raw.read_only(),
        )
    }

    fn apply_spec(&self, raw: &mut StashDeployKey, spec: &DeployKeySpec) {
        raw.label = spec.label.clone();
        raw.text = spec.key.clone();
        raw.permission = if spec.read_only {
            PermissionLevel::Read
        } else {
            PermissionLevel::Write
        };
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
    ) -> Result<StashDeployKey, ProviderError> {
        let keys = self.list(ctx, &reference.repository).await?;
        exact_match(keys, |k| k.label.as_str(), &reference.label, || {
            reference.to_string()
        })
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
        spec: &DeployKeySpec,
    ) -> Result<StashDeployKey, ProviderError> {
        let request = Request::post(keys_path(&reference.repository)).with_body(json!({
            "key": {"text": spec.key, "label": spec.label},
            "permission": self.permission_for(spec.read_only)?,
        }));
        let (key, session) = self.api.fetch::<StashAccessKey>(ctx, &request).await?;
        key.into_deploy_key(&self.mapper, session)
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &DeployKeyRef,
        raw: &StashDeployKey,
    ) -> Result<(), ProviderError> {
        let request = Request::delete(format!("{}/{}", keys_path(&reference.repository), raw.id));
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

    fn repository_grants_path(reference: &RepositoryRef) -> String {
        format!("{}/permissions/groups", repo_path(reference))
    }

    fn project_grants_path(organization: &str) -> String {
        format!("rest/api/1.0/projects/{organization}/permissions/groups")
    }

    /// Group grants at one scope, optionally narrowed by a name filter.
    pub(crate) async fn grants(
        &self,
        ctx: &CallContext,
        path: String,
        scope: PermissionScope,
        filter: Option<&str>,
    ) -> Result<Vec<(String, PermissionLevel)>, ProviderError> {
        let request = Request::get(path).with_optional_query("filter", filter);
        paged::<StashGroupPermission>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(grant, _)| {
                let level = self.mapper.to_ordinal(scope, &grant.permission)?;
                Ok((grant.group.name, level))
            })
            .collect()
    }

    /// Every team with a grant on the repository or its project.
    pub(crate) async fn list(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
    ) -> Result<Vec<StashTeamGrant>, ProviderError> {
        let repository = self
            .grants(
                ctx,
                Self::repository_grants_path(reference),
                PermissionScope::Repository,
                None,
            )
            .await?;
        let project = self
            .grants(
                ctx,
                Self::project_grants_path(&reference.organization),
                PermissionScope::Organization,
                None,
            )
            .await?;

        let mut teams: Vec<StashTeamGrant> = Vec::new();
        for (team, level) in repository {
            teams.push(StashTeamGrant {
                team,
                repository: Some(level),
                project: None,
                session: Default::default(),
            });
        }
        for (team, level) in project {
            match teams.iter_mut().find(|t| t.team == team) {
                Some(existing) => existing.project = Some(level),
                None => teams.push(StashTeamGrant {
                    team,
                    repository: None,
                    project: Some(level),
                    session: Default::default(),
                }),
            }
        }
        Ok(teams)
    }

    async fn grant(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        level: PermissionLevel,
    ) -> Result<(), ProviderError> {
        let permission = self
            .mapper
            .to_provider_level(PermissionScope::Repository, level)?;
        let request = Request::put(Self::repository_grants_path(&reference.repository))
            .with_query("permission", permission)
            .with_query("name", &reference.team);
        self.api.execute(ctx, &request).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceKind for TeamAccessKind {
    type Ref = TeamAccessRef;
    type Spec = TeamAccessSpec;
    type Raw = StashTeamGrant;

    fn name(&self) -> &'static str {
        "team access"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Replace
    }

    fn spec_of(&self, raw: &StashTeamGrant) -> TeamAccessSpec {
        TeamAccessSpec::new(
            raw.team.clone(),
            raw.effective().unwrap_or(PermissionLevel::Read),
        )
    }

    fn apply_spec(&self, raw: &mut StashTeamGrant, spec: &TeamAccessSpec) {
        raw.team = spec.team.clone();
        raw.repository = Some(spec.permission);
    }

    /// The effective level is compared, except that a repository grant
    /// already at the desired level is accepted when the project grant
    /// keeps the effective level higher; no repository write can lower it.
    fn satisfies(&self, raw: &StashTeamGrant, desired: &TeamAccessSpec) -> bool {
        if self.spec_of(raw) == *desired {
            return true;
        }
        let shadowed = raw.repository == Some(desired.permission)
            && raw.project > Some(desired.permission);
        if shadowed {
            tracing::warn!(
                team = %raw.team,
                desired = %desired.permission,
                project = ?raw.project,
                "project grant is higher than the desired level; leaving the repository grant as is"
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
    ) -> Result<StashTeamGrant, ProviderError> {
        let team = reference.team.as_str();
        let repository = self
            .grants(
                ctx,
                Self::repository_grants_path(&reference.repository),
                PermissionScope::Repository,
                Some(team),
            )
            .await?;
        let project = self
            .grants(
                ctx,
                Self::project_grants_path(&reference.repository.organization),
                PermissionScope::Organization,
                Some(team),
            )
            .await?;

        let find = |grants: Vec<(String, PermissionLevel)>| {
            grants
                .into_iter()
                .find(|(name, _)| name == team)
                .map(|(_, level)| level)
        };
        let grant = StashTeamGrant {
            team: team.to_string(),
            repository: find(repository),
            project: find(project),
            session: Default::default(),
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
    ) -> Result<StashTeamGrant, ProviderError> {
        self.grant(ctx, reference, spec.permission).await?;
        Ok(StashTeamGrant {
            team: reference.team.clone(),
            repository: Some(spec.permission),
            project: None,
            session: Default::default(),
        })
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        raw: &StashTeamGrant,
    ) -> Result<StashTeamGrant, ProviderError> {
        let level = raw.repository.ok_or_else(|| {
            ProviderError::InvalidRequest(format!("no repository grant to send for {reference}"))
        })?;
        self.grant(ctx, reference, level).await?;
        if raw.project > raw.repository {
            tracing::warn!(
                resource = %reference,
                repository = %level,
                "project grant is higher than the repository grant; effective access is unchanged"
            );
        }
        Ok(raw.clone())
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &TeamAccessRef,
        _raw: &StashTeamGrant,
    ) -> Result<(), ProviderError> {
        let request = Request::delete(Self::repository_grants_path(&reference.repository))
            .with_query("name", &reference.team);
        self.api.execute(ctx, &request).await?;
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
        format!("{}/pull-requests", repo_path(reference))
    }

    pub(crate) async fn get(
        &self,
        ctx: &CallContext,
        reference: &RepositoryRef,
        id: u64,
    ) -> Result<StashPullRequest, ProviderError> {
        let request = Request::get(format!("{}/{id}", Self::pulls_path(reference)));
        let (mut raw, session) = self.api.fetch::<StashPullRequest>(ctx, &request).await?;
        raw.session = session;
        raw.validate()?;
        Ok(raw)
    }

    fn ref_body(reference: &RepositoryRef, branch: &str) -> serde_json::Value {
        json!({
            "id": branch_ref_id(branch),
            "repository": {
                "slug": reference.slug,
                "project": {"key": reference.organization},
            },
        })
    }
}

#[async_trait]
impl ResourceKind for PullRequestKind {
    type Ref = PullRequestRef;
    type Spec = PullRequestSpec;
    type Raw = StashPullRequest;

    fn name(&self) -> &'static str {
        "pull request"
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn update_strategy(&self) -> UpdateStrategy {
        UpdateStrategy::Replace
    }

    fn spec_of(&self, raw: &StashPullRequest) -> PullRequestSpec {
        PullRequestSpec {
            title: raw.title.clone(),
            description: non_empty(raw.description.clone()),
            source_branch: raw.from_ref.branch().to_string(),
            target_branch: raw.to_ref.branch().to_string(),
        }
    }

    fn apply_spec(&self, raw: &mut StashPullRequest, spec: &PullRequestSpec) {
        raw.title = spec.title.clone();
        raw.description = spec.description.clone();
        raw.to_ref.id = branch_ref_id(&spec.target_branch);
        raw.to_ref.display_id = spec.target_branch.clone();
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
    ) -> Result<StashPullRequest, ProviderError> {
        let source = branch_ref_id(&reference.source_branch);
        let request = Request::get(Self::pulls_path(&reference.repository))
            .with_query("direction", "OUTGOING")
            .with_query("at", &source)
            .with_query("state", "OPEN");
        let candidates = paged::<StashPullRequest>(&self.api, ctx, request)
            .await?
            .into_iter()
            .map(|(mut pr, session)| {
                pr.session = session;
                pr
            })
            .collect();
        let raw = exact_match(candidates, |pr| pr.from_ref.id.as_str(), &source, || {
            reference.to_string()
        })?;
        raw.validate()?;
        Ok(raw)
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        spec: &PullRequestSpec,
    ) -> Result<StashPullRequest, ProviderError> {
        let repository = &reference.repository;
        let request = Request::post(Self::pulls_path(repository)).with_body(json!({
            "title": spec.title,
            "description": spec.description,
            "fromRef": Self::ref_body(repository, &spec.source_branch),
            "toRef": Self::ref_body(repository, &spec.target_branch),
        }));
        let (mut raw, session) = self.api.fetch::<StashPullRequest>(ctx, &request).await?;
        raw.session = session;
        raw.validate()?;
        Ok(raw)
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        raw: &StashPullRequest,
    ) -> Result<StashPullRequest, ProviderError> {
        let repository = &reference.repository;
        let request = Request::put(format!("{}/{}", Self::pulls_path(repository), raw.id))
            .with_body(json!({
                "version": raw.version,
                "title": raw.title,
                "description": raw.description,
                "toRef": Self::ref_body(repository, raw.to_ref.branch()),
            }));

        let (mut updated, session) = self
            .api
            .fetch::<StashPullRequest>(ctx, &request)
            .await
            .map_err(|e| match e {
                ProviderError::AlreadyExists(message) => ProviderError::VersionConflict {
                    resource: reference.to_string(),
                    sent: raw.version,
                    message,
                },
                other => other,
            })?;
        updated.session = session;
        updated.validate()?;
        Ok(updated)
    }

    /// Bitbucket Server removes the pull request outright.
    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &PullRequestRef,
        raw: &StashPullRequest,
    ) -> Result<(), ProviderError> {
        let request = Request::delete(format!(
            "{}/{}",
            Self::pulls_path(&reference.repository),
            raw.id
        ))
        .with_body(json!({ "version": raw.version }));
        self.api.execute(ctx, &request).await?;
        Ok(())
    }
}
