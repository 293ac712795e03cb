//! resource::spec
//!
//! Desired-state specs and references for each resource kind.
//!
//! A spec holds only the fields a caller can ask for. Server-assigned fields
//! (ids, versions, timestamps, links, session data) live in the provider's
//! raw form and never reach a spec, so they can never cause a spurious
//! difference.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::permission::PermissionLevel;

/// Desired state of one resource.
///
/// `PartialEq` is full structural equality. [`Spec::is_satisfied_by`] is the
/// subset check used by patch-semantics kinds: fields the caller left unset
/// are ignored.
pub trait Spec: Clone + fmt::Debug + PartialEq + Send + Sync {
    fn is_satisfied_by(&self, actual: &Self) -> bool {
        self == actual
    }

    /// Write the fields this spec sets onto `actual`, the way a partial
    /// update would. Specs without optional fields replace `actual`.
    fn merge_onto(&self, actual: &mut Self) {
        *actual = self.clone();
    }
}

fn merge_set<T: Clone>(desired: &Option<T>, actual: &mut Option<T>) {
    if let Some(value) = desired {
        *actual = Some(value.clone());
    }
}

/// `desired` is either unset or equal to `actual`.
fn unset_or_eq<T: PartialEq>(desired: &Option<T>, actual: &Option<T>) -> bool {
    desired.is_none() || desired == actual
}

/// Derive a repository slug from a display name.
///
/// Lowercases, replaces anything outside `[a-z0-9._-]` with `-`, collapses
/// runs of `-` and trims them from both ends.
///
/// ```
/// use gitprovider::resource::slugify;
///
/// assert_eq!(slugify("My Service (v2)"), "my-service-v2");
/// assert_eq!(slugify("api.gateway"), "api.gateway");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
            c
        } else {
            '-'
        };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Keep the algorithm and key material of an OpenSSH public key, dropping the
/// trailing comment and any extra whitespace.
///
/// Providers return keys without the comment, so comparing raw text would
/// report a change on every run.
pub fn normalize_public_key(key: &str) -> String {
    key.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

/// Repository visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    /// Visible to members of the enterprise (GitHub only)
    Internal,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            other => Err(ProviderError::InvalidRequest(format!(
                "unknown visibility '{other}'"
            ))),
        }
    }
}

/// Identifies a repository: owning organization (project key or org login)
/// plus slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub organization: String,
    pub slug: String,
}

impl RepositoryRef {
    pub fn new(organization: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            slug: slug.into(),
        }
    }

    /// Reference for a repository identified by display name.
    pub fn for_name(organization: impl Into<String>, name: &str) -> Self {
        Self::new(organization, slugify(name))
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.slug)
    }
}

/// Desired repository settings. Unset options are left as the provider has
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl RepositorySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default_branch: None,
            visibility: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

impl Spec for RepositorySpec {
    fn is_satisfied_by(&self, actual: &Self) -> bool {
        self.name == actual.name
            && unset_or_eq(&self.description, &actual.description)
            && unset_or_eq(&self.default_branch, &actual.default_branch)
            && unset_or_eq(&self.visibility, &actual.visibility)
    }

    fn merge_onto(&self, actual: &mut Self) {
        actual.name = self.name.clone();
        merge_set(&self.description, &mut actual.description);
        merge_set(&self.default_branch, &mut actual.default_branch);
        merge_set(&self.visibility, &mut actual.visibility);
    }
}

/// Identifies a deploy key by its label within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeployKeyRef {
    pub repository: RepositoryRef,
    pub label: String,
}

impl fmt::Display for DeployKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deploy key '{}' on {}", self.label, self.repository)
    }
}

/// Desired deploy key. Keys cannot be edited in place; a difference is
/// resolved by deleting and recreating the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployKeySpec {
    pub label: String,
    pub key: String,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_read_only() -> bool {
    true
}

impl DeployKeySpec {
    pub fn new(label: impl Into<String>, key: impl Into<String>, read_only: bool) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            read_only,
        }
    }
}

impl Spec for DeployKeySpec {}

/// Identifies a team's grant on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamAccessRef {
    pub repository: RepositoryRef,
    pub team: String,
}

impl fmt::Display for TeamAccessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "access for team '{}' on {}", self.team, self.repository)
    }
}

/// Desired effective permission of a team on a repository.
///
/// Compared against the team's effective level, the maximum over repository
/// and organization scope grants. When an organization grant keeps the
/// effective level above the desired one, a repository grant equal to the
/// desired level counts as satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAccessSpec {
    pub team: String,
    pub permission: PermissionLevel,
}

impl TeamAccessSpec {
    pub fn new(team: impl Into<String>, permission: PermissionLevel) -> Self {
        Self {
            team: team.into(),
            permission,
        }
    }
}

impl Spec for TeamAccessSpec {}

/// Identifies the open pull request from a source branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestRef {
    pub repository: RepositoryRef,
    pub source_branch: String,
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pull request from '{}' on {}",
            self.source_branch, self.repository
        )
    }
}

/// Desired pull request. An update may change the title, the description and
/// the target branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
}

impl PullRequestSpec {
    pub fn new(
        title: impl Into<String>,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Spec for PullRequestSpec {
    fn is_satisfied_by(&self, actual: &Self) -> bool {
        self.title == actual.title
            && self.source_branch == actual.source_branch
            && self.target_branch == actual.target_branch
            && unset_or_eq(&self.description, &actual.description)
    }

    fn merge_onto(&self, actual: &mut Self) {
        actual.title = self.title.clone();
        actual.source_branch = self.source_branch.clone();
        actual.target_branch = self.target_branch.clone();
        merge_set(&self.description, &mut actual.description);
    }
}

/// Strip a `refs/heads/` prefix.
pub fn branch_display_id(id: &str) -> &str {
    id.strip_prefix("refs/heads/").unwrap_or(id)
}

/// Add a `refs/heads/` prefix unless already fully qualified.
pub fn branch_ref_id(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}
