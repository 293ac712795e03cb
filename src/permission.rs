//! permission
//!
//! Normalized permission levels and per-provider mapping tables.
//!
//! # Levels
//!
//! | Level      | Ordinal | Bitbucket Server             | GitHub     |
//! |------------|---------|------------------------------|------------|
//! | `read`     | 10      | `REPO_READ`/`PROJECT_READ`   | `pull`     |
//! | `triage`   | 20      | n/a                          | `triage`   |
//! | `write`    | 30      | `REPO_WRITE`/`PROJECT_WRITE` | `push`     |
//! | `maintain` | 40      | n/a                          | `maintain` |
//! | `admin`    | 50      | `REPO_ADMIN`/`PROJECT_ADMIN` | `admin`    |
//!
//! Tables are immutable statics. Provider clients build a
//! [`PermissionMapper`] from them at construction and pass it around; nothing
//! looks a table up globally.
//!
//! # Effective Permission
//!
//! A team can hold grants at repository and organization scope at once. The
//! effective level is the maximum ordinal over every grant, regardless of the
//! order grants were discovered.
//!
//! ```
//! use gitprovider::permission::{PermissionLevel, PermissionMapper, PermissionScope, ScopedGrant};
//!
//! let mapper = PermissionMapper::stash();
//! let effective = mapper
//!     .effective_level([
//!         ScopedGrant::new(PermissionScope::Organization, "PROJECT_READ"),
//!         ScopedGrant::new(PermissionScope::Repository, "REPO_ADMIN"),
//!     ])
//!     .unwrap();
//! assert_eq!(effective, Some(PermissionLevel::Admin));
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Normalized permission level. Ordering follows the ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

impl PermissionLevel {
    /// Every level, lowest first.
    pub const ALL: [PermissionLevel; 5] = [
        PermissionLevel::Read,
        PermissionLevel::Triage,
        PermissionLevel::Write,
        PermissionLevel::Maintain,
        PermissionLevel::Admin,
    ];

    pub const fn ordinal(self) -> u8 {
        match self {
            PermissionLevel::Read => 10,
            PermissionLevel::Triage => 20,
            PermissionLevel::Write => 30,
            PermissionLevel::Maintain => 40,
            PermissionLevel::Admin => 50,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.ordinal() == ordinal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Triage => "triage",
            PermissionLevel::Write => "write",
            PermissionLevel::Maintain => "maintain",
            PermissionLevel::Admin => "admin",
        }
    }
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProviderError::InvalidPermissionLevel(s.to_string()))
    }
}

/// Where a grant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionScope {
    /// Granted on the repository itself
    Repository,
    /// Granted on the owning organization/project
    Organization,
}

/// One provider's permission strings for one scope.
#[derive(Debug)]
pub struct PermissionTable {
    pub provider: &'static str,
    pub scope: PermissionScope,
    entries: &'static [(&'static str, PermissionLevel)],
}

impl PermissionTable {
    pub const fn new(
        provider: &'static str,
        scope: PermissionScope,
        entries: &'static [(&'static str, PermissionLevel)],
    ) -> Self {
        Self {
            provider,
            scope,
            entries,
        }
    }

    /// Provider string for `level`.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionLevel` if this provider has no string for `level`.
    pub fn to_provider_level(&self, level: PermissionLevel) -> Result<&'static str, ProviderError> {
        self.entries
            .iter()
            .find(|(_, l)| *l == level)
            .map(|(s, _)| *s)
            .ok_or_else(|| {
                ProviderError::InvalidPermissionLevel(format!(
                    "{} has no {:?}-scope equivalent of '{}'",
                    self.provider, self.scope, level
                ))
            })
    }

    /// Normalized level for a provider string. Matching is exact.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionLevel` for unknown strings; never downgrades.
    pub fn to_ordinal(&self, permission: &str) -> Result<PermissionLevel, ProviderError> {
        self.entries
            .iter()
            .find(|(s, _)| *s == permission)
            .map(|(_, l)| *l)
            .ok_or_else(|| {
                ProviderError::InvalidPermissionLevel(format!(
                    "unknown {} permission '{}'",
                    self.provider, permission
                ))
            })
    }

    /// Levels this table can express.
    pub fn levels(&self) -> impl Iterator<Item = PermissionLevel> + '_ {
        self.entries.iter().map(|(_, l)| *l)
    }
}

/// Bitbucket Server repository permissions.
pub static STASH_REPOSITORY_PERMISSIONS: PermissionTable = PermissionTable::new(
    "stash",
    PermissionScope::Repository,
    &[
        ("REPO_READ", PermissionLevel::Read),
        ("REPO_WRITE", PermissionLevel::Write),
        ("REPO_ADMIN", PermissionLevel::Admin),
    ],
);

/// Bitbucket Server project permissions.
pub static STASH_PROJECT_PERMISSIONS: PermissionTable = PermissionTable::new(
    "stash",
    PermissionScope::Organization,
    &[
        ("PROJECT_READ", PermissionLevel::Read),
        ("PROJECT_WRITE", PermissionLevel::Write),
        ("PROJECT_ADMIN", PermissionLevel::Admin),
    ],
);

/// GitHub team repository permissions.
pub static GITHUB_REPOSITORY_PERMISSIONS: PermissionTable = PermissionTable::new(
    "github",
    PermissionScope::Repository,
    &[
        ("pull", PermissionLevel::Read),
        ("triage", PermissionLevel::Triage),
        ("push", PermissionLevel::Write),
        ("maintain", PermissionLevel::Maintain),
        ("admin", PermissionLevel::Admin),
    ],
);

/// GitHub organization base permissions.
pub static GITHUB_ORGANIZATION_PERMISSIONS: PermissionTable = PermissionTable::new(
    "github",
    PermissionScope::Organization,
    &[
        ("read", PermissionLevel::Read),
        ("write", PermissionLevel::Write),
        ("admin", PermissionLevel::Admin),
    ],
);

/// A permission string discovered at some scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedGrant<'a> {
    pub scope: PermissionScope,
    pub permission: &'a str,
}

impl<'a> ScopedGrant<'a> {
    pub fn new(scope: PermissionScope, permission: &'a str) -> Self {
        Self { scope, permission }
    }
}

/// Bidirectional mapping for one provider, across both scopes.
#[derive(Debug, Clone, Copy)]
pub struct PermissionMapper {
    repository: &'static PermissionTable,
    organization: &'static PermissionTable,
}

impl PermissionMapper {
    pub const fn new(
        repository: &'static PermissionTable,
        organization: &'static PermissionTable,
    ) -> Self {
        Self {
            repository,
            organization,
        }
    }

    pub const fn stash() -> Self {
        Self::new(&STASH_REPOSITORY_PERMISSIONS, &STASH_PROJECT_PERMISSIONS)
    }

    pub const fn github() -> Self {
        Self::new(
            &GITHUB_REPOSITORY_PERMISSIONS,
            &GITHUB_ORGANIZATION_PERMISSIONS,
        )
    }

    pub fn table(&self, scope: PermissionScope) -> &'static PermissionTable {
        match scope {
            PermissionScope::Repository => self.repository,
            PermissionScope::Organization => self.organization,
        }
    }

    pub fn to_provider_level(
        &self,
        scope: PermissionScope,
        level: PermissionLevel,
    ) -> Result<&'static str, ProviderError> {
        self.table(scope).to_provider_level(level)
    }

    pub fn to_ordinal(
        &self,
        scope: PermissionScope,
        permission: &str,
    ) -> Result<PermissionLevel, ProviderError> {
        self.table(scope).to_ordinal(permission)
    }

    /// Highest level across `grants`, or `None` when there are none.
    ///
    /// # Errors
    ///
    /// `InvalidPermissionLevel` if any grant is unmapped; an unknown string is
    /// never skipped.
    pub fn effective_level<'a, I>(&self, grants: I) -> Result<Option<PermissionLevel>, ProviderError>
    where
        I: IntoIterator<Item = ScopedGrant<'a>>,
    {
        grants.into_iter().try_fold(None, |best, grant| {
            let level = self.to_ordinal(grant.scope, grant.permission)?;
            Ok(Some(match best {
                Some(best) if best >= level => best,
                _ => level,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn ordinals_are_ordered() {
        let ordinals: Vec<u8> = PermissionLevel::ALL.iter().map(|l| l.ordinal()).collect();
        assert_eq!(ordinals, vec![10, 20, 30, 40, 50]);
        assert!(PermissionLevel::Admin > PermissionLevel::Write);
        assert_eq!(PermissionLevel::from_ordinal(30), Some(PermissionLevel::Write));
        assert_eq!(PermissionLevel::from_ordinal(31), None);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("WRITE".parse::<PermissionLevel>().unwrap(), PermissionLevel::Write);
        assert_eq!(PermissionLevel::Maintain.to_string(), "maintain");
        assert_eq!(
            "owner".parse::<PermissionLevel>().unwrap_err().kind(),
            ErrorKind::InvalidPermissionLevel
        );
    }

    #[test]
    fn stash_round_trip() {
        for table in [&STASH_REPOSITORY_PERMISSIONS, &STASH_PROJECT_PERMISSIONS] {
            for level in table.levels() {
                let s = table.to_provider_level(level).unwrap();
                assert_eq!(table.to_ordinal(s).unwrap(), level);
            }
        }
    }

    #[test]
    fn stash_strings() {
        let mapper = PermissionMapper::stash();
        assert_eq!(
            mapper
                .to_provider_level(PermissionScope::Repository, PermissionLevel::Write)
                .unwrap(),
            "REPO_WRITE"
        );
        assert_eq!(
            mapper
                .to_ordinal(PermissionScope::Organization, "PROJECT_ADMIN")
                .unwrap(),
            PermissionLevel::Admin
        );
    }

    #[test]
    fn unmapped_level_is_an_error() {
        let err = STASH_REPOSITORY_PERMISSIONS
            .to_provider_level(PermissionLevel::Triage)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPermissionLevel);
    }

    #[test]
    fn unknown_string_is_an_error_not_a_downgrade() {
        let err = STASH_REPOSITORY_PERMISSIONS.to_ordinal("REPO_OWNER").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPermissionLevel);
        // Scope tables are not interchangeable.
        assert!(STASH_REPOSITORY_PERMISSIONS.to_ordinal("PROJECT_READ").is_err());
        // Matching is exact.
        assert!(STASH_REPOSITORY_PERMISSIONS.to_ordinal("repo_read").is_err());
    }

    #[test]
    fn effective_level_takes_max_in_any_order() {
        let mapper = PermissionMapper::stash();
        let forward = [
            ScopedGrant::new(PermissionScope::Organization, "PROJECT_READ"),
            ScopedGrant::new(PermissionScope::Repository, "REPO_ADMIN"),
        ];
        let mut backward = forward;
        backward.reverse();

        assert_eq!(
            mapper.effective_level(forward).unwrap(),
            Some(PermissionLevel::Admin)
        );
        assert_eq!(
            mapper.effective_level(backward).unwrap(),
            Some(PermissionLevel::Admin)
        );
    }

    #[test]
    fn effective_level_of_nothing_is_none() {
        let mapper = PermissionMapper::github();
        assert_eq!(mapper.effective_level([]).unwrap(), None);
    }

    #[test]
    fn effective_level_rejects_unknown_grant() {
        let mapper = PermissionMapper::github();
        let err = mapper
            .effective_level([
                ScopedGrant::new(PermissionScope::Repository, "admin"),
                ScopedGrant::new(PermissionScope::Repository, "superuser"),
            ])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPermissionLevel);
    }
}
