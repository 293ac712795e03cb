//! Property-based tests for paging, permission mapping and naming helpers.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use gitprovider::pagination::{all_pages, Page, PageCursor, PageOptions};
use gitprovider::permission::{PermissionLevel, PermissionMapper, PermissionScope, ScopedGrant};
use gitprovider::resource::{normalize_public_key, slugify, RepositorySpec, UpdateStrategy};
use gitprovider::CallContext;

/// Strategy for a normalized permission level.
fn level() -> impl Strategy<Value = PermissionLevel> {
    prop::sample::select(PermissionLevel::ALL.to_vec())
}

/// Strategy for a grant string valid in the given GitHub scope.
fn github_grant() -> impl Strategy<Value = (PermissionScope, &'static str)> {
    prop_oneof![
        prop::sample::select(vec!["pull", "triage", "push", "maintain", "admin"])
            .prop_map(|p| (PermissionScope::Repository, p)),
        prop::sample::select(vec!["read", "write", "admin"])
            .prop_map(|p| (PermissionScope::Organization, p)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    /// Every item of every page comes back exactly once, in order.
    #[test]
    fn pagination_is_complete_and_ordered(
        total in 0usize..200,
        page_size in 1usize..25,
    ) {
        let items: Vec<usize> = (0..total).collect();
        let source = items.clone();

        let collected = runtime().block_on(async move {
            let mut cursor = PageCursor::default();
            let source = &source;
            all_pages(&CallContext::new(), &mut cursor, &PageOptions::default(), |c| {
                let start = c.start as usize;
                let end = (start + page_size).min(source.len());
                let next = (end < source.len()).then_some(end as u64);
                async move { Ok(Page::new(source[start..end].to_vec(), start as u64, next)) }
            })
            .await
        });

        prop_assert_eq!(collected.unwrap(), items);
    }

    /// A page budget below the page count always fails rather than truncating.
    #[test]
    fn page_budget_never_truncates(total in 2usize..100, page_size in 1usize..10) {
        let pages_needed = total.div_ceil(page_size);
        prop_assume!(pages_needed > 1);
        let options = PageOptions { max_pages: Some(pages_needed - 1), ..PageOptions::default() };

        let result = runtime().block_on(async move {
            let mut cursor = PageCursor::default();
            all_pages(&CallContext::new(), &mut cursor, &options, |c| {
                let start = c.start as usize;
                let end = (start + page_size).min(total);
                let next = (end < total).then_some(end as u64);
                async move { Ok(Page::new((start..end).collect::<Vec<_>>(), start as u64, next)) }
            })
            .await
        });

        prop_assert!(result.is_err());
    }

    /// Mapping a level to GitHub and back is lossless.
    #[test]
    fn github_level_round_trips(level in level()) {
        let mapper = PermissionMapper::github();
        let provider = mapper.to_provider_level(PermissionScope::Repository, level).unwrap();
        let back = mapper.to_ordinal(PermissionScope::Repository, provider).unwrap();
        prop_assert_eq!(back, level);
    }

    /// Bitbucket Server round-trips every level it has, and rejects the rest.
    #[test]
    fn stash_level_round_trips_or_rejects(level in level()) {
        let mapper = PermissionMapper::stash();
        match mapper.to_provider_level(PermissionScope::Repository, level) {
            Ok(provider) => {
                let back = mapper.to_ordinal(PermissionScope::Repository, provider).unwrap();
                prop_assert_eq!(back, level);
            }
            Err(_) => {
                prop_assert!(matches!(level, PermissionLevel::Triage | PermissionLevel::Maintain));
            }
        }
    }

    /// The effective level is the maximum grant, whatever the order.
    #[test]
    fn effective_level_ignores_order(grants in prop::collection::vec(github_grant(), 0..8)) {
        let mapper = PermissionMapper::github();
        let forward = mapper
            .effective_level(grants.iter().map(|(s, p)| ScopedGrant::new(*s, p)))
            .unwrap();
        let backward = mapper
            .effective_level(grants.iter().rev().map(|(s, p)| ScopedGrant::new(*s, p)))
            .unwrap();
        prop_assert_eq!(forward, backward);

        let expected = grants
            .iter()
            .map(|(s, p)| mapper.to_ordinal(*s, p).unwrap())
            .max();
        prop_assert_eq!(forward, expected);
    }

    /// Slugs are stable and use only the allowed alphabet.
    #[test]
    fn slugify_is_idempotent(name in "[ -~]{0,40}") {
        let slug = slugify(&name);
        prop_assert_eq!(slugify(&slug), slug.clone());
        prop_assert!(slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_')));
        prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
    }

    /// Key comments never affect the normalized key.
    #[test]
    fn key_comment_is_dropped(material in "[A-Za-z0-9+/]{8,40}", comment in "[a-z@.]{0,12}") {
        let bare = format!("ssh-ed25519 {material}");
        let with_comment = format!("ssh-ed25519  {material} {comment}\n");
        prop_assert_eq!(normalize_public_key(&with_comment), normalize_public_key(&bare));
    }

    /// An unset field never makes a patch-semantics spec unsatisfied.
    #[test]
    fn patch_ignores_unset_fields(description in proptest::option::of("[a-z ]{1,20}")) {
        let actual = RepositorySpec::new("svc").with_default_branch("main");
        let actual = match &description {
            Some(d) => actual.with_description(d.clone()),
            None => actual,
        };
        let desired = RepositorySpec::new("svc");
        prop_assert!(UpdateStrategy::Patch.is_satisfied(&desired, &actual));
    }
}
