//! resource::memory
//!
//! In-memory resource kind for deterministic tests.
//!
//! # Design
//!
//! Objects live in a map keyed by reference, each with a server-style id and
//! version. Updates carrying a stale version fail with `VersionConflict`, the
//! same way a provider's optimistic locking does. Under `Patch` only the
//! fields a spec sets are written. Failures can be injected per
//! operation and every call is recorded for verification.
//!
//! # Example
//!
//! ```
//! use gitprovider::resource::memory::{MemoryKind, MemoryOperation};
//! use gitprovider::resource::{DeployKeySpec, ResourceHandle, UpdateStrategy};
//! use gitprovider::CallContext;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let kind = MemoryKind::new(UpdateStrategy::Recreate)
//!     .with_object("ci", DeployKeySpec::new("ci", "ssh-ed25519 AAAA", true));
//!
//! let handle = ResourceHandle::get(kind.clone(), &CallContext::new(), "ci".to_string())
//!     .await
//!     .unwrap();
//! assert_eq!(handle.api_object().unwrap().version, 0);
//! assert_eq!(kind.operations(), vec![MemoryOperation::Fetch("ci".into())]);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ResourceKind, Spec, UpdateStrategy};
use crate::context::CallContext;
use crate::error::ProviderError;

/// A stored object: spec plus server-assigned fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject<S> {
    pub id: u64,
    pub version: u64,
    pub spec: S,
}

/// Which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    Fetch(ProviderError),
    Create(ProviderError),
    Update(ProviderError),
    Delete(ProviderError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryOperation {
    Fetch(String),
    Create(String),
    Update(String),
    Delete(String),
}

#[derive(Debug)]
struct MemoryInner<S> {
    objects: HashMap<String, MemoryObject<S>>,
    next_id: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MemoryOperation>,
}

/// In-memory resource kind, keyed by string reference.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryKind<S> {
    inner: Arc<Mutex<MemoryInner<S>>>,
    strategy: UpdateStrategy,
}

impl<S: Spec> MemoryKind<S> {
    pub fn new(strategy: UpdateStrategy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                objects: HashMap::new(),
                next_id: 1,
                fail_on: None,
                operations: Vec::new(),
            })),
            strategy,
        }
    }

    /// Seed an existing object at version 0.
    pub fn with_object(self, key: &str, spec: S) -> Self {
        {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.objects.insert(
                key.to_string(),
                MemoryObject {
                    id,
                    version: 0,
                    spec,
                },
            );
        }
        self
    }

    /// Fail the given operation until cleared.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    pub fn get_sync(&self, key: &str) -> Option<MemoryObject<S>> {
        self.lock().objects.get(key).cloned()
    }

    /// Simulate a concurrent edit by someone else.
    pub fn bump_version(&self, key: &str) {
        if let Some(object) = self.lock().objects.get_mut(key) {
            object.version += 1;
        }
    }

    pub fn operations(&self) -> Vec<MemoryOperation> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Number of recorded creates, updates and deletes.
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| !matches!(op, MemoryOperation::Fetch(_)))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        &self,
        ctx: &CallContext,
        op: MemoryOperation,
    ) -> Result<MutexGuard<'_, MemoryInner<S>>, ProviderError> {
        ctx.check()?;
        let mut inner = self.lock();
        let injected = match (&inner.fail_on, &op) {
            (Some(FailOn::Fetch(e)), MemoryOperation::Fetch(_))
            | (Some(FailOn::Create(e)), MemoryOperation::Create(_))
            | (Some(FailOn::Update(e)), MemoryOperation::Update(_))
            | (Some(FailOn::Delete(e)), MemoryOperation::Delete(_)) => Some(e.clone()),
            _ => None,
        };
        inner.operations.push(op);
        match injected {
            Some(e) => Err(e),
            None => Ok(inner),
        }
    }
}

#[async_trait]
impl<S: Spec + 'static> ResourceKind for MemoryKind<S> {
    type Ref = String;
    type Spec = S;
    type Raw = MemoryObject<S>;

    fn name(&self) -> &'static str {
        "object"
    }

    fn provider(&self) -> &'static str {
        "memory"
    }

    fn update_strategy(&self) -> UpdateStrategy {
        self.strategy
    }

    fn spec_of(&self, raw: &Self::Raw) -> S {
        raw.spec.clone()
    }

    fn apply_spec(&self, raw: &mut Self::Raw, spec: &S) {
        match self.strategy {
            UpdateStrategy::Patch => spec.merge_onto(&mut raw.spec),
            UpdateStrategy::Replace | UpdateStrategy::Recreate => raw.spec = spec.clone(),
        }
    }

    async fn fetch(&self, ctx: &CallContext, reference: &String) -> Result<Self::Raw, ProviderError> {
        let inner = self.begin(ctx, MemoryOperation::Fetch(reference.clone()))?;
        inner
            .objects
            .get(reference)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(reference.clone()))
    }

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &String,
        spec: &S,
    ) -> Result<Self::Raw, ProviderError> {
        let mut inner = self.begin(ctx, MemoryOperation::Create(reference.clone()))?;
        if inner.objects.contains_key(reference) {
            return Err(ProviderError::AlreadyExists(reference.clone()));
        }
        let object = MemoryObject {
            id: inner.next_id,
            version: 0,
            spec: spec.clone(),
        };
        inner.next_id += 1;
        inner.objects.insert(reference.clone(), object.clone());
        Ok(object)
    }

    async fn update(
        &self,
        ctx: &CallContext,
        reference: &String,
        raw: &Self::Raw,
    ) -> Result<Self::Raw, ProviderError> {
        let mut inner = self.begin(ctx, MemoryOperation::Update(reference.clone()))?;
        let stored = inner
            .objects
            .get_mut(reference)
            .ok_or_else(|| ProviderError::NotFound(reference.clone()))?;
        if stored.version != raw.version {
            return Err(ProviderError::VersionConflict {
                resource: reference.clone(),
                sent: raw.version,
                message: format!("current version is {}", stored.version),
            });
        }
        stored.spec = raw.spec.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &String,
        _raw: &Self::Raw,
    ) -> Result<(), ProviderError> {
        let mut inner = self.begin(ctx, MemoryOperation::Delete(reference.clone()))?;
        inner
            .objects
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(reference.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resource::RepositorySpec;

    #[tokio::test]
    async fn create_assigns_ids() {
        let kind = MemoryKind::<RepositorySpec>::new(UpdateStrategy::Patch);
        let ctx = CallContext::new();
        let a = kind
            .create(&ctx, &"a".to_string(), &RepositorySpec::new("a"))
            .await
            .unwrap();
        let b = kind
            .create(&ctx, &"b".to_string(), &RepositorySpec::new("b"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.version, 0);
    }

    #[tokio::test]
    async fn update_increments_version() {
        let kind = MemoryKind::new(UpdateStrategy::Replace).with_object("a", RepositorySpec::new("a"));
        let ctx = CallContext::new();
        let raw = kind.fetch(&ctx, &"a".to_string()).await.unwrap();
        let updated = kind.update(&ctx, &"a".to_string(), &raw).await.unwrap();
        assert_eq!(updated.version, 1);

        // Re-sending the old version conflicts.
        let err = kind.update(&ctx, &"a".to_string(), &raw).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionConflict);
    }

    #[tokio::test]
    async fn injected_failure_is_recorded() {
        let kind = MemoryKind::<RepositorySpec>::new(UpdateStrategy::Patch)
            .fail_on(FailOn::Fetch(ProviderError::Network("reset".into())));
        let ctx = CallContext::new();
        assert!(kind.fetch(&ctx, &"a".to_string()).await.is_err());
        assert_eq!(kind.operations(), vec![MemoryOperation::Fetch("a".into())]);

        kind.clear_fail_on();
        assert!(kind.fetch(&ctx, &"a".to_string()).await.unwrap_err().is_not_found());
    }
}
