//! resource
//!
//! Generic reconciliation of one remote resource against a desired spec.
//!
//! # Design
//!
//! Each resource kind (repository, deploy key, team access, pull request)
//! implements [`ResourceKind`] once per provider: how to fetch, create,
//! update and delete the provider's raw form, and how to project a raw form
//! onto a [`Spec`]. [`ResourceHandle`] drives the shared protocol on top:
//!
//! 1. fetch the referenced resource
//! 2. on `NotFound`, create it from the desired spec (`changed = true`)
//! 3. on any other error, stop
//! 4. otherwise compare; if satisfied, stop without another call
//!    (`changed = false`), else apply the spec onto the raw form and update
//!    (`changed = true`)
//!
//! The raw form cached in a handle is replaced wholesale after every
//! successful fetch or mutation, never patched field by field.
//!
//! # Update Strategies
//!
//! - [`UpdateStrategy::Patch`]: only set fields are sent and compared
//! - [`UpdateStrategy::Replace`]: the full raw form is sent; comparison is
//!   full spec equality, so unset optional fields are reset
//! - [`UpdateStrategy::Recreate`]: delete, then create. Not atomic. If the
//!   create fails the resource is gone and the error is
//!   [`ProviderError::RecreateFailed`]
//!
//! # Example
//!
//! ```
//! use gitprovider::resource::memory::MemoryKind;
//! use gitprovider::resource::{RepositorySpec, ResourceHandle, UpdateStrategy};
//! use gitprovider::CallContext;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let kind = MemoryKind::<RepositorySpec>::new(UpdateStrategy::Patch);
//! let ctx = CallContext::new();
//!
//! let mut handle = ResourceHandle::new(kind.clone(), "svc".to_string());
//! handle.set(RepositorySpec::new("svc").with_description("Service"));
//! assert!(handle.reconcile(&ctx).await.unwrap());
//!
//! let mut again = ResourceHandle::new(kind, "svc".to_string());
//! again.set(RepositorySpec::new("svc").with_description("Service"));
//! assert!(!again.reconcile(&ctx).await.unwrap());
//! # });
//! ```

pub mod memory;
mod spec;

pub use spec::{
    branch_display_id, branch_ref_id, normalize_public_key, slugify, DeployKeyRef, DeployKeySpec,
    PullRequestRef, PullRequestSpec, RepositoryRef, RepositorySpec, Spec, TeamAccessRef,
    TeamAccessSpec, Visibility,
};

use std::fmt;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::{ErrorKind, ProviderError};

/// How a kind applies a changed spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    /// Partial update; unset fields are left alone
    Patch,
    /// Full replacement of the raw form
    Replace,
    /// Delete then create
    Recreate,
}

impl UpdateStrategy {
    /// Whether `actual` already satisfies `desired` under this strategy.
    pub fn is_satisfied<S: Spec>(self, desired: &S, actual: &S) -> bool {
        match self {
            UpdateStrategy::Patch => desired.is_satisfied_by(actual),
            UpdateStrategy::Replace | UpdateStrategy::Recreate => desired == actual,
        }
    }
}

/// Provider-specific operations for one resource kind.
///
/// `Raw` is the provider's own representation, typed per kind, so handles
/// never downcast.
#[async_trait]
pub trait ResourceKind: Send + Sync {
    type Ref: Clone + fmt::Debug + fmt::Display + Send + Sync;
    type Spec: Spec;
    type Raw: Clone + fmt::Debug + Send + Sync;

    /// Resource kind name for logs and errors, e.g. `"deploy key"`.
    fn name(&self) -> &'static str;

    /// Provider name, e.g. `"stash"`.
    fn provider(&self) -> &'static str;

    fn update_strategy(&self) -> UpdateStrategy;

    /// Project a raw form onto its spec. Must not look at server-assigned
    /// fields.
    fn spec_of(&self, raw: &Self::Raw) -> Self::Spec;

    /// Overwrite the spec fields of `raw` with `spec`, keeping everything
    /// server-assigned (ids, versions).
    fn apply_spec(&self, raw: &mut Self::Raw, spec: &Self::Spec);

    /// Whether `raw` already satisfies `desired`. Kinds whose remote state
    /// can sit above what a write is able to change override this.
    fn satisfies(&self, raw: &Self::Raw, desired: &Self::Spec) -> bool {
        self.update_strategy()
            .is_satisfied(desired, &self.spec_of(raw))
    }

    /// Check and normalize a spec before it is compared or sent.
    fn validate(&self, _spec: &mut Self::Spec) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch(&self, ctx: &CallContext, reference: &Self::Ref)
        -> Result<Self::Raw, ProviderError>;

    async fn create(
        &self,
        ctx: &CallContext,
        reference: &Self::Ref,
        spec: &Self::Spec,
    ) -> Result<Self::Raw, ProviderError>;

    /// Send `raw` as the new state. Only called for `Patch` and `Replace`.
    async fn update(
        &self,
        _ctx: &CallContext,
        _reference: &Self::Ref,
        _raw: &Self::Raw,
    ) -> Result<Self::Raw, ProviderError> {
        Err(ProviderError::unsupported(
            self.provider(),
            format!("updating a {}", self.name()),
        ))
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        reference: &Self::Ref,
        raw: &Self::Raw,
    ) -> Result<(), ProviderError>;
}

/// Where a handle is in its lifecycle. Never persisted; every handle starts
/// at `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unknown,
    Fetched,
    Created,
    Updated,
    Deleted,
}

/// One remote resource bound to a reference.
pub struct ResourceHandle<K: ResourceKind> {
    kind: K,
    reference: K::Ref,
    desired: Option<K::Spec>,
    raw: Option<K::Raw>,
    state: HandleState,
}

impl<K: ResourceKind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind.name())
            .field("reference", &self.reference)
            .field("desired", &self.desired)
            .field("raw", &self.raw)
            .field("state", &self.state)
            .finish()
    }
}

impl<K: ResourceKind> ResourceHandle<K> {
    pub fn new(kind: K, reference: K::Ref) -> Self {
        Self {
            kind,
            reference,
            desired: None,
            raw: None,
            state: HandleState::Unknown,
        }
    }

    /// Fetch `reference` and return a handle holding its raw form.
    ///
    /// # Errors
    ///
    /// `NotFound` is returned as-is.
    pub async fn get(kind: K, ctx: &CallContext, reference: K::Ref) -> Result<Self, ProviderError> {
        let mut handle = Self::new(kind, reference);
        handle.fetch(ctx).await?;
        Ok(handle)
    }

    pub fn reference(&self) -> &K::Ref {
        &self.reference
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// The cached raw form, if fetched or returned by a mutation.
    pub fn api_object(&self) -> Option<&K::Raw> {
        self.raw.as_ref()
    }

    /// The desired spec if one was set, otherwise the projection of the raw
    /// form.
    pub fn spec(&self) -> Option<K::Spec> {
        self.desired
            .clone()
            .or_else(|| self.raw.as_ref().map(|raw| self.kind.spec_of(raw)))
    }

    /// Set the desired spec and apply it onto the cached raw form.
    pub fn set(&mut self, spec: K::Spec) {
        if let Some(raw) = self.raw.as_mut() {
            self.kind.apply_spec(raw, &spec);
        }
        self.desired = Some(spec);
    }

    /// Fetch the raw form, replacing any cached one.
    pub async fn fetch(&mut self, ctx: &CallContext) -> Result<&K::Raw, ProviderError> {
        let raw = self.kind.fetch(ctx, &self.reference).await?;
        tracing::debug!(kind = self.kind.name(), resource = %self.reference, "fetched");
        self.state = HandleState::Fetched;
        Ok(&*self.raw.insert(raw))
    }

    /// Create the resource from the desired spec.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` is returned as-is; it never turns into an update.
    pub async fn create(&mut self, ctx: &CallContext) -> Result<&K::Raw, ProviderError> {
        let mut spec = self.require_desired()?;
        self.kind.validate(&mut spec)?;
        let raw = self.kind.create(ctx, &self.reference, &spec).await?;
        tracing::info!(kind = self.kind.name(), resource = %self.reference, "created");
        self.desired = Some(spec);
        self.state = HandleState::Created;
        Ok(&*self.raw.insert(raw))
    }

    /// Push the cached raw form to the provider using the kind's strategy.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if nothing was fetched yet
    /// - `RecreateFailed` if a recreate deleted the resource and could not
    ///   create it again; the handle then holds no raw form
    pub async fn update(&mut self, ctx: &CallContext) -> Result<&K::Raw, ProviderError> {
        let raw = self.raw.clone().ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "{} must be fetched before it is updated",
                self.reference
            ))
        })?;

        let result = match self.kind.update_strategy() {
            UpdateStrategy::Patch | UpdateStrategy::Replace => {
                self.kind.update(ctx, &self.reference, &raw).await
            }
            UpdateStrategy::Recreate => self.recreate(ctx, &raw).await,
        };

        match result {
            Ok(updated) => {
                tracing::info!(kind = self.kind.name(), resource = %self.reference, "updated");
                self.state = HandleState::Updated;
                Ok(&*self.raw.insert(updated))
            }
            Err(e) => {
                if e.kind() == ErrorKind::RecreateFailed {
                    self.raw = None;
                    self.state = HandleState::Deleted;
                }
                Err(e)
            }
        }
    }

    async fn recreate(&self, ctx: &CallContext, raw: &K::Raw) -> Result<K::Raw, ProviderError> {
        let mut spec = self.kind.spec_of(raw);
        self.kind.validate(&mut spec)?;

        self.kind.delete(ctx, &self.reference, raw).await?;
        tracing::debug!(kind = self.kind.name(), resource = %self.reference, "deleted for recreate");

        self.kind
            .create(ctx, &self.reference, &spec)
            .await
            .map_err(|source| {
                tracing::error!(
                    kind = self.kind.name(),
                    resource = %self.reference,
                    error = %source,
                    "recreate failed after delete; resource is absent"
                );
                ProviderError::RecreateFailed {
                    resource: self.reference.to_string(),
                    source: Box::new(source),
                }
            })
    }

    /// Delete the resource, fetching it first if needed.
    pub async fn delete(&mut self, ctx: &CallContext) -> Result<(), ProviderError> {
        let raw = match self.raw.take() {
            Some(raw) => raw,
            None => self.kind.fetch(ctx, &self.reference).await?,
        };
        if let Err(e) = self.kind.delete(ctx, &self.reference, &raw).await {
            self.raw = Some(raw);
            return Err(e);
        }
        tracing::info!(kind = self.kind.name(), resource = %self.reference, "deleted");
        self.state = HandleState::Deleted;
        Ok(())
    }

    /// Converge the remote resource to the desired spec.
    ///
    /// Returns whether a mutating call was made.
    pub async fn reconcile(&mut self, ctx: &CallContext) -> Result<bool, ProviderError> {
        let mut desired = self.require_desired()?;
        self.kind.validate(&mut desired)?;
        self.desired = Some(desired.clone());

        match self.kind.fetch(ctx, &self.reference).await {
            Ok(raw) => {
                let satisfied = self.kind.satisfies(&raw, &desired);
                let actual = self.kind.spec_of(&raw);
                self.raw = Some(raw);
                self.state = HandleState::Fetched;

                if satisfied {
                    tracing::info!(kind = self.kind.name(), resource = %self.reference, "unchanged");
                    return Ok(false);
                }

                tracing::debug!(?desired, ?actual, "spec differs");
                self.set(desired);
                self.update(ctx).await?;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                self.create(ctx).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn require_desired(&self) -> Result<K::Spec, ProviderError> {
        self.desired.clone().ok_or_else(|| {
            ProviderError::InvalidRequest(format!("no desired spec set for {}", self.reference))
        })
    }
}
