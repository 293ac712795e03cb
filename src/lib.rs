//! gitprovider - A provider-agnostic client for Git hosting REST APIs
//!
//! gitprovider talks to GitHub and Bitbucket Server (Stash) through one
//! [`GitProvider`](provider::GitProvider) trait, and reconciles
//! repositories, deploy keys, team access and pull requests against a
//! desired state: fetch, compare, and write only when something differs.
//!
//! # Architecture
//!
//! The codebase is layered bottom-up:
//!
//! - [`transport`] - HTTP requests with retry and backoff
//! - [`pagination`] - Collects every page of a paged listing
//! - [`permission`] - Provider-neutral permission levels and their mapping
//! - [`resource`] - Desired-state specs and the reconcile protocol
//! - [`provider`] - The GitHub and Bitbucket Server backends
//! - [`config`] - Configuration file and environment
//! - [`cli`] - Command-line interface
//!
//! # Correctness Invariants
//!
//! 1. A reconcile whose fetched state already matches issues no write
//! 2. Paged listings are returned whole or not at all
//! 3. Every call honours the cancellation and deadline of its [`CallContext`]

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod pagination;
pub mod permission;
pub mod provider;
pub mod resource;
pub mod transport;

pub use context::CallContext;
pub use error::{ErrorKind, FieldError, ProviderError};
