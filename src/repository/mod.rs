//! Bundle repository abstraction.
//!
//! The bundle API reads and deletes bundles through [`BundleRepository`]; the
//! storage engine behind it lives outside this crate. Bundles are keyed by the
//! SPIFFE ID of their trust domain (`spiffe://example.org`).
//!
//! Calls are cancelled by dropping the returned future, so a caller-side
//! deadline (e.g. a gRPC request timeout) propagates into the repository.

pub mod memory;

pub use memory::InMemoryBundleRepository;

use crate::bundle::TrustBundle;
use async_trait::async_trait;
use thiserror::Error;

/// Error surfaced by a bundle repository.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum RepositoryError {
    /// No bundle is stored under the requested trust domain id.
    #[error("no such bundle")]
    NotFound,

    /// The operation is not allowed in the current state, e.g. deleting a
    /// bundle in [`DeleteMode::Restrict`] while entries still reference it.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Any other storage failure.
    #[error("{0}")]
    Backend(String),
}

/// How a delete treats registration entries that federate with the bundle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum DeleteMode {
    /// Refuse to delete while the bundle is referenced.
    #[default]
    Restrict,
    /// Delete the referencing entries together with the bundle.
    Delete,
    /// Remove the references from the entries, then delete the bundle.
    Dissociate,
}

/// Page request and continuation.
///
/// On requests, `token` is the continuation returned by the previous page
/// (empty for the first page). On responses it is the token for the next page,
/// empty once the listing is exhausted.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Pagination {
    /// Maximum number of bundles per page.
    pub page_size: i32,
    /// Continuation token.
    pub token: String,
}

/// Result of [`BundleRepository::list_bundles`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ListBundlesResponse {
    /// Bundles in repository order.
    pub bundles: Vec<TrustBundle>,
    /// Present when the request was paginated.
    pub pagination: Option<Pagination>,
}

/// Storage of trust bundles, keyed by trust domain id.
#[async_trait]
pub trait BundleRepository: Send + Sync {
    /// Fetches the bundle stored under `trust_domain_id`, if any.
    async fn fetch_bundle(
        &self,
        trust_domain_id: &str,
    ) -> Result<Option<TrustBundle>, RepositoryError>;

    /// Lists bundles in repository order, one page at a time when
    /// `pagination` is given.
    async fn list_bundles(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<ListBundlesResponse, RepositoryError>;

    /// Creates or replaces the bundle stored under its own trust domain id.
    async fn set_bundle(&self, bundle: TrustBundle) -> Result<TrustBundle, RepositoryError>;

    /// Deletes the bundle stored under `trust_domain_id`.
    ///
    /// Fails with [`RepositoryError::NotFound`] if there is none.
    async fn delete_bundle(
        &self,
        trust_domain_id: &str,
        mode: DeleteMode,
    ) -> Result<(), RepositoryError>;
}
