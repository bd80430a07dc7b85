#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Coordination logic around SPIRE trust material.
//!
//! This library provides:
//!
//! - a federated [bundle service](api::bundle::BundleService) that reads,
//!   lists and batch-deletes trust bundles of peer trust domains, projecting
//!   each bundle through a [`BundleMask`](bundle::BundleMask);
//! - a [coalescing pipe](pipe) that delivers identity updates to slow SVID
//!   store consumers without ever stalling the issuing path;
//! - a lock-free-to-read [`Property`](observer::Property) and the
//!   [rotator](rotator) that uses it to hand the current credential and root
//!   CAs to the transport layer.
//!
//! Cryptographic signing, persistent storage and RPC transport are left to the
//! caller: storage is reached through the
//! [`BundleRepository`](repository::BundleRepository) trait.
//!
//! # Examples
//!
//! ```no_run
//! use spire_trust::api::bundle::{BundleService, Config, ListFederatedBundlesRequest};
//! use spire_trust::bundle::TrustBundle;
//! use spire_trust::repository::{BundleRepository, InMemoryBundleRepository};
//! use spire_trust::TrustDomain;
//! use std::error::Error;
//! use std::sync::Arc;
//!
//! # async fn some_function() -> Result<(), Box<dyn Error>> {
//! let repository = Arc::new(InMemoryBundleRepository::new());
//!
//! // store the bundle of a federated trust domain
//! let federated = TrustDomain::new("federated.org")?;
//! repository.set_bundle(TrustBundle::new(&federated)).await?;
//!
//! let service = BundleService::new(Config {
//!     repository,
//!     trust_domain: TrustDomain::new("example.org")?,
//! });
//!
//! // fetch a single federated bundle with every field
//! let view = service.get_federated_bundle("federated.org", None).await?;
//! assert_eq!(view.trust_domain, "federated.org");
//!
//! // list federated bundles, two at a time
//! let page = service
//!     .list_federated_bundles(ListFederatedBundlesRequest {
//!         page_size: 2,
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{} bundles, next token {:?}", page.bundles.len(), page.next_page_token);
//!
//! // remove federated bundles, one status per trust domain
//! let response = service
//!     .batch_delete_federated_bundle(&["federated.org".to_string()])
//!     .await?;
//! assert!(response.results[0].status.is_ok());
//! # Ok(())
//! # }
//! ```

mod observability;
mod prelude;

pub mod api;
pub mod bundle;
pub mod cert;
pub mod observer;
pub mod pipe;
pub mod repository;
pub mod rotator;
pub mod selectors;
pub mod spiffe_id;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    api::bundle::{BundleApiError, BundleService},
    api::ApiStatus,
    bundle::{BundleMask, BundleView, TrustBundle},
    observer::Property,
    pipe::{buffered_pipe, IdentityUpdate, PipeIn, PipeOut},
    repository::{BundleRepository, InMemoryBundleRepository},
    rotator::{new_rotator, CredentialAccessor, Rotator},
    selectors::Selector,
    spiffe_id::{SpiffeId, SpiffeIdError, TrustDomain},
};
