//! Bundle API service.
//!
//! Serves the bundle of this server's trust domain and the bundles of the
//! trust domains it federates with, read from a [`BundleRepository`]. The
//! service holds no mutable state: every call reads through to the
//! repository, so it can be shared freely across request handlers.
//!
//! Federated-bundle operations never act on the server's own trust domain;
//! the comparison is made on the canonical [`TrustDomain`], so an alternate
//! spelling such as `spiffe://EXAMPLE.org` is recognized as well.
//!
//! # Example
//!
//! ```
//! use spire_trust::api::bundle::{BundleService, Config};
//! use spire_trust::repository::InMemoryBundleRepository;
//! use spire_trust::TrustDomain;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = BundleService::new(Config {
//!     repository: Arc::new(InMemoryBundleRepository::new()),
//!     trust_domain: TrustDomain::new("example.org")?,
//! });
//!
//! let response = service
//!     .batch_delete_federated_bundle(&["td1.org".to_string()])
//!     .await?;
//! for result in response.results {
//!     println!("{}: {:?}", result.trust_domain, result.status.code);
//! }
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::BundleApiError;

use crate::api::{status_from_result, ApiStatus};
use crate::bundle::{apply_mask, BundleMask, BundleView, JwtAuthority, TrustBundle};
use crate::cert::Certificate;
use crate::prelude::error;
use crate::repository::{BundleRepository, DeleteMode, Pagination, RepositoryError};
use crate::spiffe_id::TrustDomain;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Bundle service configuration.
pub struct Config {
    /// Where bundles are read from and deleted.
    pub repository: Arc<dyn BundleRepository>,
    /// This server's own trust domain.
    pub trust_domain: TrustDomain,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("repository", &"<BundleRepository>")
            .field("trust_domain", &self.trust_domain)
            .finish()
    }
}

/// Request of [`BundleService::list_federated_bundles`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ListFederatedBundlesRequest {
    /// Maximum page size; pagination is only applied when positive.
    pub page_size: i32,
    /// Continuation token from a previous response.
    pub page_token: String,
    /// Fields to populate; `None` selects every field.
    pub output_mask: Option<BundleMask>,
}

/// Response of [`BundleService::list_federated_bundles`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ListFederatedBundlesResponse {
    /// Federated bundles, in repository order.
    pub bundles: Vec<BundleView>,
    /// Token for the next page; empty once the listing is exhausted.
    pub next_page_token: String,
}

/// Outcome of one trust domain of a batch delete.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BatchDeleteResult {
    /// Whether this item was deleted, and why not.
    pub status: ApiStatus,
    /// The trust domain exactly as given in the request.
    pub trust_domain: String,
}

/// Response of [`BundleService::batch_delete_federated_bundle`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BatchDeleteFederatedBundleResponse {
    /// One result per requested trust domain, in request order.
    pub results: Vec<BatchDeleteResult>,
}

/// The bundle API.
#[derive(Clone)]
pub struct BundleService {
    repository: Arc<dyn BundleRepository>,
    trust_domain: TrustDomain,
}

impl fmt::Debug for BundleService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleService")
            .field("repository", &"<BundleRepository>")
            .field("trust_domain", &self.trust_domain)
            .finish()
    }
}

impl BundleService {
    /// Creates the service.
    pub fn new(config: Config) -> Self {
        Self {
            repository: config.repository,
            trust_domain: config.trust_domain,
        }
    }

    /// Returns this server's own trust domain.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Returns the bundle of this server's own trust domain.
    ///
    /// # Errors
    ///
    /// - [`BundleApiError::FetchBundle`] if the repository fails.
    /// - [`BundleApiError::BundleNotFound`] if no bundle is stored.
    /// - [`BundleApiError::ApplyMask`] if the stored bundle cannot be projected.
    pub async fn get_bundle(
        &self,
        output_mask: Option<BundleMask>,
    ) -> Result<BundleView, BundleApiError> {
        let bundle = self
            .repository
            .fetch_bundle(&self.trust_domain.id_string())
            .await
            .map_err(|e| {
                error!("Failed to fetch bundle: {e}");
                BundleApiError::FetchBundle(e)
            })?
            .ok_or_else(|| {
                error!("Bundle not found");
                BundleApiError::BundleNotFound
            })?;

        project(&bundle, output_mask.as_ref())
    }

    /// Returns the bundle of a federated trust domain.
    ///
    /// # Errors
    ///
    /// - [`BundleApiError::InvalidTrustDomainArgument`] if `trust_domain` does not parse.
    /// - [`BundleApiError::OwnTrustDomain`] if it names this server's trust domain.
    /// - [`BundleApiError::FetchBundle`] if the repository fails.
    /// - [`BundleApiError::FederatedBundleNotFound`] if no bundle is stored.
    pub async fn get_federated_bundle(
        &self,
        trust_domain: &str,
        output_mask: Option<BundleMask>,
    ) -> Result<BundleView, BundleApiError> {
        let td = TrustDomain::new(trust_domain).map_err(|source| {
            error!("Trust domain argument is not a valid SPIFFE ID: {trust_domain:?}");
            BundleApiError::InvalidTrustDomainArgument {
                input: trust_domain.to_string(),
                source,
            }
        })?;

        if td == self.trust_domain {
            error!("\"{td}\" is this server own trust domain, use GetBundle RPC instead");
            return Err(BundleApiError::OwnTrustDomain(td));
        }

        let bundle = self
            .repository
            .fetch_bundle(&td.id_string())
            .await
            .map_err(|e| {
                error!("Failed to fetch bundle: {e}");
                BundleApiError::FetchBundle(e)
            })?
            .ok_or_else(|| {
                error!("Bundle for {trust_domain:?} not found");
                BundleApiError::FederatedBundleNotFound(trust_domain.to_string())
            })?;

        project(&bundle, output_mask.as_ref())
    }

    /// Lists the bundles of federated trust domains.
    ///
    /// The server's own bundle is left out of the results; it still occupies
    /// its slot in the repository page, so a page can hold fewer bundles than
    /// `page_size`. The repository's continuation token is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`BundleApiError::ListBundles`] if the repository fails.
    /// - [`BundleApiError::InvalidStoredTrustDomain`] if any listed bundle has a
    ///   corrupt trust domain id; the whole call fails rather than skipping it.
    pub async fn list_federated_bundles(
        &self,
        request: ListFederatedBundlesRequest,
    ) -> Result<ListFederatedBundlesResponse, BundleApiError> {
        let pagination = (request.page_size > 0).then(|| Pagination {
            page_size: request.page_size,
            token: request.page_token.clone(),
        });

        let listed = self
            .repository
            .list_bundles(pagination)
            .await
            .map_err(|e| {
                error!("Failed to list bundles: {e}");
                BundleApiError::ListBundles(e)
            })?;

        let mut bundles = Vec::with_capacity(listed.bundles.len());
        for bundle in &listed.bundles {
            let td = bundle.trust_domain().map_err(|source| {
                error!(
                    "Bundle has an invalid trust domain ID: trust_domain_id={:?}, error={source}",
                    bundle.trust_domain_id()
                );
                BundleApiError::InvalidStoredTrustDomain {
                    id: bundle.trust_domain_id().to_string(),
                    source,
                }
            })?;

            if td == self.trust_domain {
                continue;
            }

            bundles.push(project(bundle, request.output_mask.as_ref())?);
        }

        Ok(ListFederatedBundlesResponse {
            bundles,
            next_page_token: listed.pagination.map(|p| p.token).unwrap_or_default(),
        })
    }

    /// Deletes the bundles of the given federated trust domains.
    ///
    /// Each trust domain is handled on its own and reported in its own
    /// [`BatchDeleteResult`], in request order; a failing item never fails the
    /// call. Bundles are deleted in [`DeleteMode::Restrict`].
    ///
    /// # Errors
    ///
    /// Returns [`BundleApiError::MissingTrustDomains`] if `trust_domains` is
    /// empty, without touching the repository.
    pub async fn batch_delete_federated_bundle(
        &self,
        trust_domains: &[String],
    ) -> Result<BatchDeleteFederatedBundleResponse, BundleApiError> {
        if trust_domains.is_empty() {
            error!("Invalid request: missing trust domains");
            return Err(BundleApiError::MissingTrustDomains);
        }

        let mut results = Vec::with_capacity(trust_domains.len());
        for trust_domain in trust_domains {
            let result = self.delete_federated_bundle(trust_domain).await;
            results.push(BatchDeleteResult {
                status: status_from_result(&result),
                trust_domain: trust_domain.clone(),
            });
        }

        Ok(BatchDeleteFederatedBundleResponse { results })
    }

    async fn delete_federated_bundle(&self, trust_domain: &str) -> Result<(), BundleApiError> {
        let td = TrustDomain::new(trust_domain).map_err(|e| {
            error!("Invalid request: malformed trust domain: trust_domain_id={trust_domain:?}, error={e}");
            BundleApiError::MalformedTrustDomain(e)
        })?;

        if td == self.trust_domain {
            error!(
                "Invalid request: removing the bundle for the server trust domain is not allowed: trust_domain_id={trust_domain:?}"
            );
            return Err(BundleApiError::DeleteServerBundle);
        }

        match self
            .repository
            .delete_bundle(&td.id_string(), DeleteMode::Restrict)
            .await
        {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound) => Err(BundleApiError::NoSuchBundle),
            Err(e) => {
                error!("Failed to delete federated bundle: trust_domain_id={trust_domain:?}, error={e}");
                Err(BundleApiError::DeleteFederatedBundle(e))
            }
        }
    }

    /// Appends authorities to the server's own bundle. Not served.
    ///
    /// # Errors
    ///
    /// Always returns [`BundleApiError::Unimplemented`].
    pub async fn append_bundle(
        &self,
        _x509_authorities: Vec<Certificate>,
        _jwt_authorities: Vec<JwtAuthority>,
        _output_mask: Option<BundleMask>,
    ) -> Result<BundleView, BundleApiError> {
        Err(BundleApiError::Unimplemented("AppendBundle"))
    }

    /// Publishes a JWT authority. Not served.
    ///
    /// # Errors
    ///
    /// Always returns [`BundleApiError::Unimplemented`].
    pub async fn publish_jwt_authority(
        &self,
        _jwt_authority: JwtAuthority,
    ) -> Result<Vec<JwtAuthority>, BundleApiError> {
        Err(BundleApiError::Unimplemented("PublishJWTAuthority"))
    }

    /// Creates federated bundles. Not served.
    ///
    /// # Errors
    ///
    /// Always returns [`BundleApiError::Unimplemented`].
    pub async fn batch_create_federated_bundle(
        &self,
        _bundles: Vec<TrustBundle>,
        _output_mask: Option<BundleMask>,
    ) -> Result<Vec<BundleView>, BundleApiError> {
        Err(BundleApiError::Unimplemented("BatchCreateFederatedBundle"))
    }

    /// Updates federated bundles. Not served.
    ///
    /// # Errors
    ///
    /// Always returns [`BundleApiError::Unimplemented`].
    pub async fn batch_update_federated_bundle(
        &self,
        _bundles: Vec<TrustBundle>,
        _input_mask: Option<BundleMask>,
        _output_mask: Option<BundleMask>,
    ) -> Result<Vec<BundleView>, BundleApiError> {
        Err(BundleApiError::Unimplemented("BatchUpdateFederatedBundle"))
    }

    /// Creates or replaces federated bundles. Not served.
    ///
    /// # Errors
    ///
    /// Always returns [`BundleApiError::Unimplemented`].
    pub async fn batch_set_federated_bundle(
        &self,
        _bundles: Vec<TrustBundle>,
        _output_mask: Option<BundleMask>,
    ) -> Result<Vec<BundleView>, BundleApiError> {
        Err(BundleApiError::Unimplemented("BatchSetFederatedBundle"))
    }
}

fn project(
    bundle: &TrustBundle,
    mask: Option<&BundleMask>,
) -> Result<BundleView, BundleApiError> {
    apply_mask(bundle, mask).map_err(|e| {
        error!("Failed to apply mask: {e}");
        BundleApiError::ApplyMask(e)
    })
}
