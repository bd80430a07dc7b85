//! In-memory bundle repository.
//!
//! Keeps bundles ordered by trust domain id. Suitable for single-instance
//! deployments and as the repository double in tests: failures can be
//! injected with [`InMemoryBundleRepository::set_error`] and calls counted
//! with [`InMemoryBundleRepository::call_count`].

use super::{BundleRepository, DeleteMode, ListBundlesResponse, Pagination, RepositoryError};
use crate::bundle::TrustBundle;
use crate::prelude::debug;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Bundle repository backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct InMemoryBundleRepository {
    bundles: RwLock<BTreeMap<String, TrustBundle>>,
    // Number of registration entries federating with each trust domain id.
    references: RwLock<HashMap<String, usize>>,
    error: RwLock<Option<RepositoryError>>,
    calls: AtomicUsize,
}

impl InMemoryBundleRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more registration entry federating with `trust_domain_id`.
    ///
    /// A referenced bundle cannot be deleted in [`DeleteMode::Restrict`].
    pub fn add_reference(&self, trust_domain_id: &str) {
        let mut references = self
            .references
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *references.entry(trust_domain_id.to_string()).or_default() += 1;
    }

    /// Makes every subsequent call fail with `error`, or succeed again with `None`.
    pub fn set_error(&self, error: Option<RepositoryError>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Returns how many repository operations have been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the ids of all stored bundles, in order.
    pub fn trust_domain_ids(&self) -> Vec<String> {
        self.bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn begin_call(&self) -> Result<(), RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BundleRepository for InMemoryBundleRepository {
    async fn fetch_bundle(
        &self,
        trust_domain_id: &str,
    ) -> Result<Option<TrustBundle>, RepositoryError> {
        self.begin_call()?;
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(bundles.get(trust_domain_id).cloned())
    }

    async fn list_bundles(
        &self,
        pagination: Option<Pagination>,
    ) -> Result<ListBundlesResponse, RepositoryError> {
        self.begin_call()?;
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);

        let Some(page) = pagination else {
            return Ok(ListBundlesResponse {
                bundles: bundles.values().cloned().collect(),
                pagination: None,
            });
        };

        if page.page_size <= 0 {
            return Err(RepositoryError::Backend(format!(
                "cannot paginate with pagesize = {}",
                page.page_size
            )));
        }

        let start = if page.token.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(page.token.clone())
        };
        let mut remaining = bundles.range((start, Bound::Unbounded));

        let page_size = usize::try_from(page.page_size).unwrap_or(usize::MAX);
        let selected: Vec<TrustBundle> = remaining
            .by_ref()
            .take(page_size)
            .map(|(_, b)| b.clone())
            .collect();

        let token = match (selected.last(), remaining.next()) {
            (Some(last), Some(_)) => last.trust_domain_id().to_string(),
            _ => String::new(),
        };

        Ok(ListBundlesResponse {
            bundles: selected,
            pagination: Some(Pagination {
                page_size: page.page_size,
                token,
            }),
        })
    }

    async fn set_bundle(&self, bundle: TrustBundle) -> Result<TrustBundle, RepositoryError> {
        self.begin_call()?;
        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        bundles.insert(bundle.trust_domain_id().to_string(), bundle.clone());
        Ok(bundle)
    }

    async fn delete_bundle(
        &self,
        trust_domain_id: &str,
        mode: DeleteMode,
    ) -> Result<(), RepositoryError> {
        self.begin_call()?;
        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        if !bundles.contains_key(trust_domain_id) {
            return Err(RepositoryError::NotFound);
        }

        let mut references = self
            .references
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let referenced_by = references.get(trust_domain_id).copied().unwrap_or(0);

        if referenced_by > 0 {
            if mode == DeleteMode::Restrict {
                return Err(RepositoryError::FailedPrecondition(format!(
                    "cannot delete bundle; federated with {referenced_by} registration entries"
                )));
            }
            debug!(
                "Releasing federation references: trust_domain_id={trust_domain_id}, entries={referenced_by}, mode={mode:?}"
            );
            references.remove(trust_domain_id);
        }

        bundles.remove(trust_domain_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::spiffe_id::TrustDomain;

    fn bundle(name: &str) -> TrustBundle {
        TrustBundle::new(&TrustDomain::new(name).unwrap())
    }

    async fn repository_with(names: &[&str]) -> InMemoryBundleRepository {
        let repository = InMemoryBundleRepository::new();
        for name in names {
            repository.set_bundle(bundle(name)).await.unwrap();
        }
        repository
    }

    fn ids(response: &ListBundlesResponse) -> Vec<&str> {
        response
            .bundles
            .iter()
            .map(TrustBundle::trust_domain_id)
            .collect()
    }

    #[tokio::test]
    async fn test_set_replaces_existing_bundle() {
        let repository = repository_with(&["td1.org"]).await;
        let updated = bundle("td1.org").with_sequence_number(7);
        repository.set_bundle(updated.clone()).await.unwrap();

        let fetched = repository.fetch_bundle("spiffe://td1.org").await.unwrap();
        assert_eq!(fetched, Some(updated));
        assert_eq!(repository.trust_domain_ids(), vec!["spiffe://td1.org"]);
    }

    #[tokio::test]
    async fn test_list_pages_until_exhausted() {
        let repository = repository_with(&["td3.org", "td1.org", "td2.org"]).await;

        let first = repository
            .list_bundles(Some(Pagination {
                page_size: 2,
                token: String::new(),
            }))
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["spiffe://td1.org", "spiffe://td2.org"]);
        let token = first.pagination.unwrap().token;
        assert_eq!(token, "spiffe://td2.org");

        let second = repository
            .list_bundles(Some(Pagination {
                page_size: 2,
                token,
            }))
            .await
            .unwrap();
        assert_eq!(ids(&second), vec!["spiffe://td3.org"]);
        assert_eq!(second.pagination.unwrap().token, "");
    }

    #[tokio::test]
    async fn test_list_without_pagination_returns_everything() {
        let repository = repository_with(&["td2.org", "td1.org"]).await;
        let response = repository.list_bundles(None).await.unwrap();
        assert_eq!(ids(&response), vec!["spiffe://td1.org", "spiffe://td2.org"]);
        assert!(response.pagination.is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_bundle_is_not_found() {
        let repository = repository_with(&[]).await;
        let err = repository
            .delete_bundle("spiffe://td1.org", DeleteMode::Restrict)
            .await
            .unwrap_err();
        assert_eq!(err, RepositoryError::NotFound);
    }

    #[tokio::test]
    async fn test_delete_modes_with_references() {
        let repository = repository_with(&["td1.org"]).await;
        repository.add_reference("spiffe://td1.org");

        let err = repository
            .delete_bundle("spiffe://td1.org", DeleteMode::Restrict)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::FailedPrecondition(_)));
        assert_eq!(repository.trust_domain_ids(), vec!["spiffe://td1.org"]);

        repository
            .delete_bundle("spiffe://td1.org", DeleteMode::Dissociate)
            .await
            .unwrap();
        assert!(repository.trust_domain_ids().is_empty());
    }

    #[tokio::test]
    async fn test_injected_error_fails_every_call() {
        let repository = repository_with(&["td1.org"]).await;
        repository.set_error(Some(RepositoryError::Backend("datasource fails".into())));

        let err = repository.fetch_bundle("spiffe://td1.org").await.unwrap_err();
        assert_eq!(err.to_string(), "datasource fails");
        assert_eq!(repository.call_count(), 2);

        repository.set_error(None);
        assert!(repository.list_bundles(None).await.is_ok());
    }
}
