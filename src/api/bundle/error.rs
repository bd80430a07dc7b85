use crate::repository::RepositoryError;
use crate::spiffe_id::{SpiffeIdError, TrustDomain};
use thiserror::Error;
use tonic::{Code, Status};

/// Errors returned by the bundle API, whole-call or per batch item.
///
/// Use [`BundleApiError::code`] for the status code; converting into a
/// [`tonic::Status`] keeps the message verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BundleApiError {
    /// The repository failed to fetch a bundle.
    #[error("failed to fetch bundle: {0}")]
    FetchBundle(#[source] RepositoryError),

    /// The server's own bundle is not stored.
    #[error("bundle not found")]
    BundleNotFound,

    /// The requested federated bundle is not stored.
    #[error("bundle for {0:?} not found")]
    FederatedBundleNotFound(String),

    /// The trust domain argument does not parse.
    #[error("trust domain argument is not a valid SPIFFE ID: {input:?}")]
    InvalidTrustDomainArgument {
        /// The raw argument.
        input: String,
        /// Why it does not parse.
        #[source]
        source: SpiffeIdError,
    },

    /// A federated-bundle operation targeted the server's own trust domain.
    #[error("\"{0}\" is this server own trust domain, use GetBundle RPC instead")]
    OwnTrustDomain(TrustDomain),

    /// The repository failed to list bundles.
    #[error("failed to list bundles: {0}")]
    ListBundles(#[source] RepositoryError),

    /// A stored bundle carries a trust domain id that does not parse.
    #[error("bundle has an invalid trust domain ID: {id:?}")]
    InvalidStoredTrustDomain {
        /// The stored id.
        id: String,
        /// Why it does not parse.
        #[source]
        source: SpiffeIdError,
    },

    /// The bundle could not be projected through the output mask.
    #[error("failed to apply mask: {0}")]
    ApplyMask(#[source] SpiffeIdError),

    /// A batch request carried no trust domains.
    #[error("request missing trust domains")]
    MissingTrustDomains,

    /// A batch item is not a valid trust domain.
    #[error("malformed trust domain: {0}")]
    MalformedTrustDomain(#[source] SpiffeIdError),

    /// A batch delete item targeted the server's own trust domain.
    #[error("removing the bundle for the server trust domain is not allowed")]
    DeleteServerBundle,

    /// A batch delete item names a bundle the repository does not hold.
    #[error("no such bundle")]
    NoSuchBundle,

    /// The repository failed to delete a bundle.
    #[error("failed to delete federated bundle: {0}")]
    DeleteFederatedBundle(#[source] RepositoryError),

    /// The RPC is declared but not served.
    #[error("method {0} not implemented")]
    Unimplemented(&'static str),
}

impl BundleApiError {
    /// Returns the gRPC status code for this error.
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidTrustDomainArgument { .. }
            | Self::OwnTrustDomain(_)
            | Self::MissingTrustDomains
            | Self::MalformedTrustDomain(_)
            | Self::DeleteServerBundle => Code::InvalidArgument,
            Self::BundleNotFound | Self::FederatedBundleNotFound(_) | Self::NoSuchBundle => {
                Code::NotFound
            }
            Self::FetchBundle(_)
            | Self::ListBundles(_)
            | Self::InvalidStoredTrustDomain { .. }
            | Self::ApplyMask(_)
            | Self::DeleteFederatedBundle(_) => Code::Internal,
            Self::Unimplemented(_) => Code::Unimplemented,
        }
    }
}

impl From<&BundleApiError> for Code {
    fn from(err: &BundleApiError) -> Self {
        err.code()
    }
}

impl From<BundleApiError> for Status {
    fn from(err: BundleApiError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! status_tests {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (err, code, message): (BundleApiError, Code, &str) = $value;
                let status = Status::from(err);
                assert_eq!(status.code(), code);
                assert_eq!(status.message(), message);
            }
        )*
        }
    }

    status_tests! {
        own_trust_domain: (
            BundleApiError::OwnTrustDomain(TrustDomain::new("example.org").unwrap()),
            Code::InvalidArgument,
            "\"example.org\" is this server own trust domain, use GetBundle RPC instead",
        ),
        federated_not_found: (
            BundleApiError::FederatedBundleNotFound("another-example.org".to_string()),
            Code::NotFound,
            "bundle for \"another-example.org\" not found",
        ),
        invalid_argument: (
            BundleApiError::InvalidTrustDomainArgument {
                input: "//not-valid".to_string(),
                source: SpiffeIdError::BadTrustDomainChar,
            },
            Code::InvalidArgument,
            "trust domain argument is not a valid SPIFFE ID: \"//not-valid\"",
        ),
        fetch_failure: (
            BundleApiError::FetchBundle(RepositoryError::Backend("datastore error".to_string())),
            Code::Internal,
            "failed to fetch bundle: datastore error",
        ),
        delete_failure: (
            BundleApiError::DeleteFederatedBundle(RepositoryError::Backend("datasource fails".to_string())),
            Code::Internal,
            "failed to delete federated bundle: datasource fails",
        ),
        unimplemented: (
            BundleApiError::Unimplemented("AppendBundle"),
            Code::Unimplemented,
            "method AppendBundle not implemented",
        ),
    }
}
