//! Trust bundles and their field-masked views.
//!
//! A [`TrustBundle`] is the stored record: the X.509 root authorities and JWT
//! signing keys of one trust domain. A [`BundleView`] is what the bundle API
//! returns after projecting a bundle through a [`BundleMask`].

use crate::cert::Certificate;
use crate::spiffe_id::{SpiffeIdError, TrustDomain};
use serde::Serialize;
use std::time::Duration;

/// A JWT signing key of a trust domain.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct JwtSigningKey {
    public_key: Vec<u8>,
    key_id: String,
    not_after: i64,
}

impl JwtSigningKey {
    /// Creates a key from its PKIX-encoded public key, key id and expiry
    /// (seconds since the Unix epoch).
    pub fn new(
        public_key: impl Into<Vec<u8>>,
        key_id: impl Into<String>,
        not_after: i64,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            key_id: key_id.into(),
            not_after,
        }
    }

    /// Returns the PKIX-encoded public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns the key id (`kid`).
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the expiry, in seconds since the Unix epoch.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }
}

/// The trust material of one trust domain, as kept by the bundle repository.
///
/// The embedded trust domain id is the repository key. It is held as the raw
/// stored string so that a corrupt record can still be read back and
/// reported.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrustBundle {
    trust_domain_id: String,
    root_cas: Vec<Certificate>,
    jwt_signing_keys: Vec<JwtSigningKey>,
    refresh_hint: Duration,
    sequence_number: u64,
}

impl TrustBundle {
    /// Creates an empty bundle for `trust_domain`.
    pub fn new(trust_domain: &TrustDomain) -> Self {
        Self::from_raw_id(trust_domain.id_string())
    }

    /// Creates an empty bundle keyed by an unvalidated trust domain id.
    pub fn from_raw_id(trust_domain_id: impl Into<String>) -> Self {
        Self {
            trust_domain_id: trust_domain_id.into(),
            root_cas: Vec::new(),
            jwt_signing_keys: Vec::new(),
            refresh_hint: Duration::ZERO,
            sequence_number: 0,
        }
    }

    /// Appends an X.509 root authority.
    pub fn with_root_ca(mut self, root_ca: Certificate) -> Self {
        self.root_cas.push(root_ca);
        self
    }

    /// Appends a JWT signing key.
    pub fn with_jwt_signing_key(mut self, key: JwtSigningKey) -> Self {
        self.jwt_signing_keys.push(key);
        self
    }

    /// Sets the refresh hint.
    pub fn with_refresh_hint(mut self, refresh_hint: Duration) -> Self {
        self.refresh_hint = refresh_hint;
        self
    }

    /// Sets the sequence number.
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Returns the stored trust domain id, e.g. `spiffe://example.org`.
    pub fn trust_domain_id(&self) -> &str {
        &self.trust_domain_id
    }

    /// Parses the stored trust domain id.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] if the stored id is malformed.
    pub fn trust_domain(&self) -> Result<TrustDomain, SpiffeIdError> {
        TrustDomain::new(&self.trust_domain_id)
    }

    /// Returns the X.509 root authorities, in insertion order.
    pub fn root_cas(&self) -> &[Certificate] {
        &self.root_cas
    }

    /// Returns the JWT signing keys, in insertion order.
    pub fn jwt_signing_keys(&self) -> &[JwtSigningKey] {
        &self.jwt_signing_keys
    }

    /// Returns the refresh hint.
    pub fn refresh_hint(&self) -> Duration {
        self.refresh_hint
    }

    /// Returns the sequence number.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }
}

/// Selects which fields of a bundle are populated in a [`BundleView`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct BundleMask {
    /// Populate [`BundleView::trust_domain`].
    pub trust_domain: bool,
    /// Populate [`BundleView::refresh_hint`].
    pub refresh_hint: bool,
    /// Accepted for compatibility; the sequence number is always emitted as zero.
    pub sequence_number: bool,
    /// Populate [`BundleView::x509_authorities`].
    pub x509_authorities: bool,
    /// Populate [`BundleView::jwt_authorities`].
    pub jwt_authorities: bool,
}

impl BundleMask {
    /// The mask applied when a request carries none: every field selected.
    pub const ALL: BundleMask = BundleMask {
        trust_domain: true,
        refresh_hint: true,
        sequence_number: true,
        x509_authorities: true,
        jwt_authorities: true,
    };
}

/// An X.509 authority as returned by the bundle API.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct X509Authority {
    /// DER-encoded certificate.
    pub asn1: Vec<u8>,
}

/// A JWT authority as returned by the bundle API.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct JwtAuthority {
    /// PKIX-encoded public key.
    pub public_key: Vec<u8>,
    /// Key id.
    pub key_id: String,
    /// Expiry, in seconds since the Unix epoch.
    pub expires_at: i64,
}

/// A bundle projected through a [`BundleMask`].
///
/// Fields not selected by the mask keep their zero value.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BundleView {
    /// Canonical trust domain name, e.g. `example.org`.
    pub trust_domain: String,
    /// Refresh hint, in seconds.
    pub refresh_hint: i64,
    /// Always zero.
    pub sequence_number: u64,
    /// X.509 root authorities.
    pub x509_authorities: Vec<X509Authority>,
    /// JWT signing keys.
    pub jwt_authorities: Vec<JwtAuthority>,
}

/// Projects `bundle` through `mask`, or through [`BundleMask::ALL`] when no
/// mask is given.
///
/// The sequence number of the view is zero whatever the stored value or the
/// mask say.
///
/// # Errors
///
/// Returns a [`SpiffeIdError`] if the trust domain is selected and the stored
/// trust domain id does not parse.
pub fn apply_mask(
    bundle: &TrustBundle,
    mask: Option<&BundleMask>,
) -> Result<BundleView, SpiffeIdError> {
    let mask = mask.unwrap_or(&BundleMask::ALL);
    let mut view = BundleView::default();

    if mask.trust_domain {
        view.trust_domain = bundle.trust_domain()?.to_string();
    }

    if mask.refresh_hint {
        view.refresh_hint = i64::try_from(bundle.refresh_hint.as_secs()).unwrap_or(i64::MAX);
    }

    // TODO: emit the stored sequence number once clients are confirmed to
    // accept it; it is zeroed to match the behavior they currently rely on.
    view.sequence_number = 0;

    if mask.x509_authorities {
        view.x509_authorities = bundle
            .root_cas
            .iter()
            .map(|ca| X509Authority {
                asn1: ca.as_bytes().to_vec(),
            })
            .collect();
    }

    if mask.jwt_authorities {
        view.jwt_authorities = bundle
            .jwt_signing_keys
            .iter()
            .map(|key| JwtAuthority {
                public_key: key.public_key.clone(),
                key_id: key.key_id.clone(),
                expires_at: key.not_after,
            })
            .collect();
    }

    Ok(view)
}
