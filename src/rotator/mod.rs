//! Credential publication for the agent's own identity.
//!
//! [`new_rotator`] wires a credential [`Property`] and a bundle-map
//! [`Property`] into a [`Rotator`], the single writer of the credential, and
//! a [`CredentialAccessor`] that the transport layer calls on every
//! handshake to get the credential and root CAs to present.

use crate::bundle::TrustBundle;
use crate::cert::{Certificate, PrivateKey};
use crate::observer::{Property, PropertyUpdates};
use crate::prelude::{info, warn};
use crate::spiffe_id::TrustDomain;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Interval between expiry checks when none is configured.
pub const DEFAULT_ROTATOR_INTERVAL: Duration = Duration::from_secs(5);

/// Trust bundles indexed by the trust domain they belong to.
pub type BundleMap = HashMap<TrustDomain, TrustBundle>;

/// The currently valid identity material: an X.509 SVID chain and its key.
#[derive(Debug, Clone)]
pub struct Credential {
    cert_chain: Vec<Certificate>,
    private_key: PrivateKey,
}

impl Credential {
    /// Creates a credential from a chain (leaf first) and the leaf's key.
    pub fn new(cert_chain: Vec<Certificate>, private_key: PrivateKey) -> Self {
        Self {
            cert_chain,
            private_key,
        }
    }

    /// Returns the certificate chain, leaf first.
    pub fn cert_chain(&self) -> &[Certificate] {
        &self.cert_chain
    }

    /// Returns the private key of the leaf certificate.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

/// Configuration for [`new_rotator`].
#[derive(Debug)]
pub struct RotatorConfig {
    /// Trust domain whose bundle provides the root CAs.
    pub trust_domain: TrustDomain,
    /// Initial SVID chain, leaf first.
    pub svid: Vec<Certificate>,
    /// Private key of the initial SVID.
    pub svid_key: PrivateKey,
    /// Bundles kept current by the bundle cache.
    pub bundles: Arc<Property<BundleMap>>,
    /// How long to wait between expiry checks. Zero selects
    /// [`DEFAULT_ROTATOR_INTERVAL`].
    pub interval: Duration,
}

impl RotatorConfig {
    pub(crate) fn normalize(mut self) -> Self {
        if self.interval.is_zero() {
            warn!(
                "Rotator interval must be positive; using {:?}",
                DEFAULT_ROTATOR_INTERVAL
            );
            self.interval = DEFAULT_ROTATOR_INTERVAL;
        }
        self
    }
}

/// Builds the rotator and its paired accessor from `config`.
///
/// The credential property starts out holding the configured SVID and key.
///
/// # Example
///
/// ```
/// use spire_trust::cert::PrivateKey;
/// use spire_trust::observer::Property;
/// use spire_trust::rotator::{new_rotator, RotatorConfig};
/// use spire_trust::TrustDomain;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (rotator, accessor) = new_rotator(RotatorConfig {
///     trust_domain: TrustDomain::new("example.org")?,
///     svid: vec![vec![0x30].into()],
///     svid_key: PrivateKey::from(vec![0x01]),
///     bundles: Arc::new(Property::default()),
///     interval: Duration::ZERO,
/// });
///
/// let current = accessor.keys_and_bundle();
/// assert_eq!(current.credential.cert_chain().len(), 1);
/// assert!(current.root_cas.is_empty());
/// assert_eq!(rotator.interval(), Duration::from_secs(5));
/// # Ok(())
/// # }
/// ```
pub fn new_rotator(config: RotatorConfig) -> (Rotator, CredentialAccessor) {
    let config = config.normalize();

    let state = Arc::new(Property::new(Credential::new(config.svid, config.svid_key)));

    let accessor = CredentialAccessor {
        trust_domain: config.trust_domain,
        state: Arc::clone(&state),
        bundles: config.bundles,
    };

    let rotator = Rotator {
        state,
        interval: config.interval,
    };

    (rotator, accessor)
}

/// Single writer of the current credential.
pub struct Rotator {
    state: Arc<Property<Credential>>,
    interval: Duration,
}

impl fmt::Debug for Rotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rotator")
            .field("interval", &self.interval)
            .field("rotations", &self.state.sequence())
            .finish()
    }
}

impl Rotator {
    /// Publishes a new credential. Handshakes started afterwards present it.
    pub fn rotate(&self, credential: Credential) {
        let chain_len = credential.cert_chain().len();
        self.state.update(credential);
        info!(
            "Published rotated credential: chain_len={chain_len}, rotation={}",
            self.state.sequence()
        );
    }

    /// Returns the credential currently published.
    pub fn state(&self) -> Arc<Credential> {
        self.state.value()
    }

    /// Returns the configured interval between expiry checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns a handle notified on every rotation.
    pub fn observe(&self) -> PropertyUpdates {
        self.state.observe()
    }
}

/// What the transport layer presents on a handshake.
#[derive(Debug, Clone)]
pub struct KeysAndBundle {
    /// Credential snapshot: chain and key always belong together.
    pub credential: Arc<Credential>,
    /// Root CAs of the configured trust domain; empty when its bundle is
    /// unknown.
    pub root_cas: Vec<Certificate>,
}

/// Read side paired with a [`Rotator`].
#[derive(Clone)]
pub struct CredentialAccessor {
    trust_domain: TrustDomain,
    state: Arc<Property<Credential>>,
    bundles: Arc<Property<BundleMap>>,
}

impl fmt::Debug for CredentialAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialAccessor")
            .field("trust_domain", &self.trust_domain)
            .finish()
    }
}

impl CredentialAccessor {
    /// Returns the current credential and the root CAs of the configured
    /// trust domain. Never fails and never blocks.
    pub fn keys_and_bundle(&self) -> KeysAndBundle {
        let credential = self.state.value();
        let bundles = self.bundles.value();

        let root_cas = bundles
            .get(&self.trust_domain)
            .map(|bundle| bundle.root_cas().to_vec())
            .unwrap_or_default();

        KeysAndBundle {
            credential,
            root_cas,
        }
    }

    /// Converts the accessor into the zero-argument callback shape expected
    /// by transport clients.
    pub fn into_fn(self) -> impl Fn() -> KeysAndBundle + Send + Sync + 'static {
        move || self.keys_and_bundle()
    }

    /// Returns the trust domain whose root CAs are served.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn td(name: &str) -> TrustDomain {
        TrustDomain::new(name).unwrap()
    }

    fn credential(tag: u8) -> Credential {
        Credential::new(
            vec![Certificate::from(vec![tag]), Certificate::from(vec![tag, 0xff])],
            PrivateKey::from(vec![tag]),
        )
    }

    fn config(bundles: Arc<Property<BundleMap>>) -> RotatorConfig {
        let initial = credential(1);
        RotatorConfig {
            trust_domain: td("example.org"),
            svid: initial.cert_chain().to_vec(),
            svid_key: initial.private_key().clone(),
            bundles,
            interval: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let mut cfg = config(Arc::new(Property::default()));
        cfg.interval = Duration::ZERO;

        let (rotator, _) = new_rotator(cfg);
        assert_eq!(rotator.interval(), DEFAULT_ROTATOR_INTERVAL);
    }

    #[test]
    fn test_configured_interval_is_kept() {
        let (rotator, _) = new_rotator(config(Arc::new(Property::default())));
        assert_eq!(rotator.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_initial_state_is_configured_svid() {
        let (rotator, accessor) = new_rotator(config(Arc::new(Property::default())));

        assert_eq!(rotator.state().private_key().as_bytes(), &[1]);
        let current = accessor.keys_and_bundle();
        assert_eq!(current.credential.cert_chain()[0].as_bytes(), &[1]);
    }

    #[test]
    fn test_missing_trust_domain_yields_empty_root_cas() {
        let mut map = BundleMap::new();
        map.insert(
            td("other.org"),
            TrustBundle::new(&td("other.org")).with_root_ca(Certificate::from(vec![9])),
        );
        let (_, accessor) = new_rotator(config(Arc::new(Property::new(map))));

        let current = accessor.keys_and_bundle();
        assert!(current.root_cas.is_empty());
        assert_eq!(current.credential.cert_chain().len(), 2);
    }

    #[test]
    fn test_accessor_follows_bundle_updates() {
        let bundles = Arc::new(Property::<BundleMap>::default());
        let (_, accessor) = new_rotator(config(Arc::clone(&bundles)));
        assert!(accessor.keys_and_bundle().root_cas.is_empty());

        let mut map = BundleMap::new();
        map.insert(
            td("example.org"),
            TrustBundle::new(&td("example.org"))
                .with_root_ca(Certificate::from(vec![7]))
                .with_root_ca(Certificate::from(vec![8])),
        );
        bundles.update(map);

        let root_cas = accessor.keys_and_bundle().root_cas;
        assert_eq!(root_cas.len(), 2);
        assert_eq!(root_cas[1].as_bytes(), &[8]);
    }

    #[test]
    fn test_rotate_publishes_whole_credential() {
        let (rotator, accessor) = new_rotator(config(Arc::new(Property::default())));
        let callback = accessor.clone().into_fn();

        rotator.rotate(credential(2));

        let current = callback();
        assert_eq!(current.credential.cert_chain()[0].as_bytes(), &[2]);
        assert_eq!(current.credential.cert_chain()[1].as_bytes(), &[2, 0xff]);
        assert_eq!(current.credential.private_key().as_bytes(), &[2]);
        assert_eq!(rotator.state().private_key().as_bytes(), &[2]);
    }

    #[tokio::test]
    async fn test_observe_reports_rotations() {
        let (rotator, _) = new_rotator(config(Arc::new(Property::default())));
        let mut updates = rotator.observe();

        rotator.rotate(credential(2));
        rotator.rotate(credential(3));

        assert_eq!(updates.wait_for(|&seq| seq == 2).await, Some(2));
        assert_eq!(rotator.state().private_key().as_bytes(), &[3]);
    }
}
