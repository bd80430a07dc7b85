//! SPIFFE ID and trust domain types.
//!
//! Trust domain names are kept in canonical form: ASCII letters are lowercased
//! at parse time, so `Example.ORG`, `example.org` and `spiffe://example.org/x`
//! all yield the same [`TrustDomain`]. Equality and ordering are defined on the
//! canonical name only.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

const SPIFFE_SCHEME: &str = "spiffe";
const SCHEME_SEPARATOR: &str = "://";

const VALID_TRUST_DOMAIN_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-._";
const VALID_PATH_SEGMENT_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._";

/// A [SPIFFE ID](https://github.com/spiffe/spiffe/blob/main/standards/SPIFFE-ID.md#2-spiffe-identity),
/// e.g. the identity a registration entry is issued for.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: String,
}

/// The administrative realm a bundle or identity belongs to.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TrustDomain {
    name: String,
}

/// An error that can arise parsing a SPIFFE ID or a trust domain.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum SpiffeIdError {
    /// An empty string cannot be parsed as a SPIFFE ID.
    #[error("cannot be empty")]
    Empty,

    /// The trust domain name cannot be empty.
    #[error("trust domain is missing")]
    MissingTrustDomain,

    /// A SPIFFE ID must use the `spiffe` scheme.
    #[error("scheme is missing or invalid")]
    WrongScheme,

    /// A trust domain name can only contain chars in a limited char set.
    #[error(
        "trust domain characters are limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadTrustDomainChar,

    /// A path segment can only contain chars in a limited char set.
    #[error(
        "path segment characters are limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadPathSegmentChar,

    /// Path cannot contain empty segments, e.g '//'
    #[error("path cannot contain empty segments")]
    EmptySegment,

    /// Path cannot contain dot segments, e.g '/.', '/..'
    #[error("path cannot contain dot segments")]
    DotSegment,

    /// Path cannot have a trailing slash.
    #[error("path cannot have a trailing slash")]
    TrailingSlash,
}

impl SpiffeId {
    /// Parses a SPIFFE ID such as `spiffe://example.org/workload`.
    ///
    /// The scheme is matched case-insensitively and the trust domain is
    /// canonicalized; the path is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] if `id` is not a valid SPIFFE ID.
    ///
    /// # Examples
    ///
    /// ```
    /// use spire_trust::spiffe_id::SpiffeId;
    ///
    /// let id = SpiffeId::new("spiffe://Example.org/api").unwrap();
    /// assert_eq!("example.org", id.trust_domain().to_string());
    /// assert_eq!("/api", id.path());
    /// ```
    pub fn new(id: &str) -> Result<Self, SpiffeIdError> {
        if id.is_empty() {
            return Err(SpiffeIdError::Empty);
        }

        let rest = strip_scheme(id).ok_or(SpiffeIdError::WrongScheme)?;
        let i = rest.find('/').unwrap_or(rest.len());
        if i == 0 {
            return Err(SpiffeIdError::MissingTrustDomain);
        }

        let trust_domain = TrustDomain::from_name(&rest[..i])?;

        let path = &rest[i..];
        if !path.is_empty() {
            validate_path(path)?;
        }

        Ok(SpiffeId {
            trust_domain,
            path: path.to_string(),
        })
    }

    /// Returns the trust domain of the SPIFFE ID.
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Returns the path of the SPIFFE ID.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if this SPIFFE ID belongs to the given trust domain.
    pub fn is_member_of(&self, trust_domain: &TrustDomain) -> bool {
        &self.trust_domain == trust_domain
    }
}

impl Display for SpiffeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.trust_domain.id_string(), self.path)
    }
}

impl FromStr for SpiffeId {
    type Err = SpiffeIdError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        Self::new(id)
    }
}

impl TryFrom<&str> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for SpiffeId {
    type Error = SpiffeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl TrustDomain {
    /// Parses a trust domain from either a bare name (`example.org`) or a
    /// SPIFFE ID (`spiffe://example.org/path`), whose trust domain is taken.
    ///
    /// # Errors
    ///
    /// Returns a [`SpiffeIdError`] if the input is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use spire_trust::spiffe_id::TrustDomain;
    ///
    /// let td = TrustDomain::new("spiffe://Domain.Test/workload").unwrap();
    /// assert_eq!("domain.test", td.to_string());
    /// assert_eq!("spiffe://domain.test", td.id_string());
    /// assert_eq!(td, TrustDomain::new("domain.test").unwrap());
    /// ```
    pub fn new(id_or_name: &str) -> Result<Self, SpiffeIdError> {
        if id_or_name.is_empty() {
            return Err(SpiffeIdError::MissingTrustDomain);
        }

        if id_or_name.contains(":/") {
            return Ok(SpiffeId::new(id_or_name)?.trust_domain);
        }

        Self::from_name(id_or_name)
    }

    fn from_name(name: &str) -> Result<Self, SpiffeIdError> {
        let name = name.to_ascii_lowercase();
        if !name.chars().all(is_valid_trust_domain_char) {
            return Err(SpiffeIdError::BadTrustDomainChar);
        }
        Ok(TrustDomain { name })
    }

    /// Returns the canonical name, e.g. `example.org`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the SPIFFE ID of the trust domain, e.g. `spiffe://example.org`.
    ///
    /// This is the key bundles are stored under.
    pub fn id_string(&self) -> String {
        format!("{SPIFFE_SCHEME}{SCHEME_SEPARATOR}{}", self.name)
    }
}

impl Display for TrustDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for TrustDomain {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl FromStr for TrustDomain {
    type Err = SpiffeIdError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        TrustDomain::new(name)
    }
}

impl TryFrom<&str> for TrustDomain {
    type Error = SpiffeIdError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<String> for TrustDomain {
    type Error = SpiffeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

fn strip_scheme(id: &str) -> Option<&str> {
    let (scheme, rest) = id.split_once(SCHEME_SEPARATOR)?;
    scheme.eq_ignore_ascii_case(SPIFFE_SCHEME).then_some(rest)
}

/// Validates that a path string is a conformant SPIFFE ID path.
///
/// # Errors
///
/// Returns the [`SpiffeIdError`] describing the first violation found.
pub fn validate_path(path: &str) -> Result<(), SpiffeIdError> {
    if path.is_empty() {
        return Err(SpiffeIdError::Empty);
    }

    let mut segment_start = 0;
    for (idx, c) in path.char_indices() {
        if c == '/' {
            check_segment(&path[segment_start..idx], SpiffeIdError::EmptySegment)?;
            segment_start = idx;
            continue;
        }

        if !VALID_PATH_SEGMENT_CHARS.contains(c) {
            return Err(SpiffeIdError::BadPathSegmentChar);
        }
    }

    check_segment(&path[segment_start..], SpiffeIdError::TrailingSlash)
}

fn check_segment(segment: &str, empty: SpiffeIdError) -> Result<(), SpiffeIdError> {
    match segment {
        "/" => Err(empty),
        "/." | "/.." => Err(SpiffeIdError::DotSegment),
        _ => Ok(()),
    }
}

fn is_valid_trust_domain_char(c: char) -> bool {
    VALID_TRUST_DOMAIN_CHARS.contains(c)
}
