//! Application image references.
//!
//! A [`Reference`] is one of three things: a repository name with a tag, a
//! repository name with a digest, or a bare content [`ImageId`]. Named
//! references are always held in normalized form: the registry defaults to
//! `docker.io`, single-component names on `docker.io` live under `library/`,
//! and an absent tag becomes `latest`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::digest::{Digest, ImageId};
use crate::error::{StoreError, StoreResult};

/// Registry assumed when a name carries none
pub const DEFAULT_DOMAIN: &str = "docker.io";
/// Tag assumed when a name carries neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;
const TAG_LENGTH_MAX: usize = 128;

fn invalid(value: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidReference {
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A normalized repository name: registry domain plus path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryName {
    domain: String,
    path: String,
}

impl RepositoryName {
    /// Parse and normalize a repository name without tag or digest
    pub fn parse_normalized(name: &str) -> StoreResult<Self> {
        if name.is_empty() {
            return Err(invalid(name, "repository name must have at least one component"));
        }
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(invalid(
                name,
                format!("repository name must not be more than {} characters", NAME_TOTAL_LENGTH_MAX),
            ));
        }

        let (domain, path) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            },
            _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
        };

        if !is_valid_domain(&domain) {
            return Err(invalid(name, format!("invalid registry domain '{}'", domain)));
        }
        if path.to_lowercase() != path {
            return Err(invalid(name, "repository name must be lowercase"));
        }
        if path.is_empty() || !path.split('/').all(is_valid_path_component) {
            return Err(invalid(name, "invalid reference format"));
        }

        let domain = if domain == LEGACY_DEFAULT_DOMAIN {
            DEFAULT_DOMAIN.to_string()
        } else {
            domain
        };
        let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
            format!("{}{}", OFFICIAL_REPO_PREFIX, path)
        } else {
            path
        };

        Ok(Self { domain, path })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Short form with the default registry and `library/` stripped
    pub fn familiar(&self) -> String {
        if self.domain != DEFAULT_DOMAIN {
            return self.to_string();
        }
        match self.path.strip_prefix(OFFICIAL_REPO_PREFIX) {
            Some(short) if !short.contains('/') => short.to_string(),
            _ => self.path.clone(),
        }
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)
    }
}

fn is_valid_domain(domain: &str) -> bool {
    let (host, port) = match domain.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    let host_ok = !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        });
    let port_ok = port.map_or(true, |p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    host_ok && port_ok
}

/// `[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*`
fn is_valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if bytes.is_empty() || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        if alnum(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !alnum(bytes[i]) {
            i += 1;
        }
        let separator = &component[start..i];
        let ok = separator == "."
            || separator == "_"
            || separator == "__"
            || separator.bytes().all(|b| b == b'-');
        if !ok {
            return false;
        }
    }
    true
}

fn is_valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= TAG_LENGTH_MAX
        && (bytes[0].is_ascii_alphanumeric() || bytes[0] == b'_')
        && bytes[1..]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
}

/// Repository name plus mutable tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaggedRef {
    name: RepositoryName,
    tag: String,
}

impl TaggedRef {
    pub fn new(name: RepositoryName, tag: impl Into<String>) -> StoreResult<Self> {
        let tag = tag.into();
        if !is_valid_tag(&tag) {
            return Err(invalid(&format!("{}:{}", name, tag), "invalid tag format"));
        }
        Ok(Self { name, tag })
    }

    pub fn name(&self) -> &RepositoryName {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for TaggedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Repository name plus immutable digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DigestedRef {
    name: RepositoryName,
    digest: Digest,
}

impl DigestedRef {
    pub fn new(name: RepositoryName, digest: Digest) -> Self {
        Self { name, digest }
    }

    pub fn name(&self) -> &RepositoryName {
        &self.name
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl fmt::Display for DigestedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.digest)
    }
}

/// Anything that can denote stored content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Reference {
    Tagged(TaggedRef),
    Digested(DigestedRef),
    Id(ImageId),
}

impl Reference {
    /// Parse `repository[:tag][@digest]`, normalizing registry and tag
    ///
    /// When both a tag and a digest are present the digest wins.
    pub fn parse_named(value: &str) -> StoreResult<Self> {
        if value.is_empty() {
            return Err(invalid(value, "repository name must have at least one component"));
        }
        if ImageId::parse(value).is_ok() {
            return Err(invalid(
                value,
                "cannot specify 64-byte hexadecimal strings as a repository name",
            ));
        }

        let (remainder, digest) = match value.split_once('@') {
            Some((remainder, digest)) => (remainder, Some(Digest::parse(digest)?)),
            None => (value, None),
        };
        let (name, tag) = match remainder.rfind(':') {
            Some(pos) if !remainder[pos + 1..].contains('/') => {
                (&remainder[..pos], Some(&remainder[pos + 1..]))
            },
            _ => (remainder, None),
        };

        let name = RepositoryName::parse_normalized(name)?;
        match (digest, tag) {
            (Some(digest), _) => Ok(Reference::Digested(DigestedRef::new(name, digest))),
            (None, Some(tag)) => Ok(Reference::Tagged(TaggedRef::new(name, tag)?)),
            (None, None) => Ok(Reference::Tagged(TaggedRef::new(name, DEFAULT_TAG)?)),
        }
    }

    /// Parse any reference form: a named reference first, then a full ID
    pub fn parse(value: &str) -> StoreResult<Self> {
        match Self::parse_named(value) {
            Ok(reference) => Ok(reference),
            Err(named_err) => ImageId::parse(value).map(Reference::Id).map_err(|_| named_err),
        }
    }

    /// Repository name, absent for bare IDs
    pub fn name(&self) -> Option<&RepositoryName> {
        match self {
            Reference::Tagged(tagged) => Some(tagged.name()),
            Reference::Digested(digested) => Some(digested.name()),
            Reference::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<&ImageId> {
        match self {
            Reference::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        !matches!(self, Reference::Id(_))
    }

    /// Short display form (`my-repo/app:1.0` rather than `docker.io/my-repo/app:1.0`)
    pub fn familiar(&self) -> String {
        match self {
            Reference::Tagged(tagged) => format!("{}:{}", tagged.name().familiar(), tagged.tag()),
            Reference::Digested(digested) => {
                format!("{}@{}", digested.name().familiar(), digested.digest())
            },
            Reference::Id(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tagged(tagged) => tagged.fmt(f),
            Reference::Digested(digested) => digested.fmt(f),
            Reference::Id(id) => id.fmt(f),
        }
    }
}

impl FromStr for Reference {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Reference {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Reference> for String {
    fn from(reference: Reference) -> Self {
        reference.to_string()
    }
}

impl From<ImageId> for Reference {
    fn from(id: ImageId) -> Self {
        Reference::Id(id)
    }
}

impl From<TaggedRef> for Reference {
    fn from(tagged: TaggedRef) -> Self {
        Reference::Tagged(tagged)
    }
}

impl From<DigestedRef> for Reference {
    fn from(digested: DigestedRef) -> Self {
        Reference::Digested(digested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "2957c6606cc94099f7dfe0011b5c8daf4a605ed6124d4eee773bab1e05a8ce87";

    #[test]
    fn test_normalize_short_name() {
        let reference = Reference::parse_named("app").unwrap();
        assert_eq!(reference.to_string(), "docker.io/library/app:latest");
        assert_eq!(reference.familiar(), "app:latest");
    }

    #[test]
    fn test_normalize_namespaced_name() {
        let reference = Reference::parse_named("my-repo/my-bundle:my-tag").unwrap();
        assert_eq!(reference.to_string(), "docker.io/my-repo/my-bundle:my-tag");
        assert_eq!(reference.familiar(), "my-repo/my-bundle:my-tag");
    }

    #[test]
    fn test_library_forms_are_equal() {
        let short = Reference::parse_named("a-bundle:my-tag").unwrap();
        let long = Reference::parse_named("docker.io/library/a-bundle:my-tag").unwrap();
        let legacy = Reference::parse_named("index.docker.io/a-bundle:my-tag").unwrap();
        assert_eq!(short, long);
        assert_eq!(short, legacy);
    }

    #[test]
    fn test_custom_registry_with_port() {
        let reference = Reference::parse_named("localhost:5000/app:1.0").unwrap();
        let name = reference.name().unwrap();
        assert_eq!(name.domain(), "localhost:5000");
        assert_eq!(name.path(), "app");
        assert_eq!(reference.familiar(), "localhost:5000/app:1.0");
    }

    #[test]
    fn test_digested_reference() {
        let reference = Reference::parse_named(&format!("my-repo/my-bundle@sha256:{}", SHA)).unwrap();
        match &reference {
            Reference::Digested(digested) => assert_eq!(digested.digest().encoded(), SHA),
            other => panic!("expected digested reference, got {:?}", other),
        }
        assert_eq!(
            reference.to_string(),
            format!("docker.io/my-repo/my-bundle@sha256:{}", SHA)
        );
    }

    #[test]
    fn test_digest_wins_over_tag() {
        let reference = Reference::parse_named(&format!("app:1.0@sha256:{}", SHA)).unwrap();
        assert!(matches!(reference, Reference::Digested(_)));
    }

    #[test]
    fn test_invalid_names() {
        let invalid = [
            "",
            "My-App",
            "app:",
            "-app",
            "app/",
            "app::tag",
            "app@sha256:abcd",
            SHA,
        ];
        for value in invalid {
            assert!(Reference::parse_named(value).is_err(), "{} should be rejected", value);
        }
    }

    #[test]
    fn test_parse_falls_back_to_id() {
        let reference = Reference::parse(SHA).unwrap();
        assert_eq!(reference.as_id().unwrap().encoded(), SHA);
        assert!(!reference.is_named());
        assert!(reference.name().is_none());
    }

    #[test]
    fn test_path_components() {
        assert!(is_valid_path_component("a-bundle"));
        assert!(is_valid_path_component("a__b"));
        assert!(is_valid_path_component("a---b"));
        assert!(is_valid_path_component("a.b_c"));
        assert!(!is_valid_path_component("a..b"));
        assert!(!is_valid_path_component("a___b"));
        assert!(!is_valid_path_component("a_"));
    }

    #[test]
    fn test_reference_serde_round_trip() {
        let reference = Reference::parse("my-repo/app:1.0").unwrap();
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "\"docker.io/my-repo/app:1.0\"");
        let back: Reference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }
}
