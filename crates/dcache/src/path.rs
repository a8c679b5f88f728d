//! Hierarchical bucket names.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The reserved top-level segment for self-signed, per-identity buckets.
pub const PRIVATE_PREFIX: &str = "pri";

/// A path through the bucket tree, e.g. `admin/trusted`.
///
/// Serialized as a list of segments. Deserialization also accepts a single
/// `/`-separated string.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BucketPath(Vec<String>);

impl BucketPath {
    /// The root bucket
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path. Empty segments are skipped.
    pub fn parse(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// The path segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Iterate the segments
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Is this the root path?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new path with `segment` appended
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.0.push(segment.into());
        out
    }

    /// Is `prefix` an ancestor of (or equal to) this path?
    pub fn starts_with(&self, prefix: &BucketPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Does this path live under the private namespace?
    pub fn is_private(&self) -> bool {
        self.0.first().map(String::as_str) == Some(PRIVATE_PREFIX)
    }

    /// For a private path, the identity that must have signed claims in it.
    ///
    /// `None` if the path is not private. `Some(None)` for the bare private
    /// prefix, which no identity owns.
    pub fn private_owner(&self) -> Option<Option<&str>> {
        if self.is_private() {
            Some(self.0.get(1).map(String::as_str))
        } else {
            None
        }
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl fmt::Debug for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketPath({})", self)
    }
}

impl From<&str> for BucketPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<Vec<String>> for BucketPath {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for BucketPath {
    fn from(a: [S; N]) -> Self {
        Self(a.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a BucketPath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PathRepr {
    List(Vec<String>),
    Joined(String),
}

impl<'de> Deserialize<'de> for BucketPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PathRepr::deserialize(deserializer)? {
            PathRepr::List(v) => Self(v),
            PathRepr::Joined(s) => Self::parse(&s),
        })
    }
}
