//! Normalized absolute paths
//!
//! Every node in the tree is addressed by a [`PathKey`]: an absolute,
//! slash-separated path with no trailing slash (except root) and no empty
//! segments. Host callers may pass relative paths (`"hello.txt"`), which are
//! anchored at the root.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};

/// Longest single path segment accepted, in bytes
pub const MAX_NAME_LEN: usize = 255;

/// A normalized, absolute path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathKey(String);

impl PathKey {
    /// The root path, `/`
    pub fn root() -> Self {
        PathKey("/".to_string())
    }

    /// Normalize a path to a consistent format
    ///
    /// Leading slash is added, repeated and trailing slashes are dropped.
    /// `.` and `..` segments are rejected instead of being resolved.
    /// Whitespace is part of a name and is kept as is.
    pub fn parse(path: &str) -> Result<Self> {
        let mut normalized = String::with_capacity(path.len() + 1);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            validate_name(segment)
                .map_err(|_| invalid_for(segment, path))?;
            normalized.push('/');
            normalized.push_str(segment);
        }

        if normalized.is_empty() {
            normalized.push('/');
        }

        Ok(PathKey(normalized))
    }

    /// Wrap a string already known to be normalized
    pub(crate) fn from_normalized(path: String) -> Self {
        debug_assert!(path.starts_with('/'));
        PathKey(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the parent path, root is its own parent
    pub fn parent(&self) -> PathKey {
        match self.0.rfind('/') {
            Some(0) | None => PathKey::root(),
            Some(pos) => PathKey(self.0[..pos].to_string()),
        }
    }

    /// Get the last segment, empty for root
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// Append a single validated segment
    pub fn join(&self, name: &str) -> Result<PathKey> {
        validate_name(name)?;
        if self.is_root() {
            Ok(PathKey(format!("/{}", name)))
        } else {
            Ok(PathKey(format!("{}/{}", self.0, name)))
        }
    }

    /// Path segments from the root down, empty for root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

/// Check a single path segment
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(FsError::InvalidPath(name.to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

fn invalid_for(segment: &str, path: &str) -> FsError {
    if segment.len() > MAX_NAME_LEN {
        FsError::NameTooLong(path.to_string())
    } else {
        FsError::InvalidPath(path.to_string())
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<PathKey> for String {
    fn from(path: PathKey) -> Self {
        path.0
    }
}

impl TryFrom<String> for PathKey {
    type Error = FsError;

    fn try_from(value: String) -> Result<Self> {
        PathKey::parse(&value)
    }
}

impl TryFrom<&str> for PathKey {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self> {
        PathKey::parse(value)
    }
}

impl std::str::FromStr for PathKey {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        PathKey::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> PathKey {
        PathKey::parse(path).unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(key("").as_str(), "/");
        assert_eq!(key("/").as_str(), "/");
        assert_eq!(key("foo").as_str(), "/foo");
        assert_eq!(key("/foo").as_str(), "/foo");
        assert_eq!(key("/foo/").as_str(), "/foo");
        assert_eq!(key("/foo/bar").as_str(), "/foo/bar");
        assert_eq!(key("//foo///bar//").as_str(), "/foo/bar");
    }

    #[test]
    fn test_rejects_dot_segments() {
        assert!(matches!(
            PathKey::parse("/foo/../bar"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(PathKey::parse("./foo"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_name_too_long() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            PathKey::parse(&format!("/dir/{}", long)),
            Err(FsError::NameTooLong(_))
        ));
        assert!(PathKey::parse(&"y".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(key("/").parent(), key("/"));
        assert_eq!(key("/foo").parent(), key("/"));
        assert_eq!(key("/foo/bar").parent(), key("/foo"));
        assert_eq!(key("/foo/bar/baz").parent(), key("/foo/bar"));
    }

    #[test]
    fn test_filename() {
        assert_eq!(key("/").name(), "");
        assert_eq!(key("/foo").name(), "foo");
        assert_eq!(key("/foo/bar").name(), "bar");
        assert_eq!(key("/foo/bar.txt").name(), "bar.txt");
    }

    #[test]
    fn test_join_and_segments() {
        let dir = key("/a").join("b").unwrap();
        assert_eq!(dir.as_str(), "/a/b");
        assert_eq!(key("/").join("c").unwrap().as_str(), "/c");
        assert!(key("/a").join("x/y").is_err());
        assert_eq!(dir.segments().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(key("/").segments().count(), 0);
    }

    #[test]
    fn test_whitespace_is_part_of_the_name() {
        assert_eq!(key("/a ").as_str(), "/a ");
        assert_eq!(key(" x").as_str(), "/ x");
        assert_eq!(key("/ dir / f ").as_str(), "/ dir / f ");
        assert_eq!(key("/a ").name(), "a ");
        assert_ne!(key("/a "), key("/a"));
        assert_ne!(key(" x"), key("x"));

        let joined = key("/").join("a ").unwrap();
        assert_eq!(PathKey::parse(joined.as_str()).unwrap(), joined);
    }

    #[test]
    fn test_case_sensitive() {
        assert_ne!(key("/Foo"), key("/foo"));
    }
}
