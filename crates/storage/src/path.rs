//! Key validation.
//!
//! Blob keys are relative paths below a backend's root. Every backend
//! validates keys before touching storage so that a crafted package name or
//! tarball filename cannot escape the root.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validate and normalise a storage key.
///
/// `.` components and repeated or trailing separators are dropped, and `..`
/// is resolved as long as it never climbs above the root. NUL bytes, absolute
/// prefixes and keys that normalise to nothing are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// ```
/// use std::path::Path;
/// use regmirror_storage::validate_path;
///
/// assert_eq!(validate_path("left-pad/-/left-pad-1.0.0.tgz").unwrap(), Path::new("left-pad/-/left-pad-1.0.0.tgz"));
/// assert_eq!(validate_path("@scope/pkg/-/./pkg-1.0.0.tgz").unwrap(), Path::new("@scope/pkg/-/pkg-1.0.0.tgz"));
/// assert!(validate_path("../../etc/passwd").is_err());
/// assert!(validate_path("pkg\0.tgz").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(segment) => {
                // Survives `Path::components()` on Unix, truncates in syscalls.
                if segment.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(segment);
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

/// Render a validated key with `/` separators, for use in URLs.
pub fn to_key(path: impl AsRef<Path>) -> Result<String> {
    let validated = validate(path.as_ref())?;
    let segments = validated
        .components()
        .map(|component| component.as_os_str().to_str().ok_or_else(|| ErrorKind::InvalidPath(validated.clone())))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tarball_keys() {
        assert_eq!(validate("a/-/a-1.0.0.tgz").unwrap(), Path::new("a/-/a-1.0.0.tgz"));
        assert_eq!(validate("@types/node/-/node-20.0.0.tgz").unwrap(), Path::new("@types/node/-/node-20.0.0.tgz"));
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(validate("/a//-/./a.tgz/").unwrap(), Path::new("a/-/a.tgz"));
        assert_eq!(validate("a/b/../-/a.tgz").unwrap(), Path::new("a/-/a.tgz"));
    }

    #[test]
    fn test_traversal_is_rejected() {
        assert!(validate("../a.tgz").is_err());
        assert!(validate("a/../../a.tgz").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_empty_and_nul() {
        assert!(validate("").is_err());
        assert!(validate("./").is_err());
        assert!(validate("//").is_err());
        let err = validate("a\0.tgz").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_to_key() {
        assert_eq!(to_key("@scope/pkg//-/pkg-1.0.0.tgz").unwrap(), "@scope/pkg/-/pkg-1.0.0.tgz");
        assert!(to_key("../x").is_err());
    }
}
