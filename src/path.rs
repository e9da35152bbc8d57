//! Maps a request URI onto a filesystem path inside the document root,
//! rejecting anything that canonicalizes to somewhere else.
//!
//! Canonicalization (resolving every `..` and symlink) happens *before* the
//! prefix check, so a symlink that points outside the root, or a `..`
//! sequence that walks out and back in, is caught the same way: the
//! resolved absolute path simply does not start with the canonicalized
//! root.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::arena::Arena;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    Forbidden,
    NotFound,
    Internal,
}

/// Resolves `uri` (raw bytes off the wire, not a validated string — see
/// `http.rs`'s doc comment on `HttpRequest::uri`) to an absolute path inside
/// `doc_root`, copying the result into `arena`. `doc_root` must already be
/// canonicalized (done once at startup in
/// [`crate::config::ServerSettings::new`]).
///
/// Built on `OsStr`/`OsStrExt` rather than `str` throughout, so a URI byte
/// that isn't valid UTF-8 is neither rejected nor mangled: it is joined to
/// the document root, canonicalized, and sandbox-checked exactly like any
/// other byte, matching a Linux filesystem's own notion of a "valid"
/// filename (none, beyond excluding `NUL` and `/`).
pub fn resolve<'a>(uri: &[u8], doc_root: &Path, arena: &'a Arena) -> Result<&'a Path, ResolveError> {
    let relative = relative_os_str(uri);
    let candidate = doc_root.join(relative);

    let canonical = std::fs::canonicalize(&candidate).map_err(|err| match err.kind() {
        std::io::ErrorKind::PermissionDenied => ResolveError::Forbidden,
        std::io::ErrorKind::NotFound => ResolveError::NotFound,
        _ if is_not_a_directory(&err) => ResolveError::NotFound,
        _ => ResolveError::Internal,
    })?;

    if !is_inside(&canonical, doc_root) {
        return Err(ResolveError::Forbidden);
    }

    let canonical_bytes = canonical.as_os_str().as_bytes();
    let copied = arena.alloc_bytes(canonical_bytes);
    Ok(Path::new(OsStr::from_bytes(copied)))
}

/// `""` and `"/"` (by raw bytes, not string equality) serve `index.html`;
/// everything else has its leading `/`s stripped and is used verbatim.
fn relative_os_str(uri: &[u8]) -> &OsStr {
    if uri.is_empty() || uri == b"/" {
        OsStr::new("index.html")
    } else {
        let trimmed = {
            let mut rest = uri;
            while let [b'/', tail @ ..] = rest {
                rest = tail;
            }
            rest
        };
        OsStr::from_bytes(trimmed)
    }
}

#[cfg(target_os = "linux")]
fn is_not_a_directory(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(not(target_os = "linux"))]
fn is_not_a_directory(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTDIR)
}

/// Byte-level directory-boundary comparison: `root` must be a prefix of
/// `candidate` AND the next byte after the prefix must be a path separator
/// or end-of-string, so `/srv/www` does not accidentally match
/// `/srv/wwwdata`.
fn is_inside(candidate: &Path, root: &Path) -> bool {
    let candidate = candidate.as_os_str().as_encoded_bytes();
    let root = root.as_os_str().as_encoded_bytes();

    if !candidate.starts_with(root) {
        return false;
    }
    match candidate.get(root.len()) {
        None => true,
        Some(&b) => b == std::path::MAIN_SEPARATOR as u8,
    }
}

/// Composes `doc_root + "/" + uri` without touching the filesystem, purely
/// for diagnostics (logging a rejected request without resolving it twice).
pub fn compose(uri: &[u8], doc_root: &Path) -> PathBuf {
    doc_root.join(relative_os_str(uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::write(root.join("index.html"), "hello\n").unwrap();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("a/b.txt"), "x").unwrap();
        (dir, root)
    }

    #[test]
    fn root_serves_index() {
        let (_dir, root) = setup();
        let arena = Arena::new();
        let resolved = resolve(b"/", &root, &arena).unwrap();
        assert_eq!(resolved, root.join("index.html"));
    }

    #[test]
    fn empty_uri_serves_index() {
        let (_dir, root) = setup();
        let arena = Arena::new();
        let resolved = resolve(b"", &root, &arena).unwrap();
        assert_eq!(resolved, root.join("index.html"));
    }

    #[test]
    fn nested_file_resolves() {
        let (_dir, root) = setup();
        let arena = Arena::new();
        let resolved = resolve(b"/a/b.txt", &root, &arena).unwrap();
        assert_eq!(resolved, root.join("a/b.txt"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, root) = setup();
        let arena = Arena::new();
        assert_eq!(
            resolve(b"/missing.txt", &root, &arena).unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[test]
    fn dot_dot_traversal_is_forbidden() {
        let (_dir, root) = setup();
        let arena = Arena::new();
        assert_eq!(
            resolve(b"/../etc/passwd", &root, &arena).unwrap_err(),
            ResolveError::Forbidden
        );
    }

    #[test]
    fn symlink_escape_is_forbidden() {
        let (_dir, root) = setup();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink("/etc/passwd", root.join("escape")).unwrap();
            let arena = Arena::new();
            assert_eq!(
                resolve(b"/escape", &root, &arena).unwrap_err(),
                ResolveError::Forbidden
            );
        }
    }

    #[test]
    fn non_utf8_uri_resolves_to_the_matching_file() {
        let (_dir, root) = setup();
        #[cfg(unix)]
        {
            use std::ffi::OsStr;
            use std::os::unix::ffi::OsStrExt;
            let name = OsStr::from_bytes(b"a\xffb");
            fs::write(root.join(name), "raw bytes, no utf-8 required").unwrap();

            let arena = Arena::new();
            let mut uri = b"/".to_vec();
            uri.extend_from_slice(b"a\xffb");
            let resolved = resolve(&uri, &root, &arena).unwrap();
            assert_eq!(resolved, root.join(name));
        }
    }

    #[test]
    fn sibling_directory_sharing_a_prefix_is_forbidden() {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap().join("www");
        fs::create_dir(&root).unwrap();
        let sibling = root.with_file_name("wwwdata");
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("secret.txt"), "nope").unwrap();

        // A naive byte-prefix check without the separator guard would let
        // `root`'s canonicalized path match `wwwdata` as a false "inside".
        let arena = Arena::new();
        let candidate = sibling.join("secret.txt");
        assert!(!is_inside(&candidate, &root));
    }
}
