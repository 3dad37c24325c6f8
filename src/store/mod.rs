//! Filesystem-backed content store.
//!
//! One directory per content group under a fixed root:
//! `{root}/{content_group_id}/`. The store owns two invariants:
//!
//! - a request sub-path can never resolve outside its group's directory
//! - readers always see exactly one complete tree per group; `replace`
//!   swaps in a fully-built staging directory via rename, so a reader
//!   never observes a half-extracted tree

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use tempfile::TempDir;
use tokio::fs;

use crate::error::{Error, Result};

/// Fixed index file substituted when a resolved path is a directory.
pub const INDEX_FILE: &str = "index.html";

/// A successfully resolved file inside a content group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Canonicalized absolute path, verified to sit under the group root.
    pub path: PathBuf,

    /// File length in bytes, for the Content-Length header.
    pub len: u64,
}

/// Content store rooted at a fixed directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store over `root`. The directory is created lazily by
    /// [`ContentStore::stage_dir`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a content group, after validating the group id is a
    /// single safe path component.
    pub fn group_dir(&self, content_group_id: &str) -> Result<PathBuf> {
        validate_group_id(content_group_id)?;
        Ok(self.root.join(content_group_id))
    }

    /// Resolve a request sub-path to a regular file inside the group's
    /// directory.
    ///
    /// `relative` arrives decoded exactly once by the router. A second
    /// decode pass here is used only to *reject* double-encoded
    /// traversal, never to reinterpret the path. The final guard is a
    /// component-wise prefix check against the canonicalized group root,
    /// which also prevents `{root}/12` from aliasing `{root}/123`.
    pub async fn resolve(&self, content_group_id: &str, relative: &str) -> Result<ResolvedFile> {
        let group_dir = self.group_dir(content_group_id)?;
        reject_traversal(relative)?;

        let relative = relative.trim_start_matches('/');
        let candidate = group_dir.join(relative);

        let group_real = fs::canonicalize(&group_dir)
            .await
            .map_err(|_| Error::not_found_path(&group_dir))?;
        let mut resolved = fs::canonicalize(&candidate)
            .await
            .map_err(|_| Error::not_found_path(&candidate))?;

        if !resolved.starts_with(&group_real) {
            return Err(Error::TraversalDetected(format!(
                "{} escapes {}",
                relative,
                group_real.display()
            )));
        }

        let mut meta = fs::metadata(&resolved)
            .await
            .map_err(|_| Error::not_found_path(&resolved))?;

        if meta.is_dir() {
            resolved = resolved.join(INDEX_FILE);
            meta = fs::metadata(&resolved)
                .await
                .map_err(|_| Error::not_found_path(&resolved))?;
        }

        if !meta.is_file() {
            return Err(Error::not_found_path(&resolved));
        }

        Ok(ResolvedFile {
            path: resolved,
            len: meta.len(),
        })
    }

    /// Create a fresh staging directory under the store root. Staging on
    /// the same filesystem keeps the final rename in [`ContentStore::replace`]
    /// atomic. The directory is removed on drop unless installed.
    pub async fn stage_dir(&self) -> Result<TempDir> {
        fs::create_dir_all(&self.root).await?;
        let root = self.root.clone();
        let staged = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(".stage-").tempdir_in(root)
        })
        .await
        .map_err(|e| Error::StorageFailure(std::io::Error::other(e)))??;
        Ok(staged)
    }

    /// Install a fully-built staging directory as the group's one
    /// visible tree.
    ///
    /// The previous tree (if any) is renamed aside first, the staged
    /// tree renamed in, and the old tree deleted afterwards. If the
    /// install rename fails the old tree is renamed back, so readers
    /// keep the prior content on any failure.
    pub async fn replace(&self, content_group_id: &str, staged: TempDir) -> Result<PathBuf> {
        let group_dir = self.group_dir(content_group_id)?;
        let staged_path = staged.into_path();

        let old = self
            .root
            .join(format!(".{}.replaced", content_group_id));
        if fs::metadata(&old).await.is_ok() {
            fs::remove_dir_all(&old).await?;
        }

        let had_previous = fs::metadata(&group_dir).await.is_ok();
        if had_previous {
            fs::rename(&group_dir, &old).await?;
        }

        if let Err(e) = fs::rename(&staged_path, &group_dir).await {
            // Put the previous tree back before surfacing the failure.
            if had_previous {
                if let Err(restore) = fs::rename(&old, &group_dir).await {
                    tracing::error!(
                        group = content_group_id,
                        error = %restore,
                        "failed to restore previous content tree"
                    );
                }
            }
            let _ = fs::remove_dir_all(&staged_path).await;
            return Err(Error::StorageFailure(e));
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&old).await {
                tracing::warn!(group = content_group_id, error = %e, "failed to delete replaced tree");
            }
        }

        tracing::info!(group = content_group_id, path = %group_dir.display(), "content tree installed");
        Ok(group_dir)
    }

    /// Recursively delete a group's tree. `remove_dir_all` unlinks
    /// symlinks rather than following them, so a planted link cannot
    /// delete anything outside the root.
    pub async fn remove(&self, content_group_id: &str) -> Result<()> {
        let group_dir = self.group_dir(content_group_id)?;
        match fs::remove_dir_all(&group_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageFailure(e)),
        }
    }
}

/// Group ids come from the commerce system but still must be a single
/// path component: non-empty, no separators, no traversal, not hidden.
fn validate_group_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0'])
    {
        return Err(Error::TraversalDetected(format!(
            "invalid content group id: {:?}",
            id
        )));
    }
    Ok(())
}

/// Reject a request sub-path containing traversal, checking both the
/// literal string and its percent-decoded form.
fn reject_traversal(relative: &str) -> Result<()> {
    if relative.contains('\0') {
        return Err(Error::TraversalDetected("NUL in request path".into()));
    }

    let decoded = percent_decode_str(relative).decode_utf8_lossy();
    for form in [relative, decoded.as_ref()] {
        if form
            .split(['/', '\\'])
            .any(|segment| segment == ".." || segment == "%2e%2e")
        {
            return Err(Error::TraversalDetected(format!(
                "'..' segment in request path: {}",
                relative
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_group(group: &str) -> (ContentStore, tempfile::TempDir) {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let dir = temp.path().join(group).join("html");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join("start.html"), b"<h1>start</h1>")
            .await
            .unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn test_resolve_plain_file() {
        let (store, _temp) = store_with_group("42").await;
        let resolved = store.resolve("42", "html/start.html").await.unwrap();
        assert_eq!(resolved.len, 14);
        assert!(resolved.path.ends_with("42/html/start.html"));
    }

    #[tokio::test]
    async fn test_resolve_rejects_dotdot() {
        let (store, temp) = store_with_group("42").await;
        fs::write(temp.path().join("secret.txt"), b"top secret")
            .await
            .unwrap();

        for path in [
            "../secret.txt",
            "html/../../secret.txt",
            "..%2Fsecret.txt",
            "%2e%2e/secret.txt",
            "%252e%252e/secret.txt",
            "..\\secret.txt",
        ] {
            let err = store.resolve("42", path).await.unwrap_err();
            assert!(
                matches!(err, Error::TraversalDetected(_)),
                "expected traversal rejection for {:?}, got {:?}",
                path,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_symlink_escape_blocked() {
        let (store, temp) = store_with_group("42").await;
        fs::write(temp.path().join("outside.txt"), b"outside")
            .await
            .unwrap();

        #[cfg(unix)]
        {
            tokio::fs::symlink(temp.path().join("outside.txt"), temp.path().join("42/link.txt"))
                .await
                .unwrap();
            let err = store.resolve("42", "link.txt").await.unwrap_err();
            assert!(matches!(err, Error::TraversalDetected(_)));
        }
    }

    #[tokio::test]
    async fn test_group_prefix_aliasing_guard() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());

        // Only the longer-named group exists.
        fs::create_dir_all(temp.path().join("123")).await.unwrap();
        fs::write(temp.path().join("123/a.html"), b"longer group")
            .await
            .unwrap();

        // "12" must never serve "123"'s files.
        let err = store.resolve("12", "a.html").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // And with both present, each group only sees its own tree.
        fs::create_dir_all(temp.path().join("12")).await.unwrap();
        fs::write(temp.path().join("12/a.html"), b"short group")
            .await
            .unwrap();
        let resolved = store.resolve("12", "a.html").await.unwrap();
        assert_eq!(fs::read(&resolved.path).await.unwrap(), b"short group");
    }

    #[tokio::test]
    async fn test_directory_substitutes_index() {
        let (store, temp) = store_with_group("42").await;
        fs::write(temp.path().join("42/html/index.html"), b"<p>index</p>")
            .await
            .unwrap();

        let resolved = store.resolve("42", "html").await.unwrap();
        assert!(resolved.path.ends_with("html/index.html"));

        // Directory without an index file is NotFound, not an error leak.
        fs::create_dir_all(temp.path().join("42/empty")).await.unwrap();
        let err = store.resolve("42", "empty").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let (store, _temp) = store_with_group("42").await;
        let err = store.resolve("42", "nope.html").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_group_ids() {
        let (store, _temp) = store_with_group("42").await;
        for group in ["", "..", "a/b", "a\\b", ".hidden"] {
            let err = store.resolve(group, "x.html").await.unwrap_err();
            assert!(matches!(err, Error::TraversalDetected(_)), "group {:?}", group);
        }
    }

    #[tokio::test]
    async fn test_replace_swaps_tree() {
        let (store, temp) = store_with_group("42").await;

        let staged = store.stage_dir().await.unwrap();
        fs::write(staged.path().join("new.html"), b"new tree")
            .await
            .unwrap();

        let installed = store.replace("42", staged).await.unwrap();
        assert_eq!(installed, temp.path().join("42"));

        // New tree visible, old tree fully gone.
        assert!(store.resolve("42", "new.html").await.is_ok());
        assert!(store.resolve("42", "html/start.html").await.is_err());
        assert!(fs::metadata(temp.path().join(".42.replaced")).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_first_install() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());

        let staged = store.stage_dir().await.unwrap();
        fs::write(staged.path().join("a.html"), b"first").await.unwrap();
        store.replace("7", staged).await.unwrap();

        assert!(store.resolve("7", "a.html").await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (store, temp) = store_with_group("42").await;
        store.remove("42").await.unwrap();
        assert!(fs::metadata(temp.path().join("42")).await.is_err());
        // Second remove of a missing group is fine.
        store.remove("42").await.unwrap();
    }
}
