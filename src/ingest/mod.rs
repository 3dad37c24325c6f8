//! ZIP validation and extraction into the content store.
//!
//! Ingestion is all-or-nothing from the store's point of view: entries
//! are extracted into a staging directory created by the store, and
//! only a fully-extracted tree is swapped into place. A failure at any
//! point leaves the previously served tree untouched, and a retry
//! simply starts over.
//!
//! Extraction streams entry-by-entry (`std::io::copy` from the zip
//! reader into the target file), so multi-gigabyte archives never pass
//! through memory. The blocking work runs on the tokio blocking pool.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::registry::{CourseId, CourseStore};
use crate::store::ContentStore;

/// Declared content types accepted for uploads. Advisory only; the real
/// security boundary is entry validation during extraction.
pub const ALLOWED_ARCHIVE_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "multipart/x-zip",
    "application/octet-stream",
];

/// One upload, spooled to disk by the caller. Exists only for the
/// duration of ingestion.
#[derive(Debug)]
pub struct UploadJob {
    /// Spooled archive on local disk.
    pub archive_path: PathBuf,

    /// Client-supplied file name, used for the extension check.
    pub file_name: String,

    /// Client-declared content type, if any.
    pub declared_type: Option<String>,

    /// The course receiving this content.
    pub course_id: CourseId,
}

/// Validates uploads and populates content-store groups from them.
#[derive(Clone)]
pub struct ArchiveIngestor {
    store: ContentStore,
    courses: CourseStore,
}

impl ArchiveIngestor {
    /// Wire the ingestor to its store and registry.
    pub fn new(store: ContentStore, courses: CourseStore) -> Self {
        Self { store, courses }
    }

    /// Run one ingestion job to completion. Returns the installed tree
    /// path on success; on any failure the group's existing content,
    /// if any, is unchanged.
    pub async fn ingest(&self, job: UploadJob) -> Result<PathBuf> {
        validate_upload(&job)?;

        let course = self
            .courses
            .find_by_id(job.course_id)
            .map_err(other_storage)?
            .ok_or_else(|| Error::NotFound(format!("course {}", job.course_id)))?;
        let group = course
            .content_group_id
            .clone()
            .ok_or_else(|| Error::MisconfiguredCourse(course.slug.clone()))?;

        let staged = self.store.stage_dir().await?;

        // Extraction is blocking file I/O; keep it off the async runtime.
        let archive_path = job.archive_path.clone();
        let staged = tokio::task::spawn_blocking(move || -> Result<TempDir> {
            extract_archive(&archive_path, staged.path())?;
            Ok(staged)
        })
        .await
        .map_err(|e| Error::StorageFailure(io::Error::other(e)))??;

        let installed = self.store.replace(&group, staged).await?;
        self.courses
            .set_content_path(course.id, &installed)
            .map_err(other_storage)?;

        tracing::info!(
            course = %course.slug,
            group = %group,
            path = %installed.display(),
            "course content ingested"
        );
        Ok(installed)
    }
}

fn other_storage(e: anyhow::Error) -> Error {
    Error::StorageFailure(io::Error::other(e))
}

/// Extension and declared-type checks, per the upload contract.
fn validate_upload(job: &UploadJob) -> Result<()> {
    let ext = Path::new(&job.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if ext.as_deref() != Some("zip") {
        return Err(Error::InvalidArchive(format!(
            "expected a .zip file, got {:?}",
            job.file_name
        )));
    }

    if let Some(declared) = &job.declared_type {
        let base = declared.split(';').next().unwrap_or(declared).trim();
        if !ALLOWED_ARCHIVE_TYPES.contains(&base) {
            return Err(Error::InvalidArchive(format!(
                "declared content type {:?} is not a known archive type",
                declared
            )));
        }
    }

    Ok(())
}

/// Open, scan, and extract the archive into `target`. Every entry name
/// is validated before anything is written.
fn extract_archive(archive_path: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| Error::ArchiveOpenFailure(format!("{}: {}", archive_path.display(), e)))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::ArchiveOpenFailure(e.to_string()))?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    for name in &names {
        validate_entry_name(name)?;
    }
    let root = common_root(&names);

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::ArchiveOpenFailure(e.to_string()))?;
        let name = entry.name().to_string();

        let relative = match &root {
            Some(root) => match name.strip_prefix(&format!("{}/", root)) {
                Some(rest) if !rest.is_empty() => rest.to_string(),
                // The shared top-level directory itself.
                _ => continue,
            },
            None => name,
        };

        let dest = join_validated(target, &relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Reject any entry name that would normalize outside the extraction
/// root: `..` segments, absolute paths, drive-letter prefixes, NULs.
/// Backslashes count as separators to cover Windows-authored archives.
fn validate_entry_name(name: &str) -> Result<()> {
    if name.contains('\0') {
        return Err(Error::TraversalDetected("NUL in archive entry name".into()));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(Error::TraversalDetected(format!(
            "absolute archive entry: {}",
            name
        )));
    }

    let mut components = name.split(['/', '\\']);
    if let Some(first) = components.clone().next() {
        let bytes = first.as_bytes();
        if bytes.len() == 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            return Err(Error::TraversalDetected(format!(
                "drive-prefixed archive entry: {}",
                name
            )));
        }
    }
    if components.any(|c| c == "..") {
        return Err(Error::TraversalDetected(format!(
            "'..' in archive entry: {}",
            name
        )));
    }

    Ok(())
}

/// If every entry lives under exactly one top-level directory, return
/// that directory so extraction can strip it. Any top-level file (an
/// entry with no separator) means no stripping.
fn common_root(names: &[String]) -> Option<String> {
    let mut root: Option<&str> = None;
    for name in names {
        let (first, _) = name.split_once('/')?;
        if first.is_empty() {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return None,
        }
    }
    root.map(str::to_string)
}

/// Join an already-validated relative entry path onto the target,
/// component by component, skipping empty and `.` segments.
fn join_validated(target: &Path, relative: &str) -> PathBuf {
    let mut dest = target.to_path_buf();
    for component in relative.split(['/', '\\']) {
        if component.is_empty() || component == "." {
            continue;
        }
        dest.push(component);
    }
    dest
}
