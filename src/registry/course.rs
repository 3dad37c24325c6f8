//! The course record and its routing helpers.

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relative file served when a course URL carries no sub-path and the
/// course has no configured route.
pub const DEFAULT_ROUTE: &str = "html/start.html";

/// Course identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseId(Uuid);

impl CourseId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CourseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A purchasable course whose static content is served from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Stable identifier.
    pub id: CourseId,

    /// Public URL slug; unique and immutable once published.
    pub slug: String,

    /// Opaque commerce-product id shared with the entitlement oracle.
    /// Doubles as the content-group id in the store. Absent until an
    /// administrator links a product.
    pub content_group_id: Option<String>,

    /// Relative entry file, served via redirect when the course URL has
    /// no sub-path. Falls back to [`DEFAULT_ROUTE`] when unset.
    pub default_route: Option<String>,

    /// Extracted tree location; set only by the archive ingestor after a
    /// successful upload, cleared when content is removed.
    pub content_path: Option<PathBuf>,

    /// When the course was created.
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Create a course with a validated slug.
    pub fn new(slug: impl Into<String>) -> Result<Self> {
        let slug = slug.into();
        validate_slug(&slug)?;

        Ok(Self {
            id: CourseId::new(),
            slug,
            content_group_id: None,
            default_route: None,
            content_path: None,
            created_at: Utc::now(),
        })
    }

    /// Set the commerce product / content group.
    pub fn with_content_group(mut self, group: impl Into<String>) -> Self {
        self.content_group_id = Some(group.into());
        self
    }

    /// Set a custom entry route.
    pub fn with_default_route(mut self, route: impl Into<String>) -> Self {
        self.default_route = Some(route.into());
        self
    }

    /// The course's entry route, normalized for interpolation: no
    /// leading slash (safe to hand to the content store) and no trailing
    /// slash (safe to append to a redirect URL).
    pub fn default_route(&self) -> String {
        let route = self
            .default_route
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROUTE);

        route.trim_matches('/').to_string()
    }
}

/// Slugs must be URL-safe and stable: lowercase alphanumeric and
/// hyphens, no leading/trailing hyphen.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        bail!("Course slug must not be empty");
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        bail!("Course slug must not start or end with '-': {}", slug);
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "Course slug must be lowercase alphanumeric with hyphens: {}",
            slug
        );
    }
    Ok(())
}
