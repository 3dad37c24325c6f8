//! Command-line interface for coursegate.
//!
//! Provides commands for running the server, managing the course
//! registry, and ingesting content archives from the local filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::access::{EntitlementOracle, HttpOracle, StaticOracle};
use crate::config;
use crate::ingest::{ArchiveIngestor, UploadJob};
use crate::registry::{Course, CourseStore};
use crate::server::{self, AppState, ServerConfig};
use crate::store::ContentStore;

/// coursegate - Purchase-gated static course content server
#[derive(Parser, Debug)]
#[command(name = "coursegate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to (overrides configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Manage the course registry
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },

    /// Extract a local ZIP archive into a course's content group
    Ingest {
        /// Path to the ZIP archive
        archive: PathBuf,

        /// Slug of the course receiving the content
        #[arg(short, long)]
        course: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    /// Register a new course
    Add {
        /// URL slug for the course (lowercase letters, digits, hyphens)
        slug: String,

        /// Content group backing this course (also the purchase key)
        #[arg(short = 'g', long)]
        content_group: Option<String>,

        /// Route served when no sub-path is given
        #[arg(short = 'r', long)]
        default_route: Option<String>,
    },

    /// List registered courses
    List,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { bind } => serve(bind).await,
            Commands::Course { command } => match command {
                CourseCommands::Add {
                    slug,
                    content_group,
                    default_route,
                } => add_course(&slug, content_group, default_route),
                CourseCommands::List => list_courses(),
            },
            Commands::Ingest { archive, course } => ingest_archive(&archive, &course).await,
            Commands::Config => show_config(),
        }
    }
}

/// Open the registry at the configured location, creating it on first
/// use.
fn open_registry() -> Result<CourseStore> {
    let cfg = config::config()?;
    CourseStore::open(cfg.registry_db())
}

/// Start the HTTP server
async fn serve(bind: Option<String>) -> Result<()> {
    let cfg = config::config()?;

    let oracle: Arc<dyn EntitlementOracle> = match cfg.oracle_url.as_deref() {
        Some(url) => Arc::new(HttpOracle::new(url)),
        None => {
            tracing::warn!("no entitlement oracle configured; denying all non-admin access");
            Arc::new(StaticOracle::new())
        }
    };

    let state = AppState::new(
        ServerConfig {
            public_url: cfg.public_url.clone(),
            purchase_url_template: cfg.purchase_url_template.clone(),
            admin_token: cfg.admin_token.clone(),
        },
        ContentStore::new(&cfg.content_root),
        open_registry()?,
        oracle,
    );

    let bind = bind.as_deref().unwrap_or(&cfg.bind);
    server::serve(state, bind).await
}

/// Register a new course
fn add_course(
    slug: &str,
    content_group: Option<String>,
    default_route: Option<String>,
) -> Result<()> {
    let registry = open_registry()?;

    let mut course = Course::new(slug)?;
    course.content_group_id = content_group;
    course.default_route = default_route;

    if registry.find_by_slug(&course.slug)?.is_some() {
        anyhow::bail!("A course with slug '{}' already exists", course.slug);
    }
    registry.insert(&course)?;

    println!("Created course '{}' ({})", course.slug, course.id);
    if course.content_group_id.is_none() {
        println!("Note: no content group set; uploads will be rejected until one is assigned.");
    }

    Ok(())
}

/// List registered courses
fn list_courses() -> Result<()> {
    let registry = open_registry()?;
    let courses = registry.list()?;

    if courses.is_empty() {
        println!("No courses registered. Use 'coursegate course add <slug>' to create one.");
        return Ok(());
    }

    println!("{:<20} {:<12} {:<24} {:<10}", "SLUG", "GROUP", "DEFAULT ROUTE", "CONTENT");
    println!("{}", "-".repeat(70));

    for course in &courses {
        println!(
            "{:<20} {:<12} {:<24} {:<10}",
            course.slug,
            course.content_group_id.as_deref().unwrap_or("-"),
            course.default_route(),
            if course.content_path.is_some() {
                "installed"
            } else {
                "empty"
            }
        );
    }

    println!("\nTotal: {} courses", courses.len());

    Ok(())
}

/// Extract a local archive into a course's content group
async fn ingest_archive(archive: &PathBuf, slug: &str) -> Result<()> {
    let cfg = config::config()?;
    let registry = open_registry()?;

    let course = registry
        .find_by_slug(slug)?
        .with_context(|| format!("No course with slug '{}'", slug))?;

    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", archive.display()))?
        .to_string();

    let ingestor = ArchiveIngestor::new(ContentStore::new(&cfg.content_root), registry);
    let installed = ingestor
        .ingest(UploadJob {
            archive_path: archive.clone(),
            file_name,
            declared_type: None,
            course_id: course.id,
        })
        .await
        .with_context(|| format!("Failed to ingest {}", archive.display()))?;

    println!("Content installed for '{}' at {}", slug, installed.display());

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("coursegate configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (registry state): {}", cfg.home.display());
    println!("  Registry database:     {}", cfg.registry_db().display());
    println!("  Content root:          {}", cfg.content_root.display());
    println!();
    println!("Server:");
    println!("  Bind:                  {}", cfg.bind);
    println!("  Public URL:            {}", cfg.public_url);
    println!(
        "  Purchase URL template: {}",
        cfg.purchase_url_template.as_deref().unwrap_or("(none - denials get 403)")
    );
    println!(
        "  Admin token:           {}",
        if cfg.admin_token.is_some() {
            "(set)"
        } else {
            "(unset - admin endpoints disabled)"
        }
    );
    println!(
        "  Oracle URL:            {}",
        cfg.oracle_url.as_deref().unwrap_or("(none - non-admin access denied)")
    );

    Ok(())
}
