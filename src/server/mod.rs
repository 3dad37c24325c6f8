//! Axum HTTP service: the request router, admin endpoints, and their
//! wiring.
//!
//! Components are constructed once and injected into [`AppState`];
//! nothing registers itself on shared lifecycle hooks.
//!
//! | Route                              | Handler                      |
//! |------------------------------------|------------------------------|
//! | `GET /courses/{slug}`              | redirect to default route    |
//! | `GET /courses/{slug}/{*path}`      | gated file serving           |
//! | `GET /?course=&course_path=`       | query-string equivalent      |
//! | `GET /my-courses`                  | accessible-course listing    |
//! | `POST /admin/courses`              | create course (admin token)  |
//! | `GET /admin/courses`               | list courses (admin token)   |
//! | `POST /admin/courses/{id}/content` | ZIP upload (admin token)     |
//! | `GET /health`                      | liveness probe               |

pub mod auth;
pub mod error;
pub mod media_type;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::access::{EntitlementOracle, Gate};
use crate::ingest::ArchiveIngestor;
use crate::registry::CourseStore;
use crate::store::ContentStore;

/// Server-level settings, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public base URL used when building redirect targets,
    /// e.g. `https://courses.example.com`.
    pub public_url: String,

    /// Purchase-page URL template with a `{group}` placeholder; denied
    /// requests redirect here when set, else get a plain 403.
    pub purchase_url_template: Option<String>,

    /// Shared bearer token for admin endpoints. Unset disables them.
    pub admin_token: Option<String>,
}

/// Shared application state, cloned per handler invocation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: ContentStore,
    pub courses: CourseStore,
    pub gate: Arc<Gate>,
    pub ingestor: ArchiveIngestor,
}

impl AppState {
    /// Wire the store, registry, and oracle into one state value.
    pub fn new(
        config: ServerConfig,
        store: ContentStore,
        courses: CourseStore,
        oracle: Arc<dyn EntitlementOracle>,
    ) -> Self {
        let ingestor = ArchiveIngestor::new(store.clone(), courses.clone());
        Self {
            config: Arc::new(config),
            store,
            courses,
            gate: Arc::new(Gate::new(oracle)),
            ingestor,
        }
    }
}

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    // The upload route carries whole course archives; the default body
    // limit would cap them at 2 MiB.
    let admin = Router::new()
        .route(
            "/admin/courses",
            post(routes::create_course).get(routes::list_courses),
        )
        .route(
            "/admin/courses/:id/content",
            post(routes::upload_content).layer(DefaultBodyLimit::disable()),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin_token));

    Router::new()
        .route("/", get(routes::course_query))
        .route("/health", get(routes::health))
        .route("/courses/:slug", get(routes::course_root))
        .route("/courses/:slug/", get(routes::course_root))
        .route("/courses/:slug/*path", get(routes::course_file))
        .route("/my-courses", get(routes::my_courses))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(address = %bind, "coursegate listening");

    axum::serve(listener, app(state))
        .await
        .context("Server error")
}
