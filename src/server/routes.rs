//! Request handlers: the public read path, course listing, and the
//! administrative course/upload endpoints.
//!
//! Read-path state machine per request:
//! parse → resolve course → (no sub-path: redirect to default route)
//! → check access → resolve file → stream.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::access::Identity;
use crate::error::Error;
use crate::ingest::UploadJob;
use crate::registry::{Course, CourseId};

use super::error::AppError;
use super::{media_type, AppState};

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Query-string form of the read path: `?course={slug}&course_path={p}`.
#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    course: Option<String>,
    course_path: Option<String>,
}

/// `GET /` with course query parameters. Behaves identically to the
/// pretty-URL form.
pub async fn course_query(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<CourseQuery>,
) -> Result<Response, AppError> {
    let slug = query
        .course
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::NotFound("no course in query string".to_string()))?;

    serve_course(&state, &identity, slug, query.course_path.as_deref()).await
}

/// `GET /courses/{slug}` — no sub-path, always a redirect to the
/// course's default route.
pub async fn course_root(
    State(state): State<AppState>,
    identity: Identity,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    serve_course(&state, &identity, &slug, None).await
}

/// `GET /courses/{slug}/{*path}` — gate, resolve, stream.
pub async fn course_file(
    State(state): State<AppState>,
    identity: Identity,
    Path((slug, path)): Path<(String, String)>,
) -> Result<Response, AppError> {
    serve_course(&state, &identity, &slug, Some(&path)).await
}

/// Shared read-path logic for both URL forms.
async fn serve_course(
    state: &AppState,
    identity: &Identity,
    slug: &str,
    sub_path: Option<&str>,
) -> Result<Response, AppError> {
    let course = state
        .courses
        .find_by_slug(slug)?
        .ok_or_else(|| AppError::NotFound(format!("no course for slug: {}", slug)))?;

    // Empty sub-path (e.g. a trailing-slash request) counts as absent.
    let sub_path = sub_path
        .map(|p| p.trim_start_matches('/'))
        .filter(|p| !p.is_empty());

    let Some(relative) = sub_path else {
        let target = join_url(
            &state.config.public_url,
            &["courses", &course.slug, &course.default_route()],
        );
        return found(&target);
    };

    if !state.gate.has_access(&course, identity).await {
        if let (Some(template), Some(group)) = (
            state.config.purchase_url_template.as_deref(),
            course.content_group_id.as_deref(),
        ) {
            return found(&template.replace("{group}", group));
        }
        return Err(AppError::Forbidden(format!(
            "identity denied for course {}",
            course.slug
        )));
    }

    let group = course.content_group_id.as_deref().ok_or_else(|| {
        AppError::NotFound(format!("course {} has no content group", course.slug))
    })?;

    // A traversal attempt on the read path renders as 404; the client
    // learns nothing about detection, the log keeps the detail.
    let resolved = state
        .store
        .resolve(group, relative)
        .await
        .map_err(|e| match e {
            Error::TraversalDetected(detail) => AppError::NotFound(detail),
            other => AppError::from(other),
        })?;

    let file = tokio::fs::File::open(&resolved.path)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    Response::builder()
        .header(CONTENT_TYPE, media_type::from_path(&resolved.path))
        .header(CONTENT_LENGTH, resolved.len)
        .header("x-content-type-options", "nosniff")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(e.into()))
}

/// 302 Found. Deliberately not 301: the default-route mapping may
/// change between uploads.
fn found(location: &str) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Body::empty())
        .map_err(|e| AppError::Internal(e.into()))
}

/// Join URL segments onto a base, collapsing duplicate separators and
/// leaving no trailing slash (course file URLs are extension-style).
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        for part in segment.split('/').filter(|p| !p.is_empty()) {
            url.push('/');
            url.push_str(part);
        }
    }
    url
}

/// One entry in the accessible-course listing.
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub slug: String,
    pub url: String,
}

/// `GET /my-courses` — the courses this identity can access.
pub async fn my_courses(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let mut accessible = Vec::new();
    for course in state.courses.list()? {
        if state.gate.has_access(&course, &identity).await {
            accessible.push(CourseSummary {
                url: join_url(&state.config.public_url, &["courses", &course.slug]),
                slug: course.slug,
            });
        }
    }
    Ok(Json(accessible))
}

/// Admin request to create a course.
#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub slug: String,
    pub content_group_id: Option<String>,
    pub default_route: Option<String>,
}

/// `POST /admin/courses`.
pub async fn create_course(
    State(state): State<AppState>,
    Json(request): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let mut course = Course::new(&request.slug)
        .map_err(|e| AppError::BadRequest(format!("invalid slug: {}", e)))?;
    course.content_group_id = request.content_group_id;
    course.default_route = request.default_route;

    if state.courses.find_by_slug(&course.slug)?.is_some() {
        return Err(AppError::Conflict(format!(
            "slug already exists: {}",
            course.slug
        )));
    }
    state.courses.insert(&course)?;

    tracing::info!(slug = %course.slug, id = %course.id, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

/// `GET /admin/courses` — full registry listing.
pub async fn list_courses(
    State(state): State<AppState>,
) -> Result<Json<Vec<Course>>, AppError> {
    Ok(Json(state.courses.list()?))
}

/// Admin upload acknowledgement.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// `POST /admin/courses/{id}/content` — multipart upload of a course
/// ZIP. The body is spooled to disk chunk-by-chunk (archives can be
/// tens of gigabytes), then extracted off the async runtime.
pub async fn upload_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let course_id = CourseId::parse(&id)
        .map_err(|e| AppError::BadRequest(format!("invalid course id: {}", e)))?;

    let mut job = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("archive") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("archive field has no file name".to_string()))?;
        let declared_type = field.content_type().map(str::to_string);

        let spool = tempfile::Builder::new()
            .prefix("coursegate-upload-")
            .suffix(".zip")
            .tempfile()
            .map_err(|e| AppError::Internal(e.into()))?;
        let spool_path = spool.path().to_path_buf();

        let mut out = tokio::fs::File::create(&spool_path)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("upload interrupted: {}", e)))?
        {
            out.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(e.into()))?;
        }
        out.flush().await.map_err(|e| AppError::Internal(e.into()))?;

        job = Some((
            spool,
            UploadJob {
                archive_path: spool_path,
                file_name,
                declared_type,
                course_id,
            },
        ));
        break;
    }

    let Some((_spool, job)) = job else {
        return Err(AppError::BadRequest(
            "no 'archive' file field in upload".to_string(),
        ));
    };

    state.ingestor.ingest(job).await?;
    Ok(Json(UploadResponse {
        status: "ok",
        message: "Course content extracted successfully.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_collapses_separators() {
        assert_eq!(
            join_url("https://example.com/", &["courses", "sample", "/html/start.html"]),
            "https://example.com/courses/sample/html/start.html"
        );
        assert_eq!(
            join_url("https://example.com", &["courses//", "/sample/"]),
            "https://example.com/courses/sample"
        );
    }

    #[test]
    fn test_join_url_no_trailing_slash() {
        let url = join_url("https://example.com/", &["courses", "sample", "docs/"]);
        assert!(!url.ends_with('/'));
    }
}
