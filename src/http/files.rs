//! Static file collaborator.
//!
//! # Responsibilities
//! - Serve files below the document root for URIs without a registered page
//! - Enforce digest auth: global credentials file, else per-directory file
//! - Never serve the per-directory credentials file itself
//! - Directory listings (or 403 when disabled)
//!
//! # Design Decisions
//! - Runs on the transport runtime; file I/O never touches the reactor thread
//! - `ServeDir` does the actual file serving (ranges, mime types, redirects)
//! - Missing credentials file means no protection
//! - Auth decisions use the percent-decoded path, the one `ServeDir` opens

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::auth::digest::{self, Credential};
use crate::config::decode_path;
use crate::pages::html::escape;
use crate::reactor::StaticRequest;

/// Answer a static request.
pub async fn serve(request: StaticRequest) -> Response {
    let Some(path) = decode_path(&request.uri) else {
        tracing::debug!(uri = %request.uri, "Rejected undecodable static path");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let fs_path = resolve(&request.document_root, &path);

    if is_auth_file(&path, &request.auth_file) {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(credentials) = load_credentials(&request, &fs_path).await {
        let authorization = request
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !digest::verify(
            &credentials,
            request.method.as_str(),
            authorization,
            &request.auth_domain,
            unix_now(),
        ) {
            return challenge(&request.auth_domain);
        }
    }

    let is_dir = tokio::fs::metadata(&fs_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir && path.ends_with('/') && !fs_path.join("index.html").exists() {
        if !request.directory_listing {
            return StatusCode::FORBIDDEN.into_response();
        }
        return listing(&fs_path, &path, &request.auth_file).await;
    }

    let uri = match &request.query {
        Some(query) => format!("{}?{}", request.uri, query),
        None => request.uri.clone(),
    };
    let mut builder = Request::builder().method(request.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        headers.extend(request.headers.clone());
    }
    let file_request = match builder.body(Body::empty()) {
        Ok(file_request) => file_request,
        Err(e) => {
            tracing::warn!(uri = %request.uri, error = %e, "Bad static request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let result: Result<_, Infallible> = ServeDir::new(&request.document_root)
        .oneshot(file_request)
        .await;
    match result {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

fn resolve(root: &Path, uri: &str) -> PathBuf {
    root.join(uri.trim_start_matches('/'))
}

fn is_auth_file(path: &str, auth_file: &str) -> bool {
    path.rsplit('/').next() == Some(auth_file)
}

async fn load_credentials(request: &StaticRequest, fs_path: &Path) -> Option<Vec<Credential>> {
    let file = match &request.global_auth_file {
        Some(global) => global.clone(),
        None => {
            let is_dir = tokio::fs::metadata(fs_path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            let dir = if is_dir { fs_path } else { fs_path.parent()? };
            dir.join(&request.auth_file)
        }
    };

    let text = tokio::fs::read_to_string(&file).await.ok()?;
    Some(digest::parse_credentials(&text))
}

fn challenge(realm: &str) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    if let Ok(value) = HeaderValue::from_str(&digest::challenge(realm, unix_now())) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

async fn listing(dir: &Path, uri: &str, auth_file: &str) -> Response {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == auth_file {
            continue;
        }
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        names.push(if is_dir { format!("{name}/") } else { name });
    }
    names.sort();

    let mut body = format!(
        "<html><head><title>Index of {0}</title></head><body><h1>Index of {0}</h1><ul>",
        escape(uri)
    );
    if uri != "/" {
        body.push_str("<li><a href=\"../\">../</a></li>");
    }
    for name in names {
        let name = escape(&name);
        body.push_str(&format!("<li><a href=\"{name}\">{name}</a></li>"));
    }
    body.push_str("</ul></body></html>");
    Html(body).into_response()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
