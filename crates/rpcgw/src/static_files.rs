//! Static content mounted next to the gateway routes.
//!
//! Two independent sub-trees, each prefix-stripped so the underlying server
//! sees root-relative paths:
//! - `/swagger-ui/` serves an embedded, read-only asset bundle.
//! - `/swaggers/` serves generated API description documents from disk.

use std::{borrow::Cow, convert::Infallible, fmt, path::PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use common::{RequestError, ServeError};
use rust_embed::{EmbeddedFile, RustEmbed};
use tower_http::services::ServeDir;

use crate::handlers;

/// Mount point of the embedded UI bundle.
pub const UI_PREFIX: &str = "/swagger-ui";
/// Mount point of the description document directory.
pub const DOCS_PREFIX: &str = "/swaggers";

#[derive(RustEmbed)]
#[folder = "assets/swagger-ui/"]
struct SwaggerUi;

/// A compiled-in, read-only asset bundle.
///
/// Any `#[derive(RustEmbed)]` type can back a bundle via [`AssetBundle::of`].
#[derive(Clone, Copy)]
pub struct AssetBundle {
    lookup: fn(&str) -> Option<EmbeddedFile>,
}

impl AssetBundle {
    /// Bundle backed by the embed type `A`.
    pub fn of<A: RustEmbed>() -> Self {
        Self { lookup: A::get }
    }

    /// Fetch one file by its bundle-relative path.
    pub fn get(&self, path: &str) -> Option<EmbeddedFile> {
        (self.lookup)(path)
    }
}

impl Default for AssetBundle {
    /// The UI bundle shipped with this crate.
    fn default() -> Self {
        Self::of::<SwaggerUi>()
    }
}

impl fmt::Debug for AssetBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetBundle").finish_non_exhaustive()
    }
}

/// Both static sub-trees, ready to be mounted in the HTTP mux.
#[derive(Debug, Clone)]
pub struct StaticContent {
    assets: AssetBundle,
    docs_dir: PathBuf,
}

impl StaticContent {
    /// Resolve `docs_dir` to an absolute path and pair it with `assets`.
    ///
    /// The directory does not need to exist yet; missing files are served as
    /// 404s at request time.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Configuration`] if the path cannot be made absolute.
    pub fn new(assets: AssetBundle, docs_dir: &str) -> Result<Self, ServeError> {
        let docs_dir = std::path::absolute(docs_dir)
            .map_err(|e| ServeError::config("swagger_dir", format!("cannot be resolved: {e}")))?;
        Ok(Self { assets, docs_dir })
    }

    /// Absolute directory served under [`DOCS_PREFIX`].
    pub fn docs_dir(&self) -> &std::path::Path {
        &self.docs_dir
    }

    /// Whether `path` belongs to one of the static sub-trees.
    pub fn owns(path: &str) -> bool {
        [UI_PREFIX, DOCS_PREFIX].iter().any(|prefix| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Router with both sub-trees nested under their prefixes.
    pub fn router(&self) -> Router {
        let assets = self.assets;
        let ui = tower::service_fn(move |req: Request<Body>| async move {
            Ok::<_, Infallible>(serve_asset(&assets, req.method(), req.uri().path()))
        });

        let docs = ServeDir::new(&self.docs_dir).not_found_service(tower::service_fn(
            |req: Request<Body>| async move {
                let err = RequestError::NotFound(format!("no such document: {}", req.uri().path()));
                Ok::<_, Infallible>(handlers::error_response(&err))
            },
        ));

        Router::new()
            .nest_service(UI_PREFIX, ui)
            .nest_service(DOCS_PREFIX, docs)
    }
}

/// Serve one file from the bundle. `path` is already stripped of the prefix.
fn serve_asset(assets: &AssetBundle, method: &Method, path: &str) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, HeaderValue::from_static("GET, HEAD"))],
        )
            .into_response();
    }

    let relative = path.trim_start_matches('/');
    let relative: Cow<'_, str> = if relative.is_empty() || relative.ends_with('/') {
        Cow::Owned(format!("{relative}index.html"))
    } else {
        Cow::Borrowed(relative)
    };

    if relative.split('/').any(|segment| segment == "..") {
        return handlers::error_response(&RequestError::NotFound(relative.into_owned()));
    }

    match assets.get(&relative) {
        Some(file) => {
            let mime = mime_guess::from_path(relative.as_ref()).first_or_octet_stream();
            let content_type = HeaderValue::from_str(mime.as_ref())
                .unwrap_or(HeaderValue::from_static("application/octet-stream"));
            (
                [(header::CONTENT_TYPE, content_type)],
                Body::from(file.data.into_owned()),
            )
                .into_response()
        }
        None => handlers::error_response(&RequestError::NotFound(format!(
            "no such asset: {relative}"
        ))),
    }
}
