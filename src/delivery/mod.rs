//! HTTP delivery endpoint
//!
//! Peers pull toolchain and task bundles from here and push result archives
//! back. All routes live under a configurable path prefix:
//!
//! - `GET  /<prefix>/compiler/<hash>` toolchain bundle
//! - `GET  /<prefix>/tasks/<hash>` task bundle
//! - `PUT  /<prefix>/<path...>` result zip, stored and extracted in the build dir
//!   (bundle paths included)
//!
//! GETs honour a single `Range` and always carry `ETag: SHA1:<hash>`.
//! Handler errors become status codes; they never stop the listener.

pub mod range;
pub mod upload;
mod urls;

pub use range::{parse_range, ByteRange, RangeError};
pub use urls::{DeliveryUrls, COMPILER_SEGMENT, TASKS_SEGMENT};

use crate::cache::PackageCache;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use bytes::Bytes;
use futures::StreamExt;
use golem_protocol::prefixed_hash;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Delivery endpoint errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    #[error("Upload body error: {0}")]
    Body(String),

    #[error("Upload exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Extraction task failed: {0}")]
    Join(String),
}

/// Routing and storage settings
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub path_prefix: String,
    /// Where uploaded archives are stored and extracted
    pub build_path: PathBuf,
    /// 0 = no limit
    pub max_upload_bytes: u64,
}

#[derive(Clone)]
struct DeliveryState {
    cache: Arc<PackageCache>,
    build_path: Arc<PathBuf>,
    max_upload_bytes: u64,
}

/// Build the endpoint's router
pub fn router(cache: Arc<PackageCache>, settings: &DeliverySettings) -> Router {
    let state = DeliveryState {
        cache,
        build_path: Arc::new(settings.build_path.clone()),
        max_upload_bytes: settings.max_upload_bytes,
    };

    let routes = Router::new()
        .route(
            &format!("/{}/{{hash}}", COMPILER_SEGMENT),
            get(get_toolchain).put(put_result),
        )
        .route(
            &format!("/{}/{{hash}}", TASKS_SEGMENT),
            get(get_task_bundle).put(put_result),
        )
        .route("/{*path}", put(put_result))
        .with_state(state);

    let prefix = settings.path_prefix.trim_matches('/');
    let app = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&format!("/{}", prefix), routes)
    };
    app.layer(TraceLayer::new_for_http())
}

async fn get_toolchain(
    State(state): State<DeliveryState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_bundle(state.cache.toolchain_bytes(&hash), &hash, &headers)
}

async fn get_task_bundle(
    State(state): State<DeliveryState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_bundle(state.cache.task_bundle_bytes(&hash), &hash, &headers)
}

fn serve_bundle(bytes: Option<Bytes>, hash: &str, headers: &HeaderMap) -> Response {
    let Some(bytes) = bytes else {
        debug!(hash, "Bundle not found");
        return (StatusCode::NOT_FOUND, "unknown bundle").into_response();
    };

    let body = match headers.get(header::RANGE) {
        None => bytes,
        Some(value) => {
            let parsed = value
                .to_str()
                .map_err(|_| RangeError::Malformed(format!("{:?}", value)))
                .and_then(|v| parse_range(v, bytes.len()));
            match parsed {
                Ok(range) => bytes.slice(range.start..=range.end),
                Err(e) => {
                    warn!(hash, error = %e, "Rejected range request");
                    return (
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        [(header::CONTENT_RANGE, format!("bytes */{}", bytes.len()))],
                        e.to_string(),
                    )
                        .into_response();
                }
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::ETAG, prefixed_hash(hash)),
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
        .into_response()
}

/// Any path under the prefix; the URI is already stripped of the prefix
async fn put_result(State(state): State<DeliveryState>, uri: Uri, body: Body) -> Response {
    let path = uri.path().trim_start_matches('/');
    let Some(name) = upload::archive_name(path) else {
        return (StatusCode::BAD_REQUEST, "invalid upload path").into_response();
    };

    match store_upload(&state, &name, body).await {
        Ok(archive) => (
            StatusCode::CREATED,
            [(header::CONTENT_LOCATION, archive.display().to_string())],
        )
            .into_response(),
        Err(e) => {
            error!(upload = %path, error = %e, "Failed to store upload");
            let status = match e {
                DeliveryError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                DeliveryError::Body(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string()).into_response()
        }
    }
}

async fn store_upload(state: &DeliveryState, name: &str, body: Body) -> Result<PathBuf, DeliveryError> {
    let build_path = state.build_path.as_ref();
    tokio::fs::create_dir_all(build_path).await?;
    let archive = build_path.join(name);
    // Unique per request so concurrent uploads of one name never interleave
    let partial = build_path.join(format!("{}.{}.part", name, Uuid::new_v4().simple()));

    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = body.into_data_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DeliveryError::Body(e.to_string()))?;
        written += chunk.len() as u64;
        if state.max_upload_bytes > 0 && written > state.max_upload_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DeliveryError::TooLarge {
                limit: state.max_upload_bytes,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, &archive).await?;

    let (zip_path, dest) = (archive.clone(), build_path.to_path_buf());
    let extracted = tokio::task::spawn_blocking(move || upload::extract_zip(&zip_path, &dest))
        .await
        .map_err(|e| DeliveryError::Join(e.to_string()))??;

    info!(
        archive = %archive.display(),
        bytes = written,
        files = extracted.len(),
        "Stored result archive"
    );
    Ok(archive)
}

/// Bound listener plus router, ready to serve
pub struct DeliveryServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl DeliveryServer {
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self, DeliveryError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| DeliveryError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            router,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `cancel` fires, then drain open connections
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DeliveryError> {
        info!(addr = %self.local_addr, "Delivery endpoint listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(DeliveryError::Serve)?;
        info!(addr = %self.local_addr, "Delivery endpoint stopped");
        Ok(())
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<(), DeliveryError>> {
        tokio::spawn(self.run(cancel))
    }
}
