use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use clipcast::backend::MediaBackend;
use clipcast::backends::ffmpeg::FfmpegBackend;
use clipcast::container::select_primary_stream;
use clipcast::media::MediaKind;
use clipcast::request::{Action, ActionQuery, TranscodeRequest};
use clipcast::{MediaSource, SourceOpts};

#[derive(Parser, Debug)]
#[command(name = "clipcast-server")]
#[command(about = "HTTP server for still frames, sub-clips and playlists of stored media")]
struct Params {
    /// Directory that `/media/{path}` is resolved under.
    #[arg(long = "media-root")]
    media_root: PathBuf,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8080)]
    port: u16,

    /// Bytes buffered between the muxer and a streamed response.
    #[arg(long = "buffer-bytes", default_value_t = 64 * 1024)]
    buffer_bytes: usize,

    /// Minimum playlist segment length in seconds.
    #[arg(
        long = "chunk-seconds",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    chunk_seconds: u32,
}

#[derive(Clone)]
struct AppState {
    backend: Arc<dyn MediaBackend>,
    media_root: PathBuf,
    opts: SourceOpts,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<clipcast::Error> for AppError {
    fn from(err: clipcast::Error) -> Self {
        match err {
            clipcast::Error::InvalidRequest(_) => Self::bad_request(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    clipcast::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "clipcast-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let media_root = params
        .media_root
        .canonicalize()
        .with_context(|| format!("media root '{}' is not accessible", params.media_root.display()))?;

    let backend = FfmpegBackend::new().context("failed to initialize FFmpeg")?;
    let state = AppState {
        backend: Arc::new(backend),
        media_root,
        opts: SourceOpts {
            target_chunk_seconds: params.chunk_seconds,
            output_buffer_bytes: params.buffer_bytes,
            ..SourceOpts::default()
        },
    };

    let app = router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new()
                    .level(Level::INFO)
                    .include_headers(false),
            )
            .on_response(DefaultOnResponse::new().level(Level::INFO))
            .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
    );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/media/{*path}", get(media))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn healthz() -> &'static str {
    "ok"
}

async fn media(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> std::result::Result<Response, AppError> {
    let action = query
        .into_action()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    let file = resolve_media_path(&state.media_root, &path)?;

    let source = Arc::new(MediaSource::new(
        state.backend.clone(),
        file.to_string_lossy().into_owned(),
        state.opts.clone(),
    ));

    let (name, result) = match action {
        Action::Image { time } => ("image", still_frame(source, time).await),
        Action::Transcode(request) => ("transcode", sub_clip(source, request).await),
        Action::Playlist => {
            let base = playlist_base_uri(&headers, &uri);
            ("playlist", playlist(source, base).await)
        }
    };

    metrics::record_action(name, if result.is_ok() { "ok" } else { "error" });
    if let Err(err) = &result {
        warn!(action = name, path = %path, error = %err.message, "media request failed");
    }
    result
}

async fn still_frame(
    source: Arc<MediaSource>,
    time: f64,
) -> std::result::Result<Response, AppError> {
    let image = run_blocking(move || source.still_frame(time)).await?;
    let content_type = HeaderValue::from_static(image.mime_type);
    Ok(([(header::CONTENT_TYPE, content_type)], image.bytes).into_response())
}

async fn playlist(
    source: Arc<MediaSource>,
    base_uri: String,
) -> std::result::Result<Response, AppError> {
    let playlist = run_blocking(move || source.playlist(&base_uri)).await?;
    let content_type = HeaderValue::from_static(playlist.content_type);
    Ok(([(header::CONTENT_TYPE, content_type)], playlist.body).into_response())
}

/// Stream a sub-clip as it is muxed.
///
/// Stream lookup happens before the response head is sent, so a source without the required
/// streams still gets a proper error status. Failures after that abort the body.
async fn sub_clip(
    source: Arc<MediaSource>,
    request: TranscodeRequest,
) -> std::result::Result<Response, AppError> {
    let probe = source.clone();
    let streams = run_blocking(move || probe.streams()).await?;
    for kind in [MediaKind::Video, MediaKind::Audio] {
        if select_primary_stream(&streams, kind).is_none() {
            return Err(clipcast::Error::StreamNotFound(kind).into());
        }
    }

    let buffer_bytes = source.opts().output_buffer_bytes.max(1);
    let content_type = HeaderValue::from_static(request.profile.content_type());
    let (out_tx, out_rx) = tokio::io::duplex(buffer_bytes);
    let (done_tx, done_rx) = oneshot::channel::<std::result::Result<(), String>>();

    tokio::task::spawn_blocking(move || {
        let writer = SyncIoBridge::new(out_tx);
        let res = source
            .sub_clip(&request, Box::new(writer))
            .map_err(|err| err.to_string());
        let _ = done_tx.send(res);
    });

    let outcome = futures_util::stream::once(async move {
        match done_rx.await {
            Ok(Err(msg)) => {
                error!(%msg, "sub-clip failed");
                Err(io::Error::other(msg))
            }
            _ => Ok(Bytes::new()),
        }
    });
    let body = ReaderStream::new(out_rx)
        .chain(outcome)
        .filter(|chunk| std::future::ready(!matches!(chunk, Ok(bytes) if bytes.is_empty())));

    Ok(([(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response())
}

async fn run_blocking<T, F>(f: F) -> std::result::Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> clipcast::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::internal(format!("worker task failed: {err}")))?
        .map_err(AppError::from)
}

/// Resolve a request path under `root`, refusing anything that could escape it.
fn resolve_media_path(root: &FsPath, requested: &str) -> std::result::Result<PathBuf, AppError> {
    let relative = FsPath::new(requested.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        return Err(AppError::bad_request("missing media path"));
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(AppError::bad_request(format!(
            "media path '{requested}' escapes the media root"
        )));
    }

    let full = root.join(relative);
    if !full.is_file() {
        return Err(AppError::not_found(format!("no media at '{requested}'")));
    }
    Ok(full)
}

/// `http://{Host}{path}`, which the playlist strips down to the resource itself.
fn playlist_base_uri(headers: &HeaderMap, uri: &Uri) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("http://{host}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcast::backends::scripted::{Event, ScriptedBackend, ScriptedSource};

    fn state_with(source: ScriptedSource) -> anyhow::Result<(AppState, tempfile::TempDir)> {
        state_for(ScriptedBackend::new(source))
    }

    fn state_for(backend: ScriptedBackend) -> anyhow::Result<(AppState, tempfile::TempDir)> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("movie.mp4"), b"placeholder")?;
        let state = AppState {
            backend: Arc::new(backend),
            media_root: dir.path().to_path_buf(),
            opts: SourceOpts::default(),
        };
        Ok((state, dir))
    }

    fn query(action: &str) -> ActionQuery {
        ActionQuery {
            action: Some(action.to_owned()),
            ..ActionQuery::default()
        }
    }

    async fn call(state: AppState, q: ActionQuery) -> Response {
        let uri: Uri = "/media/movie.mp4?action=playlist".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.test:8080"));
        match media(
            State(state),
            Path("movie.mp4".to_owned()),
            Query(q),
            headers,
            uri,
        )
        .await
        {
            Ok(resp) => resp,
            Err(err) => err.into_response(),
        }
    }

    #[test]
    fn chunk_seconds_must_be_positive() {
        let parse = |chunk: &str| {
            Params::try_parse_from([
                "clipcast-server",
                "--media-root",
                "/srv/media",
                "--chunk-seconds",
                chunk,
            ])
        };
        assert!(parse("0").is_err());
        assert!(parse("4").is_ok_and(|p| p.chunk_seconds == 4));
    }

    #[tokio::test]
    async fn zero_chunk_playlist_is_bad_request() -> anyhow::Result<()> {
        let (mut state, _dir) = state_with(ScriptedSource::av(5_000, 1_000))?;
        state.opts.target_chunk_seconds = 0;
        let resp = call(state, query("playlist")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn resolve_media_path_rejects_escapes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.mp4"), b"x")?;

        assert!(resolve_media_path(dir.path(), "a.mp4").is_ok());
        assert!(resolve_media_path(dir.path(), "/a.mp4").is_ok());

        let err = resolve_media_path(dir.path(), "../etc/passwd").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = resolve_media_path(dir.path(), "missing.mp4").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[test]
    fn playlist_base_uri_uses_host_header() {
        let uri: Uri = "/media/a.mp4?action=playlist".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("h:1"));
        assert_eq!(
            playlist_base_uri(&headers, &uri),
            "http://h:1/media/a.mp4?action=playlist"
        );
    }

    #[tokio::test]
    async fn unsupported_action_is_bad_request() -> anyhow::Result<()> {
        let (state, _dir) = state_with(ScriptedSource::av(5_000, 1_000))?;
        let resp = call(state, query("explode")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        let json: serde_json::Value = serde_json::from_slice(&body)?;
        assert!(
            json["error"]
                .as_str()
                .is_some_and(|e| e.contains("Unsupported action explode"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn playlist_points_segments_back_at_the_resource() -> anyhow::Result<()> {
        let (state, _dir) = state_with(ScriptedSource::av(25_000, 2_000))?;
        let resp = call(state, query("playlist")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/x-mpegurl"))
        );

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        let text = String::from_utf8(body.to_vec())?;
        assert!(text.contains(
            "http://example.test:8080/media/movie.mp4?action=transcode&startTs=0&endTs=10000&profile=apple"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn image_is_served_as_jpeg() -> anyhow::Result<()> {
        let (state, _dir) = state_with(ScriptedSource::av(5_000, 1_000))?;
        let q = ActionQuery {
            time: Some("2.5".into()),
            ..query("image")
        };
        let resp = call(state, q).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("image/jpeg"))
        );
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        assert_eq!(&body[..2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[tokio::test]
    async fn transcode_streams_complete_container() -> anyhow::Result<()> {
        let backend = ScriptedBackend::new(ScriptedSource::av(6_000, 2_000));
        let journal = backend.journal();
        let (state, _dir) = state_for(backend)?;

        let q = ActionQuery {
            start_ts: Some("2000".into()),
            end_ts: Some("4000".into()),
            ..query("transcode")
        };
        let resp = call(state, q).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        assert!(body.starts_with(b"ftyp"));
        assert!(body.ends_with(b"mfra"));
        assert_eq!(journal.count(|e| matches!(e, Event::WriteTrailer)), 1);
        Ok(())
    }

    #[tokio::test]
    async fn transcode_without_audio_fails_before_streaming() -> anyhow::Result<()> {
        let (state, _dir) = state_with(ScriptedSource::video_only(5_000, 1_000))?;
        let resp = call(state, query("transcode")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        let json: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(json["error"], "no audio stream found");
        Ok(())
    }
}
