//! Purpose: Serve the notes HTTP API.
//! Exports: `ServeConfig`, `serve`, `DEFAULT_BIND`, `DEFAULT_MAX_BODY_BYTES`.
//! Role: Axum router over an injected `NoteStore`, plain HTTP or rustls HTTPS.
//! Invariants: Missing ids answer 200 with the not-found message; store failures use the error envelope.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Shutdown closes idle connections at once; only in-flight requests can hit the timeout.
//! Notes: Handlers call the synchronous store directly; store operations are short and local.

use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tokio_rustls::TlsAcceptor;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_service::Service;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::tls::{TlsMode, load_tls};
use notekeep::api::wire::{DeletedBody, ErrorBody, ErrorEnvelope, MessageBody};
use notekeep::api::{
    ConnectionString, Error, ErrorKind, MemoryStore, NewNote, NoteId, NoteStore, open_store,
};

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub connection: ConnectionString,
    pub seed_demo: bool,
    pub cors_allowed_origins: Vec<String>,
    pub allow_non_loopback: bool,
    pub tls: TlsMode,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn NoteStore>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let store = open_configured_store(&config)?;
    tracing::info!(store = %store.describe(), "opened note store");

    let cors = cors_layer(&config.cors_allowed_origins)?;
    let tls = load_tls(&config.tls, config.bind.ip())?;
    let app = router(store, cors, max_body_bytes);

    let listener = TcpListener::bind(config.bind).await.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to bind server to {}", config.bind))
            .with_source(err)
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read bound address")
            .with_source(err)
    })?;

    match tls {
        None => {
            tracing::info!(addr = %local_addr, "serving notes api over http");
            serve_plain(listener, app).await
        }
        Some(material) => {
            tracing::info!(
                addr = %local_addr,
                fingerprint = %material.fingerprint,
                "serving notes api over https"
            );
            serve_tls(listener, app, TlsAcceptor::from(material.server_config)).await
        }
    }
}

fn open_configured_store(config: &ServeConfig) -> Result<Arc<dyn NoteStore>, Error> {
    if config.seed_demo {
        return Ok(Arc::new(MemoryStore::seeded()));
    }
    open_store(&config.connection)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.seed_demo && config.connection != ConnectionString::Memory {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--seed-demo requires the in-memory store")
            .with_hint("Add --db memory: or drop --seed-demo."));
    }

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    if origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let mut values = Vec::with_capacity(origins.len());
    for origin in origins {
        values.push(normalize_origin(origin)?);
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT])
        .allow_credentials(true))
}

fn normalize_origin(raw: &str) -> Result<HeaderValue, Error> {
    let trimmed = raw.trim();
    if trimmed == "*" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--cors-origin does not accept '*'")
            .with_hint("Omit --cors-origin to allow any origin."));
    }
    let url = Url::parse(trimmed).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid --cors-origin: {trimmed}"))
            .with_source(err)
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid --cors-origin: {trimmed}"))
            .with_hint("Use an origin like https://localhost:3000."));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("--cors-origin must not include a path: {trimmed}")));
    }
    HeaderValue::from_str(&url.origin().ascii_serialization()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid --cors-origin: {trimmed}"))
            .with_source(err)
    })
}

pub(crate) fn router(store: Arc<dyn NoteStore>, cors: CorsLayer, max_body_bytes: usize) -> Router {
    let state = Arc::new(AppState { store });
    Router::new()
        .route("/", get(welcome))
        .route("/healthz", get(healthz))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/:id", get(get_note).delete(delete_note))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn serve_plain(listener: TcpListener, app: Router) -> Result<(), Error> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(server_failed)?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
                Ok(result) => result.map_err(server_failed)?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

async fn serve_tls(listener: TcpListener, app: Router, acceptor: TlsAcceptor) -> Result<(), Error> {
    let mut connections = JoinSet::new();
    let (close_tx, close_rx) = watch::channel(false);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        continue;
                    }
                };
                connections.spawn(serve_tls_connection(
                    stream,
                    peer,
                    acceptor.clone(),
                    app.clone(),
                    close_rx.clone(),
                ));
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    let _ = close_tx.send(true);
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        connections.abort_all();
        return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
    }
    Ok(())
}

/// Serves one TLS connection until the peer closes it or `close` flips.
/// On close, handshakes in progress are dropped and hyper finishes in-flight
/// requests before closing idle keep-alive connections.
async fn serve_tls_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    tower_service: Router,
    mut close: watch::Receiver<bool>,
) {
    let stream = tokio::select! {
        accepted = acceptor.accept(stream) => match accepted {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(%peer, %err, "tls handshake failed");
                return;
            }
        },
        _ = close.changed() => return,
    };

    let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
        tower_service.clone().call(request)
    });
    let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), hyper_service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = close.changed() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(err) = result {
        tracing::debug!(%peer, %err, "connection closed with error");
    }
}

fn server_failed(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("server failed")
        .with_source(err)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    tracing::info!("shutdown requested");
}

async fn welcome() -> Json<MessageBody> {
    Json(MessageBody::welcome())
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn list_notes(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list() {
        Ok(notes) => Json(notes).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_note(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    let id = match id.parse::<NoteId>() {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    match state.store.get(&id) {
        Ok(Some(note)) => Json(note).into_response(),
        Ok(None) => Json(MessageBody::not_found()).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewNote>,
) -> Response {
    match state.store.insert(payload) {
        Ok(note) => {
            tracing::info!(id = %note.id, "created note");
            Json(note).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn delete_note(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = match id.parse::<NoteId>() {
        Ok(id) => id,
        Err(err) => return error_response(err),
    };
    match state.store.delete(&id) {
        Ok(Some(note)) => {
            tracing::info!(id = %note.id, "deleted note");
            Json(DeletedBody::new(note)).into_response()
        }
        Ok(None) => Json(MessageBody::not_found()).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Busy => StatusCode::LOCKED,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(kind = ?err.kind(), error = %err, "request failed");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{ServeConfig, cors_layer, router, serve, validate_config};
    use crate::tls::TlsMode;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use notekeep::api::{
        CollectionStore, ConnectionString, ErrorKind, MemoryStore, NoteStore,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn config(bind: &str) -> ServeConfig {
        ServeConfig {
            bind: bind.parse().expect("bind"),
            connection: ConnectionString::Memory,
            seed_demo: false,
            cors_allowed_origins: Vec::new(),
            allow_non_loopback: false,
            tls: TlsMode::Off,
            max_body_bytes: 1024 * 1024,
        }
    }

    fn app_with(store: Arc<dyn NoteStore>) -> Router {
        router(store, cors_layer(&[]).expect("cors"), 1024 * 1024)
    }

    fn seeded_app() -> Router {
        app_with(Arc::new(MemoryStore::seeded()))
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.expect("response")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let err = serve(config("0.0.0.0:0")).await.expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn non_loopback_requires_allow_flag() {
        let mut cfg = config("0.0.0.0:0");
        assert_eq!(validate_config(&cfg).expect_err("usage").kind(), ErrorKind::Usage);
        cfg.allow_non_loopback = true;
        validate_config(&cfg).expect("config ok");
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let mut cfg = config("127.0.0.1:0");
        cfg.max_body_bytes = 0;
        assert_eq!(validate_config(&cfg).expect_err("usage").kind(), ErrorKind::Usage);
    }

    #[test]
    fn seed_demo_requires_memory_store() {
        let mut cfg = config("127.0.0.1:0");
        cfg.seed_demo = true;
        validate_config(&cfg).expect("memory seed ok");
        cfg.connection = ConnectionString::collection("/tmp/notekeep-db");
        assert_eq!(validate_config(&cfg).expect_err("usage").kind(), ErrorKind::Usage);
    }

    #[test]
    fn cors_origins_are_validated() {
        cors_layer(&["https://localhost:3000".to_string()]).expect("valid origin");
        for bad in ["*", "localhost:3000", "ftp://example.com", "http://example.com/app"] {
            let err = cors_layer(&[bad.to_string()]).expect_err("invalid origin");
            assert_eq!(err.kind(), ErrorKind::Usage, "origin {bad}");
        }
    }

    #[tokio::test]
    async fn welcome_route_returns_fixed_payload() {
        let response = send(&seeded_app(), get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Welcome to the Notes App API" })
        );
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let response = send(&seeded_app(), get("/healthz")).await;
        assert_eq!(body_json(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn list_returns_seeded_notes() {
        let response = send(&seeded_app(), get("/notes")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!([
                { "id": 1, "text": "First note from the backend!" },
                { "id": 2, "text": "Learn how to connect a frontend." }
            ])
        );
    }

    #[tokio::test]
    async fn create_then_get_returns_same_text() {
        let app = seeded_app();
        let created = body_json(send(&app, post_json("/notes", r#"{"text":"buy milk"}"#)).await).await;
        assert_eq!(created, json!({ "id": 3, "text": "buy milk" }));

        let fetched = body_json(send(&app, get("/notes/3")).await).await;
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn delete_removes_note_from_listing() {
        let app = seeded_app();
        let response = send(&app, delete("/notes/1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "message": "Note with id 1 has been deleted",
                "deleted_note": { "id": 1, "text": "First note from the backend!" }
            })
        );

        let listed = body_json(send(&app, get("/notes")).await).await;
        assert_eq!(listed, json!([{ "id": 2, "text": "Learn how to connect a frontend." }]));
    }

    #[tokio::test]
    async fn missing_ids_answer_not_found_message() {
        let app = seeded_app();
        for request in [get("/notes/99"), delete("/notes/99"), get("/notes/abc")] {
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({ "message": "Note not found" }));
        }
    }

    #[tokio::test]
    async fn malformed_create_body_is_rejected() {
        let response = send(&seeded_app(), post_json("/notes", r#"{"txt":"x"}"#)).await;
        assert!(response.status().is_client_error());

        let response = send(&seeded_app(), post_json("/notes", "not json")).await;
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = router(
            Arc::new(MemoryStore::new()),
            cors_layer(&[]).expect("cors"),
            16,
        );
        let body = json!({ "text": "x".repeat(64) }).to_string();
        let response = send(&app, post_json("/notes", &body)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn store_failures_use_error_envelope() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CollectionStore::open(temp.path(), "notes").expect("open");
        std::fs::write(store.data_path(), "{ broken").expect("corrupt file");
        let app = app_with(Arc::new(store));

        let response = send(&app, get("/notes")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "Corrupt");
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn default_cors_allows_any_origin() {
        let request = Request::builder()
            .uri("/notes")
            .header("origin", "https://localhost:3000")
            .body(Body::empty())
            .expect("request");
        let response = send(&seeded_app(), request).await;
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn explicit_cors_origins_allow_credentials() {
        let cors = cors_layer(&["https://localhost:3000".to_string()]).expect("cors");
        let app = router(Arc::new(MemoryStore::new()), cors, 1024);
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/notes")
            .header("origin", "https://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .expect("request");
        let response = send(&app, request).await;
        let headers = response.headers();
        assert_eq!(
            headers
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("https://localhost:3000")
        );
        assert_eq!(
            headers
                .get("access-control-allow-credentials")
                .and_then(|value| value.to_str().ok()),
            Some("true")
        );
    }
}
