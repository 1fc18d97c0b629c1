use crate::{
    app::{App, ReportOutcome, SearchHit},
    config::Config,
    eid::Eid,
    errors::AppError,
    records::{Item, ItemCreate, ItemKind, ItemMatch, Notification, User},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Debug, sync::Arc};
use tokio::{signal, sync::RwLock};

#[derive(Clone)]
struct SharedState {
    app: Arc<RwLock<App>>,
}

async fn start_app(app: App) {
    let bind_addr = app.config().read().unwrap().bind_addr.clone();

    let app = Arc::new(RwLock::new(app));
    let signal = shutdown_signal();
    let shared_state = Arc::new(SharedState { app });

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let router = Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/items/report", post(report))
        .route("/api/items/get", post(get_item))
        .route("/api/items/by_user", post(items_by_user))
        .route("/api/items/lost", get(lost_items))
        .route("/api/items/found", get(found_items))
        .route("/api/search/text", post(search_text))
        .route("/api/search/image", post(search_image))
        .route("/api/matches/for_item", post(matches_for_item))
        .route("/api/matches/candidates", post(candidates))
        .route("/api/matches/feedback", post(feedback))
        .route("/api/contact", post(contact))
        .route("/api/notifications/list", post(notifications))
        .route("/api/notifications/mark_read", post(mark_read))
        .route("/api/config", get(get_config))
        .layer(
            tower::ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
                .layer(
                    tower_http::trace::TraceLayer::new_for_http()
                        .make_span_with(
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                        )
                        .on_response(
                            tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::INFO),
                        ),
                ),
        )
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    log::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

pub fn start_daemon(app: App) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

// Wraps `AppError` so axum can turn it into a response.
#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            AppError::NotFound => axum::http::StatusCode::NOT_FOUND,
            AppError::EmailTaken => axum::http::StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::NotLoggedIn => {
                axum::http::StatusCode::UNAUTHORIZED
            }
            AppError::Classifier(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::BAD_GATEWAY
            }
            AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, json!({"error": self.0.to_string()}).to_string()).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Deserialize)]
struct SignupRequest {
    name: String,
    email: String,
    password: String,
}

impl Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SignupRequest {{ name: {:?}, email: {:?}, password: [REDACTED] }}",
            self.name, self.email
        )
    }
}

async fn signup(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<axum::Json<User>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.signup(&payload.name, &payload.email, &payload.password)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

impl Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LoginRequest {{ email: {:?}, password: [REDACTED] }}",
            self.email
        )
    }
}

async fn login(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<axum::Json<User>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        match app.login(&payload.email, &payload.password)? {
            Some(user) => Ok(user.into()),
            None => Err(HttpError(AppError::InvalidCredentials)),
        }
    })
}

async fn logout(State(state): State<Arc<SharedState>>) -> Result<axum::Json<()>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.logout().map(Into::into).map_err(Into::into)
    })
}

async fn me(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Option<User>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.current_user().map(Into::into).map_err(Into::into)
    })
}

#[derive(Deserialize)]
struct ReportRequest {
    kind: ItemKind,

    #[serde(flatten)]
    item: ItemCreate,

    /// Base64-encoded photo of the item.
    image_b64: Option<String>,
}

impl Debug for ReportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ReportRequest {{ kind: {:?}, item: {:?}, image_b64: [REDACTED] }}",
            self.kind, self.item
        )
    }
}

async fn report(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ReportRequest>,
) -> Result<axum::Json<ReportOutcome>, HttpError> {
    log::debug!("payload: {payload:?}");

    let image = match payload.image_b64 {
        Some(b64) => Some(
            STANDARD
                .decode(b64)
                .map_err(|err| AppError::Other(err.into()))?,
        ),
        None => None,
    };

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.report_item(payload.kind, payload.item, image)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct ItemIdRequest {
    item_id: Eid,
}

async fn get_item(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ItemIdRequest>,
) -> Result<axum::Json<Item>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.get_item(&payload.item_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct UserIdRequest {
    user_id: Eid,
}

async fn items_by_user(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UserIdRequest>,
) -> Result<axum::Json<Vec<Item>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.items_by_user(&payload.user_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

async fn lost_items(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<Item>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.lost_items().map(Into::into).map_err(Into::into)
    })
}

async fn found_items(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<Item>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.found_items().map(Into::into).map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct TextSearchRequest {
    query: String,
    /// Anchor item id; narrows scope and persists hits as pending matches.
    item_id: Option<Eid>,
}

async fn search_text(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<TextSearchRequest>,
) -> Result<axum::Json<Vec<SearchHit>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.search_text(&payload.query, payload.item_id.as_ref())
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Deserialize)]
struct ImageSearchRequest {
    image_b64: String,
    item_id: Option<Eid>,
}

impl Debug for ImageSearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ImageSearchRequest {{ image_b64: [REDACTED], item_id: {:?} }}",
            self.item_id
        )
    }
}

#[derive(Serialize)]
struct ImageSearchResponse {
    analysis: String,
    matches: Vec<SearchHit>,
}

async fn search_image(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ImageSearchRequest>,
) -> Result<axum::Json<ImageSearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let image = STANDARD
        .decode(payload.image_b64)
        .map_err(|err| AppError::Other(err.into()))?;

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        let (analysis, matches) = app.search_image(&image, payload.item_id.as_ref())?;
        Ok(ImageSearchResponse { analysis, matches }.into())
    })
}

async fn matches_for_item(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ItemIdRequest>,
) -> Result<axum::Json<Vec<ItemMatch>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.matches_for_item(&payload.item_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

async fn candidates(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ItemIdRequest>,
) -> Result<axum::Json<Vec<SearchHit>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.find_candidates(&payload.item_id)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    match_id: Eid,
    positive: bool,
}

async fn feedback(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<axum::Json<ItemMatch>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.feedback(&payload.match_id, payload.positive)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct ContactRequest {
    match_id: Eid,
    item_id: Eid,
    message: String,
}

async fn contact(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ContactRequest>,
) -> Result<axum::Json<()>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.contact_owner(&payload.match_id, &payload.item_id, &payload.message)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct NotificationsRequest {
    /// Defaults to the logged-in user.
    user_id: Option<Eid>,
}

async fn notifications(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<NotificationsRequest>,
) -> Result<axum::Json<Vec<Notification>>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.notifications(payload.user_id.as_ref())
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct IdRequest {
    id: Eid,
}

async fn mark_read(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IdRequest>,
) -> Result<axum::Json<()>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        app.mark_read(&payload.id).map(Into::into).map_err(Into::into)
    })
}

async fn get_config(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Config>, HttpError> {
    let app = state.app.clone();
    tokio::task::block_in_place(move || {
        let app = app.blocking_read();
        Ok(app.config().read().unwrap().clone().into())
    })
}
