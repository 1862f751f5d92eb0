// src/api.rs
//! HTTP surface: status, chat, read-only data views, manual collection, stats.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::chat::{ChatError, ChatGateway, ClientMeta, ConsultParams};
use crate::ingest::types::CollectionRunner;
use crate::store::{Collection, FindOptions, SharedStore, StoreError};

pub const ADMIN_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub chat: Arc<ChatGateway>,
    pub collector: Arc<dyn CollectionRunner>,
    /// `None` locks `/api/coleta` for everyone.
    pub admin_api_key: Option<String>,
    pub frontend_dir: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    let frontend = state.frontend_dir.clone();
    let app = Router::new()
        .route("/api/status", get(status))
        .route("/api/openai/consulta", post(consult))
        .route("/api/openai/historico", get(history))
        .route("/api/db/noticias", get(latest_news))
        .route("/api/db/indicadores", get(latest_quotes))
        .route("/api/db/analise", get(latest_analysis))
        .route("/api/db/gerar-analise", post(generate_analysis))
        .route("/api/coleta", post(run_collection))
        .route("/api/estatisticas", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match frontend {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        warn!(target: "api", error = %e, "store error");
        ApiError::Internal(e.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Caller ip (forwarding headers first, then the socket) and user agent.
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let forwarded = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .or_else(|| header_str("x-real-ip"));
        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientMeta {
            client_ip: forwarded.or(socket),
            user_agent: header_str(header::USER_AGENT.as_str()),
        })
    }
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "online" }))
}

async fn consult(
    State(state): State<AppState>,
    meta: ClientMeta,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let params: ConsultParams = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
    if params.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt not provided".into()));
    }
    let reply = state.chat.consult(params, meta).await?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
    #[serde(alias = "requester")]
    usuario: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    Query(p): Query<HistoryParams>,
) -> ApiResult<Json<Vec<Value>>> {
    let limit = p.limit.unwrap_or(10).clamp(1, 500);
    Ok(Json(state.chat.history(limit, p.usuario.as_deref()).await?))
}

async fn latest_news(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    let docs = state
        .store
        .find(Collection::News, &FindOptions::sorted_by("publishedAt", 10))
        .await?;
    Ok(Json(docs.iter().map(|d| d.to_json()).collect()))
}

/// Latest quotes shaped for the dashboard cards.
async fn latest_quotes(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    let docs = state
        .store
        .find(Collection::Quotes, &FindOptions::newest(10))
        .await?;
    Ok(Json(docs.iter().map(|d| format_quote(&d.body)).collect()))
}

fn format_quote(q: &Value) -> Value {
    let date = q
        .get("createDate")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now)
        .format("%d/%m/%Y")
        .to_string();
    json!({
        "nome": q.get("name").cloned().unwrap_or(Value::Null),
        "valor": q.get("bid").or_else(|| q.get("ask")).cloned().unwrap_or(Value::Null),
        "variacao": q.get("pctChange").and_then(Value::as_f64).unwrap_or(0.0),
        "data": date,
        "categoria": "moeda",
    })
}

async fn latest_analysis(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match state.chat.latest_analysis().await? {
        Some(doc) => Ok(Json(doc)),
        None => Err(ApiError::NotFound("no analysis found".into())),
    }
}

async fn generate_analysis(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.chat.generate_analysis().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectBody {
    api_key: Option<String>,
}

fn authorized(expected: Option<&str>, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(expected) = expected.filter(|k| !k.is_empty()) else {
        return false;
    };
    let from_header = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let provided = from_header.or_else(|| {
        serde_json::from_slice::<CollectBody>(body)
            .ok()
            .and_then(|b| b.api_key)
    });
    provided.as_deref() == Some(expected)
}

async fn run_collection(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if !authorized(state.admin_api_key.as_deref(), &headers, &body) {
        warn!(target: "api", "rejected manual collection: bad or missing admin key");
        return Err(ApiError::Unauthorized);
    }
    info!(target: "api", "manual collection requested");
    Ok(Json(state.collector.run_collection().await))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (quotes, indicators, banks, news) = tokio::try_join!(
        state.store.count(Collection::Quotes),
        state.store.count(Collection::Indicators),
        state.store.count(Collection::Banks),
        state.store.count(Collection::News),
    )?;
    Ok(Json(json!({
        "cotacoes": quotes,
        "indicadores": indicators,
        "bancos": banks,
        "noticias": news,
        "total": quotes + indicators + banks + news,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn admin_key_from_header_or_body() {
        let mut h = HeaderMap::new();
        assert!(!authorized(Some("k"), &h, b""));
        assert!(authorized(Some("k"), &h, br#"{"apiKey": "k"}"#));
        assert!(!authorized(Some("k"), &h, br#"{"apiKey": "nope"}"#));
        h.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("k"));
        assert!(authorized(Some("k"), &h, b"not json"));
        // no configured key: nobody gets in
        assert!(!authorized(None, &h, br#"{"apiKey": "k"}"#));
        assert!(!authorized(Some(""), &HeaderMap::new(), br#"{"apiKey": ""}"#));
    }

    #[test]
    fn quote_card_shape() {
        let q = json!({
            "name": "Dólar Americano/Real Brasileiro", "bid": 5.03, "pctChange": -0.25,
            "createDate": "2024-04-05T19:34:38Z"
        });
        let card = format_quote(&q);
        assert_eq!(card["nome"], "Dólar Americano/Real Brasileiro");
        assert_eq!(card["valor"], 5.03);
        assert_eq!(card["variacao"], -0.25);
        assert_eq!(card["data"], "05/04/2024");
        assert_eq!(card["categoria"], "moeda");
    }
}
