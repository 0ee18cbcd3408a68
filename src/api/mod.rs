//! HTTP API the frontend drives the session through

use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::coordination::{BuildRequest, Notification, Session};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::ProgressState;
use crate::transaction::{Currency, SwapStep, TransactionType};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub chain_manager: Arc<ChainManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/progress", get(get_progress))
        .route("/progress/modal", post(set_modal))
        .route("/reset", post(reset))
        .route("/classify", post(classify))
        .route("/plan", post(plan))
        .route("/approve", post(approve))
        .route("/execute", post(execute))
        .route("/notifications", get(get_notifications))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> OrchestratorResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OrchestratorError::Internal(format!("API bind failed: {}", e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| OrchestratorError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - every chain reachable and a wallet connected
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let chain_health = state.chain_manager.health_check().await;
    let chains_ok = chain_health.iter().all(|(_, healthy)| *healthy);
    let wallet_ok = state.session.connected_address().is_some();
    let ready = chains_ok && wallet_ok;

    crate::metrics::record_health_check(ready);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            wallet: wallet_ok,
            chains: chains_ok,
            details: chain_health
                .into_iter()
                .map(|(id, h)| ChainHealth {
                    chain_id: id,
                    healthy: h,
                })
                .collect(),
        }),
    )
}

async fn get_progress(State(state): State<AppState>) -> Json<ProgressState> {
    Json(state.session.progress())
}

async fn set_modal(
    State(state): State<AppState>,
    Json(request): Json<ModalRequest>,
) -> Json<ModalResponse> {
    let changed = state.session.set_modal_open(request.open);
    Json(ModalResponse { changed })
}

async fn reset(State(state): State<AppState>) -> StatusCode {
    state.session.reset().await;
    StatusCode::NO_CONTENT
}

async fn classify(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> Json<ClassifyResponse> {
    let transaction_type = state
        .session
        .classify(request.currency_in.as_ref(), request.currency_out.as_ref())
        .await;
    Json(ClassifyResponse { transaction_type })
}

async fn plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let transaction_type = state
        .session
        .classify(request.currency_in.as_ref(), request.currency_out.as_ref())
        .await;
    let step = state
        .session
        .plan(transaction_type.as_ref(), request.amount)
        .await?;

    Ok(Json(PlanResponse {
        transaction_type,
        step,
    }))
}

async fn approve(
    State(state): State<AppState>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let transaction_type = state
        .session
        .classify(Some(&request.currency_in), Some(&request.currency_out))
        .await
        .ok_or_else(|| {
            OrchestratorError::NoRoute(format!(
                "{} -> {}",
                request.currency_in, request.currency_out
            ))
        })?;

    let submitted = state
        .session
        .approve(&transaction_type, request.amount)
        .await?;
    Ok(Json(ApproveResponse { submitted }))
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<(StatusCode, Json<ExecuteResponse>), ApiError> {
    let build = BuildRequest {
        amount_in: request.amount_in,
        expected_amount_out: request.expected_amount_out,
        recipient: request.recipient,
    };
    let attempt_id = state
        .session
        .execute(&request.currency_in, &request.currency_out, build)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(ExecuteResponse { attempt_id })))
}

async fn get_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.session.notifications())
}

/// Orchestrator failures as HTTP responses
struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::NoRoute(_)
            | OrchestratorError::Quote(_)
            | OrchestratorError::StaleQuote { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::WalletNotConnected
            | OrchestratorError::Transaction(_)
            | OrchestratorError::AttemptInProgress { .. } => StatusCode::CONFLICT,
            OrchestratorError::ChainNotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_transient() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// Request types

#[derive(Deserialize)]
struct ModalRequest {
    open: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionRequest {
    currency_in: Option<Currency>,
    currency_out: Option<Currency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanRequest {
    currency_in: Option<Currency>,
    currency_out: Option<Currency>,
    #[serde(default)]
    amount: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveRequest {
    currency_in: Currency,
    currency_out: Currency,
    amount: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest {
    currency_in: Currency,
    currency_out: Currency,
    amount_in: U256,
    #[serde(default)]
    expected_amount_out: Option<U256>,
    #[serde(default)]
    recipient: Option<Address>,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    wallet: bool,
    chains: bool,
    details: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
}

#[derive(Serialize)]
struct ModalResponse {
    changed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyResponse {
    transaction_type: Option<TransactionType>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    transaction_type: Option<TransactionType>,
    step: Option<SwapStep>,
}

#[derive(Serialize)]
struct ApproveResponse {
    submitted: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    attempt_id: Uuid,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Readers;
    use crate::config::tests::SAMPLE_CONFIG;
    use crate::config::Settings;
    use crate::coordination::{CallBuilder, ExecutionCoordinator, Notifier};
    use crate::delivery::Oracles;
    use crate::encoder::MockCallEncoder;
    use crate::quote::MockQuoteOracle;
    use crate::state::ProgressStore;
    use crate::transaction::fixtures::*;
    use crate::transaction::BridgeRegistry;
    use crate::tx::MockWalletSession;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(encoder: MockCallEncoder) -> Router {
        let settings = Settings::parse(SAMPLE_CONFIG).unwrap();
        let chain_manager = Arc::new(ChainManager::new(&settings).unwrap());

        let mut wallet = MockWalletSession::new();
        wallet
            .expect_connected_address()
            .return_const(Some(address(0x05)));

        let store = Arc::new(ProgressStore::new());
        let notifier = Arc::new(Notifier::new(8));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::new(wallet),
            store.clone(),
            notifier.clone(),
            Oracles::new(),
            Readers::new(),
            Duration::from_millis(5),
        ));
        let builder = CallBuilder::new(
            Arc::new(MockQuoteOracle::new()),
            Arc::new(encoder),
            50,
            1_200,
        );
        let session = Session::new(
            Arc::new(BridgeRegistry::default()),
            builder,
            coordinator,
            store,
            notifier,
            Readers::new(),
            Default::default(),
        );

        router(AppState {
            session: Arc::new(session),
            chain_manager,
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn currency_json(chain_id: u64, byte: u8) -> Value {
        serde_json::to_value(token(chain_id, byte, "TKN")).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(MockCallEncoder::new()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_progress_starts_empty() {
        let (status, body) = send(app(MockCallEncoder::new()), "GET", "/progress", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["steps"], json!([]));
        assert_eq!(body["attemptId"], Value::Null);
    }

    #[tokio::test]
    async fn test_classify_same_chain_is_swap() {
        let body = json!({
            "currencyIn": currency_json(1, 0xa1),
            "currencyOut": currency_json(1, 0xb1),
        });
        let (status, body) = send(app(MockCallEncoder::new()), "POST", "/classify", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transactionType"]["type"], "SWAP");
    }

    #[tokio::test]
    async fn test_classify_without_route_is_null() {
        let body = json!({
            "currencyIn": currency_json(1, 0xa1),
            "currencyOut": currency_json(10, 0xb1),
        });
        let (_, body) = send(app(MockCallEncoder::new()), "POST", "/classify", Some(body)).await;
        assert_eq!(body["transactionType"], Value::Null);
    }

    #[tokio::test]
    async fn test_execute_without_route_is_unprocessable() {
        let body = json!({
            "currencyIn": currency_json(1, 0xa1),
            "currencyOut": currency_json(10, 0xb1),
            "amountIn": "0x3e8",
        });
        let (status, body) = send(app(MockCallEncoder::new()), "POST", "/execute", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("No route"));
    }

    #[tokio::test]
    async fn test_modal_toggle_and_reset() {
        let app = app(MockCallEncoder::new());

        let (_, body) = send(app.clone(), "POST", "/progress/modal", Some(json!({ "open": true }))).await;
        assert_eq!(body["changed"], true);

        let (status, _) = send(app.clone(), "POST", "/reset", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(app, "GET", "/progress", None).await;
        assert_eq!(body["modalOpen"], false);
    }

    #[tokio::test]
    async fn test_plan_reports_disabled_action_as_null() {
        let body = json!({
            "currencyIn": currency_json(1, 0xa1),
            "currencyOut": null,
        });
        let (status, body) = send(app(MockCallEncoder::new()), "POST", "/plan", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], Value::Null);
    }
}
