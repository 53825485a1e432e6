use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::{header::ORIGIN, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::iperf3::{launch_and_run, Iperf3Params, RawIperf3Params, WebSocketSink};
use crate::web::{AppError, AppState};

fn validated_params(raw: RawIperf3Params) -> Result<Iperf3Params, AppError> {
    let params = Iperf3Params::from_raw(raw);
    if params.host.trim().is_empty() {
        return Err(AppError::InvalidInput("host is required".to_string()));
    }
    Ok(params)
}

/// Runs a measurement and answers once it is complete.
async fn iperf3_handler(
    State(app_state): State<Arc<AppState>>,
    Form(raw): Form<RawIperf3Params>,
) -> Result<Json<Value>, AppError> {
    let params = validated_params(raw)?;
    let result = launch_and_run(&params, &app_state.config.iperf3_path, None).await?;
    Ok(Json(json!({ "success": true, "data": result })))
}

/// Upgrades to a WebSocket that streams samples while the measurement runs.
async fn iperf3_ws_handler(
    State(app_state): State<Arc<AppState>>,
    Query(raw): Query<RawIperf3Params>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !app_state.config.websocket.accepts(origin) {
        warn!(?origin, "Rejected WebSocket origin.");
        return AppError::Forbidden("origin not allowed".to_string()).into_response();
    }
    let params = match validated_params(raw) {
        Ok(params) => params,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(error = %rejection, "WebSocket upgrade error.");
            return rejection.into_response();
        }
    };

    info!(host = %params.host, "Upgrading connection to WebSocket for iperf3.");
    let iperf3_path = app_state.config.iperf3_path.clone();
    ws.on_upgrade(move |socket| async move {
        let sink = Box::new(WebSocketSink::new(socket));
        if let Err(e) = launch_and_run(&params, &iperf3_path, Some(sink)).await {
            error!(error = %e, "iperf3 error.");
        }
    })
}

pub fn iperf3_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/iperf3", post(iperf3_handler))
        .route("/iperf3/ws", get(iperf3_ws_handler))
}
