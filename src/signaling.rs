//! # Signaling Adapter
//!
//! A single `POST /api/offer` route: hands the offer to the transport,
//! reads back the local SDP (with the `a=setup:actpass` → `a=setup:active`
//! rewrite already applied by the transport), and returns it as the answer
//! (SPEC_FULL §4.7, §6).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::transport::PeerTransport;

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone)]
pub struct SignalingState {
    pub transport: Arc<PeerTransport>,
}

pub fn router(state: SignalingState) -> Router {
    Router::new()
        .route("/api/offer", post(handle_offer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_offer(
    State(state): State<SignalingState>,
    Json(body): Json<OfferRequest>,
) -> Response {
    if body.kind != "offer" {
        return (StatusCode::BAD_REQUEST, "expected type=offer").into_response();
    }
    let transport = Arc::clone(&state.transport);
    let sdp = body.sdp;
    let result = tokio::task::spawn_blocking(move || transport.handle_offer(&sdp)).await;

    match result {
        Ok(Ok(answer_sdp)) => Json(AnswerResponse {
            sdp: answer_sdp,
            kind: "answer".to_string(),
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "offer handling failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "offer task panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
