/// REST API routes for document anchoring.
///
/// Verification routes are public; everything that reveals or creates
/// anchor records requires a bearer token and an ownership check.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{error_response, ApiError};
use super::middleware::AuthUser;
use super::AppState;
use crate::merkle::ProofStep;
use crate::service::{AnchorView, BatchReceipt, Verification};
use crate::state::models::{AnchorKind, AnchorRecord, AnchorStats, Certificate};

// ─── Health ──────────────────────────────────────────────

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Anchors ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateAnchorRequest {
    subject_ref: Option<Uuid>,
    document_hash: String,
}

/// POST /api/anchors: 201 for a new anchor, 200 when an existing one is returned.
async fn create_anchor(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAnchorRequest>,
) -> Result<(StatusCode, Json<AnchorRecord>), ApiError> {
    user.authorize(&state, req.subject_ref).await?;

    let outcome = state
        .service
        .create_anchor(req.subject_ref, &req.document_hash)
        .await
        .map_err(error_response)?;

    let status = if outcome.is_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into_record())))
}

/// Load an anchor and check the caller may see it.
async fn authorized_anchor(
    user: &AuthUser,
    state: &AppState,
    id: Uuid,
) -> Result<AnchorRecord, ApiError> {
    let record = state.service.find_anchor(id).await.map_err(error_response)?;
    user.authorize(state, record.subject_ref()).await?;
    Ok(record)
}

/// GET /api/anchors/{id}
async fn get_anchor(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnchorView>, ApiError> {
    authorized_anchor(&user, &state, id).await?;
    let view = state.service.get_anchor(id).await.map_err(error_response)?;
    Ok(Json(view))
}

/// GET /api/anchors/{id}/certificate
async fn get_certificate(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Certificate>, ApiError> {
    authorized_anchor(&user, &state, id).await?;
    let certificate = state.issuer.issue_or_get(id).await.map_err(error_response)?;
    Ok(Json(certificate))
}

/// GET /api/anchors/{id}/certificate/document
async fn render_certificate(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authorized_anchor(&user, &state, id).await?;
    let doc = state.issuer.render(id).await.map_err(error_response)?;

    Ok((
        [
            (header::CONTENT_TYPE, doc.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", doc.file_name),
            ),
        ],
        doc.body,
    ))
}

/// GET /api/subjects/{subject_ref}/anchors
async fn list_subject_anchors(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(subject_ref): Path<Uuid>,
) -> Result<Json<Vec<AnchorRecord>>, ApiError> {
    user.authorize(&state, Some(subject_ref)).await?;
    let anchors = state
        .service
        .list_subject_anchors(subject_ref)
        .await
        .map_err(error_response)?;
    Ok(Json(anchors))
}

/// GET /api/stats
async fn stats(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnchorStats>, ApiError> {
    let stats = state.service.stats().await.map_err(error_response)?;
    Ok(Json(stats))
}

pub fn anchor_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/anchors", post(create_anchor))
        .route("/api/anchors/{id}", get(get_anchor))
        .route("/api/anchors/{id}/certificate", get(get_certificate))
        .route(
            "/api/anchors/{id}/certificate/document",
            get(render_certificate),
        )
        .route("/api/subjects/{subject_ref}/anchors", get(list_subject_anchors))
        .route("/api/stats", get(stats))
}

// ─── Batches ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateBatchRequest {
    document_hashes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    batch_id: String,
    merkle_root: Option<String>,
    anchors: Vec<AnchorRecord>,
}

/// POST /api/batches
async fn create_batch(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<BatchReceipt>), ApiError> {
    let receipt = state
        .service
        .create_batch(&req.document_hashes)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/batches/{batch_id}
async fn get_batch(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let anchors = state
        .service
        .get_batch(&batch_id)
        .await
        .map_err(error_response)?;

    let merkle_root = anchors.first().and_then(|a| match &a.kind {
        AnchorKind::BatchMember { merkle_root, .. } => {
            Some(merkle_root.clone())
        }
        _ => None,
    });

    Ok(Json(BatchResponse {
        batch_id,
        merkle_root,
        anchors,
    }))
}

pub fn batch_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/batches", post(create_batch))
        .route("/api/batches/{batch_id}", get(get_batch))
}

// ─── Verification (public) ───────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    document_hash: String,
}

/// POST /api/verify
async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Verification>, ApiError> {
    let verification = state
        .service
        .verify(&req.document_hash)
        .await
        .map_err(error_response)?;
    Ok(Json(verification))
}

/// GET /verify/{anchor_id}: the link printed on certificates.
async fn verify_anchor(
    State(state): State<Arc<AppState>>,
    Path(anchor_id): Path<Uuid>,
) -> Result<Json<Verification>, ApiError> {
    let verification = state
        .service
        .verify_anchor(anchor_id)
        .await
        .map_err(error_response)?;
    Ok(Json(verification))
}

#[derive(Debug, Deserialize)]
struct VerifyProofRequest {
    leaf_hash: String,
    proof: Vec<ProofStep>,
    merkle_root: String,
}

#[derive(Debug, Serialize)]
struct VerifyProofResponse {
    verified: bool,
}

/// POST /api/verify/proof
async fn verify_proof(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyProofRequest>,
) -> Json<VerifyProofResponse> {
    let leaf = req.leaf_hash.trim().to_ascii_lowercase();
    let root = req.merkle_root.trim().to_ascii_lowercase();
    let proof: Vec<ProofStep> = req
        .proof
        .into_iter()
        .map(|step| ProofStep {
            sibling: step.sibling.trim().to_ascii_lowercase(),
            position: step.position,
        })
        .collect();

    Json(VerifyProofResponse {
        verified: state.service.verify_inclusion(&leaf, &proof, &root),
    })
}

pub fn verify_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/verify", post(verify))
        .route("/api/verify/proof", post(verify_proof))
        .route("/verify/{anchor_id}", get(verify_anchor))
}
