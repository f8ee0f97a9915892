//! HTTP routes

use crate::error::ApiError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use timelock_api::{
    DecryptCustomRequest, DecryptRequest, DecryptWithTimeRequest, DecryptionKeyQuery,
    DecryptionKeyResponse, EncryptCustomRequest, EncryptRequest, EncryptResponse,
    EncryptWithTimeRequest, EonKeyResponse, EpochPublicKeyResponse, HealthResponse,
    MessageResponse,
};
use timelock_core::primitives::{g1_to_bytes, g2_to_bytes};
use timelock_core::timelock::parse_identifier;
use timelock_core::{EncryptedMessage, EpochIdentifier, EpochMode, Error, TimeLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state
pub struct AppState {
    pub timelock: TimeLock,
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router for the configured epoch mode
pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/eon-key", get(eon_key))
        .route("/decryption-key", get(decryption_key))
        .route("/epoch-public-key", get(epoch_public_key));

    let routes = match state.timelock.mode() {
        EpochMode::Explicit => routes
            .route("/encrypt/with_time", post(encrypt_with_time))
            .route("/encrypt/custom", post(encrypt_custom))
            .route("/decrypt/with_time", post(decrypt_with_time))
            .route("/decrypt/custom", post(decrypt_custom)),
        EpochMode::Auto { .. } => routes
            .route("/encrypt", post(encrypt))
            .route("/decrypt", post(decrypt)),
    };

    routes
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "service": "timelock-svc",
        "epoch_mode": state.timelock.mode().as_str(),
    }))
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: "timelock-svc".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn eon_key(State(state): State<Arc<AppState>>) -> ApiResult<EonKeyResponse> {
    let timelock = &state.timelock;
    let source = timelock.keys().source();
    let delay = timelock.mode().delay();

    Ok(Json(EonKeyResponse {
        eon_public_key: hex::encode(g2_to_bytes(timelock.master_public_key())),
        threshold: source.threshold(),
        participants: source.n_participants(),
        qualified: source.qualified().iter().copied().collect(),
        epoch_mode: timelock.mode().as_str().into(),
        epoch_delay: delay,
        epoch_duration: delay,
        current_epoch: timelock.current_epoch()?.map(|epoch| epoch.identifier()),
    }))
}

/// The one way a key query may name an epoch in the current mode
enum RequestedEpoch {
    At(i64),
    Identity(String),
    Identifier(String),
}

impl RequestedEpoch {
    fn from_query(mode: EpochMode, query: DecryptionKeyQuery) -> Result<Self, ApiError> {
        match (mode, query) {
            (
                EpochMode::Explicit,
                DecryptionKeyQuery {
                    timestamp: Some(timestamp),
                    epoch_id: None,
                    identifier: None,
                },
            ) => Ok(Self::At(timestamp)),
            (
                EpochMode::Explicit,
                DecryptionKeyQuery {
                    timestamp: None,
                    epoch_id: Some(epoch_id),
                    identifier: None,
                },
            ) => Ok(Self::Identity(epoch_id)),
            (
                EpochMode::Auto { .. },
                DecryptionKeyQuery {
                    timestamp: None,
                    epoch_id: None,
                    identifier: Some(identifier),
                },
            ) => Ok(Self::Identifier(identifier)),
            (EpochMode::Explicit, _) => Err(ApiError::malformed(
                "expected exactly one of timestamp or epoch_id",
            )),
            (EpochMode::Auto { .. }, _) => Err(ApiError::malformed("expected an identifier")),
        }
    }

    fn identifier(&self) -> timelock_core::Result<EpochIdentifier> {
        match self {
            Self::At(timestamp) => EpochIdentifier::from_timestamp(*timestamp),
            Self::Identity(epoch_id) => Ok(EpochIdentifier::from_raw(epoch_id.as_str())),
            Self::Identifier(identifier) => {
                EpochIdentifier::from_timestamp(parse_identifier(identifier)?)
            }
        }
    }
}

async fn decryption_key(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DecryptionKeyQuery>, QueryRejection>,
) -> ApiResult<DecryptionKeyResponse> {
    let Query(query) = query?;
    let requested = RequestedEpoch::from_query(state.timelock.mode(), query)?;

    let (identifier, key) = blocking(&state, move |timelock| match requested {
        RequestedEpoch::At(timestamp) => timelock.release_key_at(timestamp),
        RequestedEpoch::Identity(epoch_id) => timelock.release_key_for_identity(&epoch_id),
        RequestedEpoch::Identifier(identifier) => timelock.release_key_for_identifier(&identifier),
    })
    .await?;

    info!(identifier = %identifier, "Released epoch key");

    Ok(Json(DecryptionKeyResponse {
        epoch_secret_key: key.to_hex(),
        identifier: identifier.to_hex(),
    }))
}

/// Public key of an epoch; no time policy applies
async fn epoch_public_key(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DecryptionKeyQuery>, QueryRejection>,
) -> ApiResult<EpochPublicKeyResponse> {
    let Query(query) = query?;
    let identifier = RequestedEpoch::from_query(state.timelock.mode(), query)?.identifier()?;

    Ok(Json(EpochPublicKeyResponse {
        epoch_public_key: hex::encode(g1_to_bytes(identifier.identity().point())),
        identifier: identifier.to_hex(),
    }))
}

async fn encrypt_with_time(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EncryptWithTimeRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(req) = body?;
    let ciphertext = blocking(&state, move |timelock| {
        timelock.encrypt_at(req.cypher_text.as_bytes(), req.timestamp)
    })
    .await?;
    Ok(Json(MessageResponse {
        message: ciphertext.to_hex(),
    }))
}

async fn encrypt_custom(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EncryptCustomRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(req) = body?;
    let ciphertext = blocking(&state, move |timelock| {
        timelock.encrypt_for_identity(req.cypher_text.as_bytes(), &req.epoch_id)
    })
    .await?;
    Ok(Json(MessageResponse {
        message: ciphertext.to_hex(),
    }))
}

async fn encrypt(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EncryptRequest>, JsonRejection>,
) -> ApiResult<EncryptResponse> {
    let Json(req) = body?;
    let (ciphertext, identifier) = blocking(&state, move |timelock| {
        timelock.encrypt_current(req.cypher_text.as_bytes())
    })
    .await?;
    Ok(Json(EncryptResponse {
        message: ciphertext.to_hex(),
        identifier,
    }))
}

async fn decrypt_with_time(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DecryptWithTimeRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(req) = body?;
    let ciphertext = EncryptedMessage::from_hex(&req.encrypted_msg)?;
    let message = blocking(&state, move |timelock| {
        timelock.decrypt_at(&ciphertext, req.timestamp)
    })
    .await?;
    Ok(plaintext(message))
}

async fn decrypt_custom(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DecryptCustomRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(req) = body?;
    let ciphertext = EncryptedMessage::from_hex(&req.encrypted_msg)?;
    let message = blocking(&state, move |timelock| {
        timelock.decrypt_for_identity(&ciphertext, &req.epoch_id)
    })
    .await?;
    Ok(plaintext(message))
}

async fn decrypt(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DecryptRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(req) = body?;
    let ciphertext = EncryptedMessage::from_hex(&req.encrypted_msg)?;
    let message = blocking(&state, move |timelock| {
        timelock.decrypt_identifier(&ciphertext, &req.identifier)
    })
    .await?;
    Ok(plaintext(message))
}

/// Run pairing work on the blocking pool so it does not stall the reactor
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&TimeLock) -> timelock_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || work(&state.timelock))
        .await
        .map_err(|e| Error::Internal(format!("worker task failed: {}", e)))?;
    Ok(result?)
}

fn plaintext(message: Vec<u8>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: String::from_utf8_lossy(&message).into_owned(),
    })
}
