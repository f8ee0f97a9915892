//! Time-Lock Client
//!
//! Client library for the time-lock service. Besides one method per
//! endpoint it can fetch a released epoch key, check it against the eon key
//! and decrypt locally ([`TimelockClient::open`]).

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use timelock_api::{
    DecryptCustomRequest, DecryptRequest, DecryptWithTimeRequest, DecryptionKeyQuery,
    DecryptionKeyResponse, EncryptCustomRequest, EncryptRequest, EncryptResponse,
    EncryptWithTimeRequest, EonKeyResponse, EpochPublicKeyResponse, ErrorBody, HealthResponse,
    MessageResponse,
};
use timelock_core::primitives::g2_from_bytes;
use timelock_core::{verify_epoch_secret_key, EncryptedMessage, EpochIdentifier, EpochSecretKey};
use tracing::{debug, instrument};

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request never got a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service rejected the request
    #[error("{cause}: {message}")]
    Api { cause: String, message: String },

    /// Non-success status without an error body
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Released key does not belong to the eon key and epoch
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Local decoding or decryption failed
    #[error(transparent)]
    Core(#[from] timelock_core::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// HTTP client for the time-lock service
#[derive(Clone)]
pub struct TimelockClient {
    /// HTTP client
    client: Client,
    /// Service URL
    url: String,
    /// Request timeout
    timeout: Duration,
}

impl TimelockClient {
    /// Create a new client
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health", &()).await
    }

    /// Eon key and DKG parameters
    pub async fn eon_key(&self) -> Result<EonKeyResponse> {
        self.get("/eon-key", &()).await
    }

    /// Encrypt to a timestamp epoch; returns the hex ciphertext
    pub async fn encrypt_with_time(&self, plaintext: &str, timestamp: i64) -> Result<String> {
        let req = EncryptWithTimeRequest {
            cypher_text: plaintext.to_string(),
            timestamp,
        };
        let resp: MessageResponse = self.post("/encrypt/with_time", &req).await?;
        Ok(resp.message)
    }

    /// Encrypt to a custom identity; returns the hex ciphertext
    pub async fn encrypt_custom(&self, plaintext: &str, epoch_id: &str) -> Result<String> {
        let req = EncryptCustomRequest {
            cypher_text: plaintext.to_string(),
            epoch_id: epoch_id.to_string(),
        };
        let resp: MessageResponse = self.post("/encrypt/custom", &req).await?;
        Ok(resp.message)
    }

    /// Encrypt to the service's current epoch (auto mode)
    pub async fn encrypt(&self, plaintext: &str) -> Result<EncryptResponse> {
        let req = EncryptRequest {
            cypher_text: plaintext.to_string(),
        };
        self.post("/encrypt", &req).await
    }

    pub async fn decrypt_with_time(&self, ciphertext: &str, timestamp: i64) -> Result<String> {
        let req = DecryptWithTimeRequest {
            encrypted_msg: ciphertext.to_string(),
            timestamp,
        };
        let resp: MessageResponse = self.post("/decrypt/with_time", &req).await?;
        Ok(resp.message)
    }

    pub async fn decrypt_custom(&self, ciphertext: &str, epoch_id: &str) -> Result<String> {
        let req = DecryptCustomRequest {
            encrypted_msg: ciphertext.to_string(),
            epoch_id: epoch_id.to_string(),
        };
        let resp: MessageResponse = self.post("/decrypt/custom", &req).await?;
        Ok(resp.message)
    }

    /// Decrypt an auto-mode ciphertext
    pub async fn decrypt(&self, ciphertext: &str, identifier: &str) -> Result<String> {
        let req = DecryptRequest {
            encrypted_msg: ciphertext.to_string(),
            identifier: identifier.to_string(),
        };
        let resp: MessageResponse = self.post("/decrypt", &req).await?;
        Ok(resp.message)
    }

    /// Fetch a released epoch key
    pub async fn decryption_key(&self, query: &DecryptionKeyQuery) -> Result<DecryptionKeyResponse> {
        self.get("/decryption-key", query).await
    }

    /// Fetch the public key of any epoch, past or future
    pub async fn epoch_public_key(&self, query: &DecryptionKeyQuery) -> Result<EpochPublicKeyResponse> {
        self.get("/epoch-public-key", query).await
    }

    /// Fetch the epoch key, verify it against the eon key and decrypt locally
    #[instrument(skip(self, ciphertext))]
    pub async fn open(&self, ciphertext: &str, query: &DecryptionKeyQuery) -> Result<Vec<u8>> {
        let ciphertext = EncryptedMessage::from_hex(ciphertext)?;
        let eon = self.eon_key().await?;
        let released = self.decryption_key(query).await?;

        let eon_key = g2_from_bytes(&decode_hex(&eon.eon_public_key)?)?;
        let identifier = EpochIdentifier::from_raw(decode_hex(&released.identifier)?);
        let key = EpochSecretKey::from_hex(&released.epoch_secret_key)?;

        if !verify_epoch_secret_key(&key, &eon_key, &identifier.identity()) {
            return Err(ClientError::Verification(format!(
                "key for {} does not match the eon key",
                identifier
            )));
        }

        debug!(identifier = %identifier, "Epoch key verified");
        Ok(ciphertext.decrypt(&key)?)
    }

    #[instrument(skip(self, body))]
    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        parse(response).await
    }

    #[instrument(skip(self, query))]
    async fn get<Q: Serialize, Resp: DeserializeOwned>(&self, path: &str, query: &Q) -> Result<Resp> {
        let response = self
            .client
            .get(format!("{}{}", self.url, path))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        parse(response).await
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| ClientError::Core(e.into()))
}

async fn parse<Resp: DeserializeOwned>(response: Response) -> Result<Resp> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => Err(ClientError::Api {
            cause: error.cause,
            message: error.message,
        }),
        Err(_) => Err(ClientError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}
