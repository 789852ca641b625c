use secp256k1::Error as SecpError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    Unauthorized,
    DecryptionFailure,
    PublishFailure,
    InvariantViolation,
    EventIdMismatch,
    EventSignatureInvalid,
    UnknownIndex,
    SharedKeyUnresolved,
    InvalidPublicKey,
    CryptoError,
    SerializationError,
    EncodingError,
    TransportError,
    WalletError,
    ConfigError,
    Message,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("unauthorized {action} by {author}")]
    Unauthorized { action: &'static str, author: String },

    #[error("decryption failed: {details}")]
    DecryptionFailure { details: String },

    #[error("publish failed on all relays: {details}")]
    PublishFailure { details: String },

    #[error("invariant violation: {details}")]
    InvariantViolation { details: String },

    #[error("event id mismatch: claimed={claimed} computed={computed}")]
    EventIdMismatch { claimed: String, computed: String },

    #[error("event signature verification failed for {id}")]
    EventSignatureInvalid { id: String },

    #[error("unknown index: {index}")]
    UnknownIndex { index: &'static str },

    #[error("shared key unresolved for policy {policy_id}")]
    SharedKeyUnresolved { policy_id: String },

    #[error("invalid public key: {details}")]
    InvalidPublicKey { details: String },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: &'static str, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: &'static str, details: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: &'static str, details: String },

    #[error("wallet error: {0}")]
    WalletError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

impl VaultError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VaultError::NotFound { .. } => ErrorCode::NotFound,
            VaultError::Unauthorized { .. } => ErrorCode::Unauthorized,
            VaultError::DecryptionFailure { .. } => ErrorCode::DecryptionFailure,
            VaultError::PublishFailure { .. } => ErrorCode::PublishFailure,
            VaultError::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            VaultError::EventIdMismatch { .. } => ErrorCode::EventIdMismatch,
            VaultError::EventSignatureInvalid { .. } => ErrorCode::EventSignatureInvalid,
            VaultError::UnknownIndex { .. } => ErrorCode::UnknownIndex,
            VaultError::SharedKeyUnresolved { .. } => ErrorCode::SharedKeyUnresolved,
            VaultError::InvalidPublicKey { .. } => ErrorCode::InvalidPublicKey,
            VaultError::CryptoError { .. } => ErrorCode::CryptoError,
            VaultError::SerializationError { .. } => ErrorCode::SerializationError,
            VaultError::EncodingError(_) => ErrorCode::EncodingError,
            VaultError::TransportError { .. } => ErrorCode::TransportError,
            VaultError::WalletError(_) => ErrorCode::WalletError,
            VaultError::ConfigError(_) => ErrorCode::ConfigError,
            VaultError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext { code: self.code(), message: self.to_string() }
    }

    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        VaultError::NotFound { what, id: id.to_string() }
    }

    pub fn unauthorized(action: &'static str, author: impl ToString) -> Self {
        VaultError::Unauthorized { action, author: author.to_string() }
    }

    pub fn invariant(details: impl Into<String>) -> Self {
        VaultError::InvariantViolation { details: details.into() }
    }

    pub fn decryption(details: impl Into<String>) -> Self {
        VaultError::DecryptionFailure { details: details.into() }
    }
}

impl From<hex::FromHexError> for VaultError {
    fn from(err: hex::FromHexError) -> Self {
        VaultError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<bincode::Error> for VaultError {
    fn from(err: bincode::Error) -> Self {
        VaultError::SerializationError { format: "bincode", details: err.to_string() }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError { format: "json", details: err.to_string() }
    }
}

impl From<SecpError> for VaultError {
    fn from(err: SecpError) -> Self {
        VaultError::CryptoError { operation: "secp256k1", details: err.to_string() }
    }
}

impl From<chacha20poly1305::Error> for VaultError {
    fn from(_: chacha20poly1305::Error) -> Self {
        VaultError::DecryptionFailure { details: "aead rejected ciphertext".to_string() }
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `VaultError` variants at the call site to preserve context.
