use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The deterministic error taxonomy every auth/wallet/AML failure maps onto.
///
/// The HTTP surface (out of scope here) is the only place that turns these into
/// status codes; everything below the HTTP layer works with `PlatformError` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    IpNotAllowed,
    PermissionDenied,
    RateLimited,
    NotFound,
    InvalidAmount,
    CurrencyMismatch,
    InsufficientFunds,
    IdempotencyConflict,
    AlreadyRolledBack,
    WalletLocked,
    DeadlineExceeded,
    DependencyUnavailable,
    Internal,
}

impl ErrorCode {
    /// The HTTP status this code maps to. Lives here, not in the HTTP crate,
    /// since every layer wants to know "is this a client error or ours" without
    /// depending on an HTTP type.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Unauthenticated => 401,
            ErrorCode::IpNotAllowed => 403,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::RateLimited => 429,
            ErrorCode::NotFound => 404,
            ErrorCode::InvalidAmount => 422,
            ErrorCode::CurrencyMismatch => 422,
            ErrorCode::InsufficientFunds => 422,
            ErrorCode::IdempotencyConflict => 409,
            ErrorCode::AlreadyRolledBack => 409,
            ErrorCode::WalletLocked => 423,
            ErrorCode::DeadlineExceeded => 504,
            ErrorCode::DependencyUnavailable => 503,
            ErrorCode::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::IpNotAllowed => "ip-not-allowed",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::RateLimited => "rate-limited",
            ErrorCode::NotFound => "not-found",
            ErrorCode::InvalidAmount => "invalid-amount",
            ErrorCode::CurrencyMismatch => "currency-mismatch",
            ErrorCode::InsufficientFunds => "insufficient-funds",
            ErrorCode::IdempotencyConflict => "idempotency-conflict",
            ErrorCode::AlreadyRolledBack => "already-rolled-back",
            ErrorCode::WalletLocked => "wallet-locked",
            ErrorCode::DeadlineExceeded => "deadline-exceeded",
            ErrorCode::DependencyUnavailable => "dependency-unavailable",
            ErrorCode::Internal => "internal",
        }
    }
}

/// A typed, loggable platform error. Every fallible operation in the wallet, auth
/// and AML modules returns this (or a `Result` alias over it) instead of a bare
/// string, so the error taxonomy is a projection of the type, not a guess based on
/// a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub trace_id: Uuid,
}

impl PlatformError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            trace_id: Uuid::new_v4(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn ip_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IpNotAllowed, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAmount, message)
    }

    pub fn currency_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CurrencyMismatch, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientFunds, message)
    }

    pub fn idempotency_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IdempotencyConflict, message)
    }

    pub fn already_rolled_back(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyRolledBack, message)
    }

    pub fn wallet_locked(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WalletLocked, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, message)
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (trace={})", self.code.as_str(), self.message, self.trace_id)
    }
}

impl std::error::Error for PlatformError {}

pub type Result<T> = std::result::Result<T, PlatformError>;
