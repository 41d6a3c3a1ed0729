use chrono::{DateTime, Utc};
use ocasino_common::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /wallet/{player}/deposit` and `/withdraw`:
/// both endpoints accept the same shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MoneyMovementRequest {
    pub reference_id: String,
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BetRequest {
    pub reference_id: String,
    pub amount: String,
    pub currency: String,
    pub game_id: String,
    #[serde(default)]
    pub round_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WinRequest {
    pub reference_id: String,
    pub amount: String,
    pub currency: String,
    pub game_id: String,
    #[serde(default)]
    pub related_bet_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RollbackRequest {
    pub reference_id: String,
    pub original_reference_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Shared result shape for deposit/withdraw/bet/win/rollback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WalletOperationData {
    pub transaction_id: String,
    pub amount: String,
    pub balance: String,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BalanceData {
    pub balance: String,
    pub currency: String,
    pub partner_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self { success: true, data, message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorEnvelope {
    pub success: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Builds the `{ success: false, error: {...} }` envelope plus the HTTP
/// status a caller should send it with.
pub fn error_envelope(err: &ocasino_common::PlatformError) -> (u16, ApiErrorEnvelope) {
    let code: ErrorCode = err.code;
    let envelope = ApiErrorEnvelope {
        success: false,
        error: ApiErrorBody { code: code.as_str(), message: err.message.clone(), details: err.details.clone() },
    };
    (code.http_status(), envelope)
}
