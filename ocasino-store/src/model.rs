use chrono::{DateTime, Utc};
use ocasino_common::ids::{AlertId, ApiKeyId, PartnerId, PlayerId, ReferenceId, TransactionId, WalletId};
use ocasino_common::money::{Amount, Currency};
use serde::{Deserialize, Serialize};

/// A business client of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub code: String,
    pub status: PartnerStatus,
    /// Exact addresses or CIDR ranges; empty means "no IP restriction".
    pub permitted_ips: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Partner {
    pub fn is_active(&self) -> bool {
        matches!(self.status, PartnerStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub partner_id: PartnerId,
    /// SHA-256 digest of the raw key (`ocasino_crypto::hash::lookup_hash`), used
    /// to look the key up by exact match in O(1) on the auth hot path. The raw
    /// key itself is never stored. Argon2id (`hash_secret`/`verify_secret`) is
    /// kept in `ocasino-crypto` as an ambient capability but is not on this
    /// lookup path: its per-call salt means the same raw key hashes to a
    /// different digest every time, which rules out indexed lookup.
    pub key_hash: String,
    pub permissions: Vec<String>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub currency: Currency,
    pub balance: Amount,
    pub active: bool,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    Refund,
    Rollback,
    Adjustment,
    Commission,
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Canceled,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Canceled)
    }
}

/// A single append-only ledger entry. `player_id` is carried directly rather
/// than requiring a join through `Wallet`, since `TransactionRepo::list_by_player`
/// is a primary AML access path and should not need the wallet table to
/// answer it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference_id: ReferenceId,
    pub wallet_id: WalletId,
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub tx_type: TransactionType,
    /// nonce||ciphertext blob produced by `AmountCipher`; never the plaintext minor units.
    pub encrypted_amount: String,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub original_balance: Amount,
    pub updated_balance: Amount,
    pub original_transaction_id: Option<TransactionId>,
    pub game_id: Option<String>,
    pub game_session_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AMLRiskProfile {
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub deposit_count_7d: u32,
    pub deposit_sum_7d: i64,
    pub withdrawal_count_7d: u32,
    pub withdrawal_sum_7d: i64,
    pub deposit_count_30d: u32,
    pub deposit_sum_30d: i64,
    pub withdrawal_count_30d: u32,
    pub withdrawal_sum_30d: i64,
    pub last_calculated_at: DateTime<Utc>,
    pub risk_factors: serde_json::Value,
}

impl AMLRiskProfile {
    pub fn new(player_id: PlayerId, partner_id: PartnerId, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            partner_id,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            deposit_count_7d: 0,
            deposit_sum_7d: 0,
            withdrawal_count_7d: 0,
            withdrawal_sum_7d: 0,
            deposit_count_30d: 0,
            deposit_sum_30d: 0,
            withdrawal_count_30d: 0,
            withdrawal_sum_30d: 0,
            last_calculated_at: now,
            risk_factors: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    Threshold,
    Pattern,
    Blacklist,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Open,
    Investigating,
    PendingReport,
    Reported,
    ClosedFalsePositive,
    ClosedConfirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AMLAlert {
    pub id: AlertId,
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub transaction_id: Option<TransactionId>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub score_at_alert: f64,
    pub factors_at_alert: serde_json::Value,
    pub report_required: bool,
    pub created_at: DateTime<Utc>,
}

/// An event that could not be delivered to its subscribers after the bounded
/// retry policy was exhausted, persisted for operator replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: uuid::Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub failure_reason: String,
    pub created_at: DateTime<Utc>,
}
