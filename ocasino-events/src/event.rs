use chrono::{DateTime, Utc};
use ocasino_common::ids::{AlertId, PartnerId, PlayerId, TransactionId, WalletId};
use ocasino_common::money::{Amount, Currency};
use ocasino_store::model::{AlertSeverity, AlertType, TransactionType};
use serde::{Deserialize, Serialize};

/// The two topics the platform publishes today. New topics are added as new
/// enum variants, not as ad hoc string constants, so a subscriber's
/// `topics()` list is checked by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    WalletTransactionCreated,
    AmlAlertCreated,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::WalletTransactionCreated => "wallet.transaction.created",
            Topic::AmlAlertCreated => "aml.alert.created",
        }
    }
}

/// Published once a wallet transaction commits. Carries the plain
/// amount (not the encrypted-at-rest blob) since subscribers — today, only the
/// AML analyzer — need the value to compute risk factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransactionCreatedEvent {
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub tx_type: TransactionType,
    pub currency: Currency,
    pub amount: Amount,
    pub updated_balance: Amount,
    pub game_id: Option<String>,
    pub game_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmlAlertCreatedEvent {
    pub alert_id: AlertId,
    pub player_id: PlayerId,
    pub partner_id: PartnerId,
    pub transaction_id: Option<TransactionId>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub score_at_alert: f64,
    pub report_required: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum DomainEvent {
    WalletTransactionCreated(WalletTransactionCreatedEvent),
    AmlAlertCreated(AmlAlertCreatedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            DomainEvent::WalletTransactionCreated(_) => Topic::WalletTransactionCreated,
            DomainEvent::AmlAlertCreated(_) => Topic::AmlAlertCreated,
        }
    }

    /// The key used for per-player worker affinity: events for the
    /// same player route to the same single-threaded worker so ordering is
    /// preserved.
    pub fn player_id(&self) -> &PlayerId {
        match self {
            DomainEvent::WalletTransactionCreated(e) => &e.player_id,
            DomainEvent::AmlAlertCreated(e) => &e.player_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DomainEvent::WalletTransactionCreated(e) => serde_json::to_value(e).unwrap_or(serde_json::Value::Null),
            DomainEvent::AmlAlertCreated(e) => serde_json::to_value(e).unwrap_or(serde_json::Value::Null),
        }
    }
}
