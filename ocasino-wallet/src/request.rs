use ocasino_common::ids::{PartnerId, PlayerId, ReferenceId};
use ocasino_common::money::{Amount, Currency};
use ocasino_store::model::{TransactionStatus, TransactionType};

/// The operation an incoming call asks the engine to perform. Maps
/// 1:1 onto `TransactionType` except that `Adjustment` carries its own
/// direction, since the stored amount is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOp {
    Deposit,
    Withdraw,
    Bet,
    Win,
    Rollback,
    Refund,
    Adjustment(AdjustmentDirection),
    Commission,
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentDirection {
    Credit,
    Debit,
}

impl WalletOp {
    pub fn transaction_type(self) -> TransactionType {
        match self {
            WalletOp::Deposit => TransactionType::Deposit,
            WalletOp::Withdraw => TransactionType::Withdrawal,
            WalletOp::Bet => TransactionType::Bet,
            WalletOp::Win => TransactionType::Win,
            WalletOp::Rollback => TransactionType::Rollback,
            WalletOp::Refund => TransactionType::Refund,
            WalletOp::Adjustment(_) => TransactionType::Adjustment,
            WalletOp::Commission => TransactionType::Commission,
            WalletOp::Bonus => TransactionType::Bonus,
        }
    }

    /// These four are gated behind `wallet:admin` and never reachable from
    /// the five partner-facing endpoints.
    pub fn requires_admin_permission(self) -> bool {
        matches!(self, WalletOp::Refund | WalletOp::Adjustment(_) | WalletOp::Commission | WalletOp::Bonus)
    }

    /// Only these four operations check the wallet's `locked` flag.
    pub fn respects_wallet_lock(self) -> bool {
        matches!(self, WalletOp::Deposit | WalletOp::Withdraw | WalletOp::Bet | WalletOp::Win)
    }
}

#[derive(Debug, Clone)]
pub struct WalletOpRequest {
    pub partner_id: PartnerId,
    pub player_id: PlayerId,
    pub reference_id: ReferenceId,
    pub amount: Amount,
    pub currency: Currency,
    pub game_id: Option<String>,
    pub game_session_id: Option<String>,
    /// Required for `Rollback` and meaningful for `Refund` (the transaction it
    /// refunds, for audit purposes only).
    pub original_reference_id: Option<ReferenceId>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletOpResult {
    pub transaction_id: ocasino_common::ids::TransactionId,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    /// The magnitude of this transaction's own balance delta — distinct from
    /// `updated_balance`. For a rollback this is the reversed amount, not the
    /// request's placeholder amount.
    pub amount: Amount,
    pub updated_balance: Amount,
    pub currency: Currency,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
