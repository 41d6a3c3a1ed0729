use chrono::{DateTime, Duration, Utc};
use ocasino_store::model::{AMLRiskProfile, RiskLevel, TransactionType};

use crate::factors::HistoryEntry;

/// Counters are recomputed from the source history on every analysis rather
/// than incremented in place, so a missed update never leaves them drifting.
/// `history` must exclude the transaction currently being analyzed; it is
/// folded in separately via `current_tx_type`/`current_amount_minor` so the
/// result is correct regardless of whether the store had already persisted
/// the current transaction by the time this ran.
pub struct Counters {
    pub deposit_count_7d: u32,
    pub deposit_sum_7d: i64,
    pub withdrawal_count_7d: u32,
    pub withdrawal_sum_7d: i64,
    pub deposit_count_30d: u32,
    pub deposit_sum_30d: i64,
    pub withdrawal_count_30d: u32,
    pub withdrawal_sum_30d: i64,
}

pub fn recompute_counters(
    history: &[HistoryEntry],
    current_tx_type: TransactionType,
    current_amount_minor: i64,
    current_created_at: DateTime<Utc>,
) -> Counters {
    let mut c = Counters {
        deposit_count_7d: 0,
        deposit_sum_7d: 0,
        withdrawal_count_7d: 0,
        withdrawal_sum_7d: 0,
        deposit_count_30d: 0,
        deposit_sum_30d: 0,
        withdrawal_count_30d: 0,
        withdrawal_sum_30d: 0,
    };

    let seven_days_ago = current_created_at - Duration::days(7);
    let thirty_days_ago = current_created_at - Duration::days(30);

    let mut fold = |tx_type: TransactionType, amount_minor: i64, created_at: DateTime<Utc>| {
        if created_at < thirty_days_ago {
            return;
        }
        let within_7d = created_at >= seven_days_ago;
        match tx_type {
            TransactionType::Deposit => {
                c.deposit_count_30d += 1;
                c.deposit_sum_30d += amount_minor;
                if within_7d {
                    c.deposit_count_7d += 1;
                    c.deposit_sum_7d += amount_minor;
                }
            }
            TransactionType::Withdrawal => {
                c.withdrawal_count_30d += 1;
                c.withdrawal_sum_30d += amount_minor;
                if within_7d {
                    c.withdrawal_count_7d += 1;
                    c.withdrawal_sum_7d += amount_minor;
                }
            }
            _ => {}
        }
    };

    for h in history {
        fold(h.tx.tx_type, h.amount_minor, h.tx.created_at);
    }
    fold(current_tx_type, current_amount_minor, current_created_at);

    c
}

/// `new_score = 0.7 * old_score + 0.3 * current_analysis_score`,
/// clamped to the valid [0, 100] range.
pub fn weighted_update(old_score: f64, current_analysis_score: f64) -> f64 {
    (0.7 * old_score + 0.3 * current_analysis_score).clamp(0.0, 100.0)
}

pub fn apply_update(
    profile: &mut AMLRiskProfile,
    current_analysis_score: f64,
    counters: Counters,
    risk_factors: serde_json::Value,
    now: DateTime<Utc>,
) {
    profile.risk_score = weighted_update(profile.risk_score, current_analysis_score);
    profile.risk_level = RiskLevel::from_score(profile.risk_score);
    profile.deposit_count_7d = counters.deposit_count_7d;
    profile.deposit_sum_7d = counters.deposit_sum_7d;
    profile.withdrawal_count_7d = counters.withdrawal_count_7d;
    profile.withdrawal_sum_7d = counters.withdrawal_sum_7d;
    profile.deposit_count_30d = counters.deposit_count_30d;
    profile.deposit_sum_30d = counters.deposit_sum_30d;
    profile.withdrawal_count_30d = counters.withdrawal_count_30d;
    profile.withdrawal_sum_30d = counters.withdrawal_sum_30d;
    profile.last_calculated_at = now;
    profile.risk_factors = risk_factors;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_update_damps_single_spike() {
        let updated = weighted_update(10.0, 100.0);
        assert!((updated - 37.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_update_clamps_to_valid_range() {
        assert_eq!(weighted_update(100.0, 100.0), 100.0);
        assert_eq!(weighted_update(0.0, 0.0), 0.0);
    }
}
