use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use ocasino_common::ids::WalletId;
use ocasino_common::money::Currency;
use ocasino_store::model::{Transaction, TransactionStatus, TransactionType};
use serde_json::json;

use crate::thresholds::LargeValueThresholds;

/// A decrypted transaction alongside its plain minor-units amount. The AML
/// analyzer is the one subsystem other than the wallet engine itself that
/// touches plaintext amounts, and only ever for a `(player, partner)` pair's
/// own history — the cost of keeping amounts encrypted at rest.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub tx: Transaction,
    pub amount_minor: i64,
}

/// Everything a `RiskFactor` needs to evaluate the transaction currently being
/// analyzed against the player's prior history. `history` excludes
/// the current transaction itself.
pub struct AnalysisContext<'a> {
    pub current_tx_type: TransactionType,
    pub current_amount_minor: i64,
    pub current_currency: &'a Currency,
    pub current_wallet_id: WalletId,
    pub current_created_at: DateTime<Utc>,
    pub history: &'a [HistoryEntry],
    pub thresholds: &'a LargeValueThresholds,
}

/// One factor's verdict: whether it fired, how many points it contributes,
/// whether it independently flags the transaction for regulatory reporting,
/// and a JSON snapshot for `factors_at_alert` / the profile's `risk_factors`
/// blob.
#[derive(Debug, Clone)]
pub struct FactorOutcome {
    pub name: &'static str,
    pub detected: bool,
    pub score: f64,
    pub report_required: bool,
    pub details: serde_json::Value,
}

impl FactorOutcome {
    fn abstain(name: &'static str) -> Self {
        Self { name, detected: false, score: 0.0, report_required: false, details: json!({"abstained": true}) }
    }
}

/// One rule per compliance concern, dispatched from a flat `Vec` by the
/// analyzer rather than through runtime reflection.
pub trait RiskFactor: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome;
}

/// Returns the five factors in the order the analyzer should evaluate them.
pub fn default_factors() -> Vec<Box<dyn RiskFactor>> {
    vec![
        Box::new(LargeValueFactor),
        Box::new(AmountPatternFactor),
        Box::new(TimePatternFactor),
        Box::new(FrequencyFactor),
        Box::new(RapidDepositWithdrawalFactor),
    ]
}

pub struct LargeValueFactor;

impl RiskFactor for LargeValueFactor {
    fn name(&self) -> &'static str {
        "large_value_threshold"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome {
        let threshold = ctx.thresholds.threshold_for(ctx.current_currency).minor_units();
        let detected = ctx.current_amount_minor >= threshold;
        FactorOutcome {
            name: self.name(),
            detected,
            score: if detected { 40.0 } else { 0.0 },
            report_required: detected,
            details: json!({"amount_minor": ctx.current_amount_minor, "threshold_minor": threshold}),
        }
    }
}

/// Minimum same-type history entries before the z-score has any statistical
/// meaning; below this the factor abstains rather than overreact to noise.
const AMOUNT_PATTERN_MIN_SAMPLES: usize = 3;
const AMOUNT_PATTERN_Z_THRESHOLD: f64 = 2.5;
const AMOUNT_PATTERN_RANGE_PCT_THRESHOLD: f64 = 0.5;

pub struct AmountPatternFactor;

impl RiskFactor for AmountPatternFactor {
    fn name(&self) -> &'static str {
        "amount_pattern_deviation"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome {
        let same_type: Vec<f64> = ctx
            .history
            .iter()
            .filter(|h| h.tx.tx_type == ctx.current_tx_type)
            .map(|h| h.amount_minor as f64)
            .collect();

        if same_type.len() < AMOUNT_PATTERN_MIN_SAMPLES {
            return FactorOutcome::abstain(self.name());
        }

        let n = same_type.len() as f64;
        let mean = same_type.iter().sum::<f64>() / n;
        let variance = same_type.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let raw_sigma = variance.sqrt();
        // sigma floored at 0.01 of mean to avoid sensitivity collapse
        // when the player's history is unusually uniform.
        let sigma = raw_sigma.max((mean.abs() * 0.01).max(1.0));

        let x = ctx.current_amount_minor as f64;
        let z = (x - mean).abs() / sigma;

        let min = same_type.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = same_type.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range_pct = if x > max && max > 0.0 {
            (x - max) / max
        } else if x < min && min > 0.0 {
            (min - x) / min
        } else {
            0.0
        };

        let mut detected = false;
        let mut score = 0.0;
        if z > AMOUNT_PATTERN_Z_THRESHOLD {
            detected = true;
            let scaled = ((z - AMOUNT_PATTERN_Z_THRESHOLD) / AMOUNT_PATTERN_Z_THRESHOLD).min(1.0);
            score = 10.0 + scaled * 15.0;
        }
        if range_pct > AMOUNT_PATTERN_RANGE_PCT_THRESHOLD {
            detected = true;
            score = score.max(15.0);
        }

        FactorOutcome {
            name: self.name(),
            detected,
            score,
            report_required: false,
            details: json!({"mean": mean, "sigma": sigma, "z_score": z, "range_pct": range_pct, "sample_size": same_type.len()}),
        }
    }
}

/// Need at least this many historical transactions before the hour/weekday
/// distribution is meaningful.
const TIME_PATTERN_MIN_SAMPLES: usize = 5;

pub struct TimePatternFactor;

impl RiskFactor for TimePatternFactor {
    fn name(&self) -> &'static str {
        "time_pattern_deviation"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome {
        if ctx.history.len() < TIME_PATTERN_MIN_SAMPLES {
            return FactorOutcome::abstain(self.name());
        }

        let mut bins: std::collections::HashMap<(u32, u32), u32> = std::collections::HashMap::new();
        for h in ctx.history {
            let key = (h.tx.created_at.weekday().num_days_from_monday(), h.tx.created_at.hour());
            *bins.entry(key).or_insert(0) += 1;
        }

        let current_key = (ctx.current_created_at.weekday().num_days_from_monday(), ctx.current_created_at.hour());
        let current_freq = bins.get(&current_key).copied().unwrap_or(0);

        let mut counts: Vec<u32> = bins.values().copied().collect();
        counts.sort_unstable();
        let idx = ((counts.len() as f64 - 1.0) * 0.10).floor().max(0.0) as usize;
        let p10 = counts.get(idx).copied().unwrap_or(0);

        let detected = current_freq == 0 || current_freq <= p10;
        FactorOutcome {
            name: self.name(),
            detected,
            score: if detected { 15.0 } else { 0.0 },
            report_required: false,
            details: json!({"current_bin_frequency": current_freq, "p10_bin_frequency": p10}),
        }
    }
}

pub struct FrequencyFactor;

impl RiskFactor for FrequencyFactor {
    fn name(&self) -> &'static str {
        "frequency_deviation"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome {
        if ctx.history.is_empty() {
            return FactorOutcome::abstain(self.name());
        }

        let day_ago = ctx.current_created_at - Duration::hours(24);
        let week_ago = ctx.current_created_at - Duration::days(7);
        let month_ago = ctx.current_created_at - Duration::days(30);

        // +1 throughout: the transaction under analysis counts toward its own
        // window even though it is not part of `history`.
        let f24 = ctx.history.iter().filter(|h| h.tx.created_at >= day_ago).count() as f64 + 1.0;
        let count_7d = ctx.history.iter().filter(|h| h.tx.created_at >= week_ago).count() as f64 + 1.0;
        let count_30d = ctx.history.iter().filter(|h| h.tx.created_at >= month_ago).count() as f64 + 1.0;
        let f7 = count_7d / 7.0;
        let f30 = count_30d / 30.0;

        // the canonical frequency rule; looser variants are not used here.
        let detected = f24 > 3.0 * f7.max(f30) && f24 >= 4.0;
        FactorOutcome {
            name: self.name(),
            detected,
            score: if detected { 20.0 } else { 0.0 },
            report_required: false,
            details: json!({"f24": f24, "f7": f7, "f30": f30}),
        }
    }
}

const RAPID_DEPOSIT_MIN_RATIO: f64 = 0.8;
/// A bet is "meaningful" against a preceding deposit once it consumes this
/// fraction of the deposit's amount — past that point the withdrawal is no
/// longer "rapid" relative to an untouched deposit.
const RAPID_DEPOSIT_INTERVENING_BET_RATIO: f64 = 0.3;

pub struct RapidDepositWithdrawalFactor;

impl RiskFactor for RapidDepositWithdrawalFactor {
    fn name(&self) -> &'static str {
        "rapid_deposit_withdrawal"
    }

    fn evaluate(&self, ctx: &AnalysisContext) -> FactorOutcome {
        if ctx.current_tx_type != TransactionType::Withdrawal {
            return FactorOutcome { name: self.name(), detected: false, score: 0.0, report_required: false, details: json!({}) };
        }

        let day_ago = ctx.current_created_at - Duration::hours(24);
        let min_deposit_amount = ctx.current_amount_minor as f64 * RAPID_DEPOSIT_MIN_RATIO;

        let candidate = ctx
            .history
            .iter()
            .filter(|h| {
                h.tx.wallet_id == ctx.current_wallet_id
                    && h.tx.tx_type == TransactionType::Deposit
                    && h.tx.status == TransactionStatus::Completed
                    && h.tx.created_at >= day_ago
                    && h.tx.created_at < ctx.current_created_at
                    && h.amount_minor as f64 >= min_deposit_amount
            })
            .max_by_key(|h| h.tx.created_at);

        let detected = match candidate {
            Some(deposit) => {
                let intervening_bets: i64 = ctx
                    .history
                    .iter()
                    .filter(|h| {
                        h.tx.wallet_id == ctx.current_wallet_id
                            && h.tx.tx_type == TransactionType::Bet
                            && h.tx.created_at > deposit.tx.created_at
                            && h.tx.created_at < ctx.current_created_at
                    })
                    .map(|h| h.amount_minor)
                    .sum();
                (intervening_bets as f64) < deposit.amount_minor as f64 * RAPID_DEPOSIT_INTERVENING_BET_RATIO
            }
            None => false,
        };

        FactorOutcome {
            name: self.name(),
            detected,
            score: if detected { 25.0 } else { 0.0 },
            report_required: false,
            details: json!({"candidate_found": candidate.is_some()}),
        }
    }
}

/// The composite bonus: two or more factors firing together add up to
/// +40 extra, scaled by how many fired and how strongly.
pub fn composite_bonus(detected_scores: &[f64]) -> f64 {
    if detected_scores.len() < 2 {
        return 0.0;
    }
    let count_bonus = (detected_scores.len() as f64 - 1.0) * 10.0;
    let avg_score = detected_scores.iter().sum::<f64>() / detected_scores.len() as f64;
    let severity_bonus = avg_score * 0.2;
    (count_bonus + severity_bonus).min(40.0)
}
