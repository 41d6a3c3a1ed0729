use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ocasino_common::{PlatformError, Result};
use ocasino_crypto::AmountCipher;
use ocasino_events::{DomainEvent, EventBus, EventHandler, Topic, WalletTransactionCreatedEvent};
use ocasino_store::model::{DeadLetterEntry, Transaction};
use ocasino_store::repo::{AmlRepo, DeadLetterRepo, TransactionRepo};
use tracing::{error, info, warn};

use crate::alert::decide_alert;
use crate::factors::{composite_bonus, default_factors, AnalysisContext, FactorOutcome, HistoryEntry, RiskFactor};
use crate::profile::{apply_update, recompute_counters};
use crate::thresholds::LargeValueThresholds;

/// Bounded retry policy for analysis failures: a transient failure (store
/// outage, bug) gets a handful of retries with exponential backoff before the
/// event is dead-lettered and an operational alert is logged. Wallet
/// correctness never depends on this succeeding — the wallet transaction
/// already committed.
const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: StdDuration = StdDuration::from_millis(25);

/// How many days of history the analyzer pulls per evaluation.
const HISTORY_WINDOW_DAYS: i64 = 30;
const HISTORY_LIMIT: usize = 2000;

/// Subscribes to `wallet.transaction.created` and runs the behavioral-pattern
/// analysis: a flat rule list evaluated by a service, adapted from pass/fail
/// rules to additive risk factors.
pub struct AmlAnalyzer {
    transactions: Arc<dyn TransactionRepo>,
    profiles: Arc<dyn AmlRepo>,
    dead_letters: Arc<dyn DeadLetterRepo>,
    cipher: Arc<AmountCipher>,
    events: Arc<EventBus>,
    thresholds: LargeValueThresholds,
    factors: Vec<Box<dyn RiskFactor>>,
    topics: Vec<Topic>,
}

impl AmlAnalyzer {
    pub fn new(
        transactions: Arc<dyn TransactionRepo>,
        profiles: Arc<dyn AmlRepo>,
        dead_letters: Arc<dyn DeadLetterRepo>,
        cipher: Arc<AmountCipher>,
        events: Arc<EventBus>,
        thresholds: LargeValueThresholds,
    ) -> Self {
        Self {
            transactions,
            profiles,
            dead_letters,
            cipher,
            events,
            thresholds,
            factors: default_factors(),
            topics: vec![Topic::WalletTransactionCreated],
        }
    }

    /// Decrypts every historical transaction's stored amount up front so the
    /// factor evaluators can work with plain `i64` minor units. A transaction
    /// whose blob fails to decrypt is dropped from the analysis window rather
    /// than failing the whole run — a single corrupted row should not block
    /// AML coverage of the rest of the player's history.
    fn decrypt_history(&self, raw: Vec<Transaction>, exclude: ocasino_common::ids::TransactionId) -> Vec<HistoryEntry> {
        raw.into_iter()
            .filter(|tx| tx.id != exclude)
            .filter_map(|tx| match self.cipher.decrypt_amount(&tx.encrypted_amount) {
                Ok(amount_minor) => Some(HistoryEntry { tx, amount_minor }),
                Err(_) => {
                    warn!(transaction_id = %tx.id, "failed to decrypt historical transaction amount; excluding from AML analysis");
                    None
                }
            })
            .collect()
    }

    /// Runs once per wallet event with no retry of its own — retry/backoff
    /// lives in `handle`.
    async fn process(&self, event: &WalletTransactionCreatedEvent) -> Result<()> {
        let mut profile = self.profiles.get_or_create_profile(&event.player_id, event.partner_id).await?;

        let since = event.created_at - Duration::days(HISTORY_WINDOW_DAYS);
        let raw_history = self
            .transactions
            .list_by_player(&event.player_id, event.partner_id, since, HISTORY_LIMIT)
            .await?;
        let history = self.decrypt_history(raw_history, event.transaction_id);

        let ctx = AnalysisContext {
            current_tx_type: event.tx_type,
            current_amount_minor: event.amount.minor_units(),
            current_currency: &event.currency,
            current_wallet_id: event.wallet_id,
            current_created_at: event.created_at,
            history: &history,
            thresholds: &self.thresholds,
        };

        let outcomes: Vec<FactorOutcome> = self.factors.iter().map(|f| f.evaluate(&ctx)).collect();
        let detected_scores: Vec<f64> = outcomes.iter().filter(|o| o.detected).map(|o| o.score).collect();
        let base_score: f64 = outcomes.iter().map(|o| o.score).sum();
        let bonus = composite_bonus(&detected_scores);
        let current_analysis_score = (base_score + bonus).clamp(0.0, 100.0);

        let counters = recompute_counters(&history, event.tx_type, event.amount.minor_units(), event.created_at);
        let risk_factors_blob = serde_json::json!({
            "current_analysis_score": current_analysis_score,
            "composite_bonus": bonus,
            "factors": outcomes.iter().map(|o| serde_json::json!({
                "name": o.name,
                "detected": o.detected,
                "score": o.score,
                "details": o.details,
            })).collect::<Vec<_>>(),
        });

        apply_update(&mut profile, current_analysis_score, counters, risk_factors_blob, event.created_at);
        self.profiles.update_profile(profile.clone()).await?;

        if let Some(alert) = decide_alert(
            event.player_id.clone(),
            event.partner_id,
            event.transaction_id,
            current_analysis_score,
            &outcomes,
            event.created_at,
        ) {
            let inserted = self.profiles.insert_alert(alert).await?;
            info!(alert_id = %inserted.id, severity = ?inserted.severity, score = inserted.score_at_alert, "aml alert raised");
            self.events
                .publish(DomainEvent::AmlAlertCreated(ocasino_events::AmlAlertCreatedEvent {
                    alert_id: inserted.id,
                    player_id: inserted.player_id.clone(),
                    partner_id: inserted.partner_id,
                    transaction_id: inserted.transaction_id,
                    alert_type: inserted.alert_type,
                    severity: inserted.severity,
                    score_at_alert: inserted.score_at_alert,
                    report_required: inserted.report_required,
                    created_at: inserted.created_at,
                }))
                .await;
        }

        Ok(())
    }

    async fn dead_letter(&self, event: &WalletTransactionCreatedEvent, reason: &PlatformError) {
        let entry = DeadLetterEntry {
            id: uuid::Uuid::new_v4(),
            topic: Topic::WalletTransactionCreated.as_str().to_string(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
            failure_reason: format!("aml analysis permanently failed: {reason}"),
            created_at: Utc::now(),
        };
        if let Err(e) = self.dead_letters.insert(entry).await {
            error!(error = %e, "failed to persist dead-lettered aml failure; it is now lost");
        }
    }
}

#[async_trait]
impl EventHandler for AmlAnalyzer {
    fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Failure isolation: bounded exponential backoff on transient failure, then
    /// dead-letter and log an operational alert. Returning `Ok(())` after
    /// dead-lettering keeps the bus's own per-handler failure log quiet — this
    /// failure has already been recorded where an operator will look for it.
    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), PlatformError> {
        let DomainEvent::WalletTransactionCreated(inner) = event else {
            return Ok(());
        };

        let mut attempt = 0;
        loop {
            match self.process(inner).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt);
                    warn!(attempt, error = %err, "aml analysis failed, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    error!(error = %err, transaction_id = %inner.transaction_id, "aml analysis permanently failed");
                    self.dead_letter(inner, &err).await;
                    return Ok(());
                }
            }
        }
    }
}
