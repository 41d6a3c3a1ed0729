use chrono::{DateTime, Utc};
use ocasino_common::ids::{AlertId, PartnerId, PlayerId, TransactionId};
use ocasino_store::model::{AMLAlert, AlertSeverity, AlertStatus, AlertType};
use serde_json::json;

use crate::factors::FactorOutcome;

/// The alert emission rule, applied against the transaction's own analysis
/// score (computed fresh before the profile's weighted average absorbs it —
/// an alert should react to what just happened, not to the damped trend).
pub fn severity_for_score(score: f64) -> Option<AlertSeverity> {
    if score >= 80.0 {
        Some(AlertSeverity::Critical)
    } else if score >= 60.0 {
        Some(AlertSeverity::High)
    } else if score >= 40.0 {
        Some(AlertSeverity::Medium)
    } else if score >= 20.0 {
        Some(AlertSeverity::Low)
    } else {
        None
    }
}

/// Decides whether the transaction just analyzed warrants an `AMLAlert`, and
/// builds it if so. Returns `None` when no alert should be raised — either
/// the score is below 20, or it's in the 20-40 "low" band with fewer than two
/// factors detected.
pub fn decide_alert(
    player_id: PlayerId,
    partner_id: PartnerId,
    transaction_id: TransactionId,
    score: f64,
    outcomes: &[FactorOutcome],
    now: DateTime<Utc>,
) -> Option<AMLAlert> {
    let score_severity = severity_for_score(score)?;
    let detected: Vec<&FactorOutcome> = outcomes.iter().filter(|o| o.detected).collect();

    if score_severity == AlertSeverity::Low && detected.len() < 2 {
        return None;
    }

    let report_required = score_severity == AlertSeverity::Critical || detected.iter().any(|o| o.report_required);

    // A factor that independently flags regulatory reporting (today, only the
    // large-value threshold) must not be diluted into a Medium/Low alert just
    // because nothing else corroborated it in the additive score — floor the
    // severity to High so a lone large-value hit still alerts at high or above.
    let severity = if report_required && score_severity < AlertSeverity::High {
        AlertSeverity::High
    } else {
        score_severity
    };

    let alert_type = if detected.iter().any(|o| o.name == "large_value_threshold") {
        AlertType::Threshold
    } else {
        AlertType::Pattern
    };

    let factors_at_alert = json!({
        "detected": detected.iter().map(|o| o.name).collect::<Vec<_>>(),
        "breakdown": outcomes.iter().map(|o| json!({
            "name": o.name,
            "detected": o.detected,
            "score": o.score,
            "details": o.details,
        })).collect::<Vec<_>>(),
    });

    Some(AMLAlert {
        id: AlertId::new(),
        player_id,
        partner_id,
        transaction_id: Some(transaction_id),
        alert_type,
        severity,
        status: AlertStatus::Open,
        score_at_alert: score,
        factors_at_alert,
        report_required,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &'static str, detected: bool, score: f64, report_required: bool) -> FactorOutcome {
        FactorOutcome { name, detected, score, report_required, details: json!({}) }
    }

    #[test]
    fn score_below_twenty_raises_no_alert() {
        assert_eq!(severity_for_score(10.0), None);
    }

    #[test]
    fn low_band_needs_two_factors() {
        let one_factor = vec![outcome("a", true, 25.0, false)];
        let player = PlayerId("p".into());
        let partner = PartnerId::new();
        let tx = TransactionId::new();
        assert!(decide_alert(player.clone(), partner, tx, 25.0, &one_factor, Utc::now()).is_none());

        let two_factors = vec![outcome("a", true, 15.0, false), outcome("b", true, 15.0, false)];
        assert!(decide_alert(player, partner, tx, 25.0, &two_factors, Utc::now()).is_some());
    }

    #[test]
    fn critical_score_forces_report_required() {
        let factors = vec![outcome("large_value_threshold", true, 40.0, true)];
        let alert = decide_alert(PlayerId("p".into()), PartnerId::new(), TransactionId::new(), 85.0, &factors, Utc::now()).unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.report_required);
        assert_eq!(alert.alert_type, AlertType::Threshold);
    }

    #[test]
    fn lone_large_value_hit_floors_severity_to_high() {
        // A single large-value factor with no corroborating factor yields a
        // Medium score-band (40), but it report-requires on its own, so the
        // alert must still come out at High or above.
        let factors = vec![outcome("large_value_threshold", true, 40.0, true)];
        let alert = decide_alert(PlayerId("p".into()), PartnerId::new(), TransactionId::new(), 40.0, &factors, Utc::now()).unwrap();
        assert_eq!(alert.severity, AlertSeverity::High);
        assert!(alert.report_required);
        assert_eq!(alert.alert_type, AlertType::Threshold);
    }
}
