use std::collections::HashMap;

use ocasino_common::money::{Amount, Currency};

/// Per-currency large-value thresholds, loaded from the `aml-large-value-thresholds`
/// configuration map. Currencies not present in the map fall back to `default_threshold`
/// rather than never firing.
#[derive(Debug, Clone)]
pub struct LargeValueThresholds {
    by_currency: HashMap<String, Amount>,
    default_threshold: Amount,
}

impl LargeValueThresholds {
    pub fn new(by_currency: HashMap<String, Amount>, default_threshold: Amount) -> Self {
        Self { by_currency, default_threshold }
    }

    /// Built-in defaults: USD 10,000, EUR/GBP 9,000, JPY 1,000,000.
    /// Anything else uses the USD figure as a conservative default.
    pub fn default_set() -> Self {
        let mut by_currency = HashMap::new();
        by_currency.insert("USD".to_string(), Amount::from_minor_units(10_000_00));
        by_currency.insert("EUR".to_string(), Amount::from_minor_units(9_000_00));
        by_currency.insert("GBP".to_string(), Amount::from_minor_units(9_000_00));
        by_currency.insert("JPY".to_string(), Amount::from_minor_units(1_000_000));
        Self { by_currency, default_threshold: Amount::from_minor_units(10_000_00) }
    }

    pub fn threshold_for(&self, currency: &Currency) -> Amount {
        self.by_currency.get(currency.code()).copied().unwrap_or(self.default_threshold)
    }
}

impl Default for LargeValueThresholds {
    fn default() -> Self {
        Self::default_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_currency_uses_its_own_threshold() {
        let thresholds = LargeValueThresholds::default_set();
        let jpy = Currency::new("JPY").unwrap();
        assert_eq!(thresholds.threshold_for(&jpy).minor_units(), 1_000_000);
    }

    #[test]
    fn unknown_currency_falls_back_to_default() {
        let thresholds = LargeValueThresholds::default_set();
        let cad = Currency::new("CAD").unwrap();
        assert_eq!(thresholds.threshold_for(&cad).minor_units(), 10_000_00);
    }
}
