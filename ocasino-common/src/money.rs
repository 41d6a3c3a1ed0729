use crate::error::PlatformError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 3-letter currency code together with its fixed-point scale.
///
/// `scale` is the number of decimal digits the currency carries: 2 for
/// USD/EUR/GBP/CNY/KRW-like currencies, 0 for JPY-like ones. Anything not in the
/// built-in table defaults to scale 2, which covers the overwhelming majority of
/// ISO-4217 currencies partners actually settle in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, PlatformError> {
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PlatformError::invalid_amount(format!(
                "currency code must be 3 ASCII letters, got '{code}'"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal digits this currency's amounts are stored with.
    pub fn scale(&self) -> u32 {
        match self.0.as_str() {
            "JPY" => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly-positive monetary amount, stored as integer minor units at the
/// currency's scale (e.g. USD 15.00 is minor_units = 1500, scale = 2).
///
/// Amounts never carry more precision than their currency allows:
/// parsing a decimal string with extra fractional digits is rejected with
/// `invalid-amount` rather than silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    minor_units: i64,
}

impl Amount {
    /// Parses a decimal string (e.g. `"15.00"`, `"1000"`) against a currency's
    /// scale. Rejects zero, negative, and over-precise amounts.
    pub fn parse(decimal: &str, currency: &Currency) -> Result<Self, PlatformError> {
        let scale = currency.scale();
        let (int_part, frac_part) = match decimal.split_once('.') {
            Some((i, f)) => (i, f),
            None => (decimal, ""),
        };
        if frac_part.len() > scale as usize {
            return Err(PlatformError::invalid_amount(format!(
                "amount '{decimal}' has more precision than {} allows ({} decimals)",
                currency, scale
            )));
        }
        if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(PlatformError::invalid_amount(format!(
                "amount '{decimal}' is not a valid non-negative decimal"
            )));
        }
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(PlatformError::invalid_amount(format!(
                "amount '{decimal}' is not a valid non-negative decimal"
            )));
        }

        let int_val: i64 = int_part
            .parse()
            .map_err(|_| PlatformError::invalid_amount(format!("amount '{decimal}' overflows")))?;
        let padded_frac = format!("{:0<width$}", frac_part, width = scale as usize);
        let frac_val: i64 = if padded_frac.is_empty() {
            0
        } else {
            padded_frac
                .parse()
                .map_err(|_| PlatformError::invalid_amount(format!("amount '{decimal}' overflows")))?
        };

        let minor_units = int_val
            .checked_mul(10i64.pow(scale))
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| PlatformError::invalid_amount(format!("amount '{decimal}' overflows")))?;

        if minor_units <= 0 {
            return Err(PlatformError::invalid_amount(format!(
                "amount '{decimal}' must be strictly positive"
            )));
        }

        Ok(Self { minor_units })
    }

    pub fn from_minor_units(minor_units: i64) -> Self {
        Self { minor_units }
    }

    pub fn minor_units(self) -> i64 {
        self.minor_units
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.minor_units.checked_add(other.minor_units).map(|v| Self { minor_units: v })
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.minor_units.checked_sub(other.minor_units).map(|v| Self { minor_units: v })
    }

    pub fn is_zero_or_negative(self) -> bool {
        self.minor_units <= 0
    }

    pub fn to_decimal_string(self, currency: &Currency) -> String {
        let scale = currency.scale();
        if scale == 0 {
            return self.minor_units.to_string();
        }
        let factor = 10i64.pow(scale);
        let int_part = self.minor_units / factor;
        let frac_part = (self.minor_units % factor).abs();
        format!("{int_part}.{:0width$}", frac_part, width = scale as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_decimal_amounts() {
        let usd = Currency::new("usd").unwrap();
        let amt = Amount::parse("15.00", &usd).unwrap();
        assert_eq!(amt.minor_units(), 1500);
        assert_eq!(amt.to_decimal_string(&usd), "15.00");
    }

    #[test]
    fn rejects_over_precise_amounts() {
        let usd = Currency::new("USD").unwrap();
        assert!(Amount::parse("15.001", &usd).is_err());
    }

    #[test]
    fn rejects_zero_and_negative() {
        let usd = Currency::new("USD").unwrap();
        assert!(Amount::parse("0.00", &usd).is_err());
        assert!(Amount::parse("-5.00", &usd).is_err());
    }

    #[test]
    fn jpy_has_zero_scale() {
        let jpy = Currency::new("JPY").unwrap();
        let amt = Amount::parse("1000000", &jpy).unwrap();
        assert_eq!(amt.minor_units(), 1_000_000);
        assert!(Amount::parse("1000.5", &jpy).is_err());
    }
}
