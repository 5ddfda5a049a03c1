use std::str::FromStr;

use bigdecimal::{BigDecimal, Signed, ToPrimitive, Zero};

use crate::error::{LedgerError, LedgerResult};

/// Loyalty program parameters. Rates are fractions (`0.05` = 5%), the discount
/// cap is in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsPolicy {
    pub earn_rate: BigDecimal,
    pub redeem_rate: BigDecimal,
    pub max_discount_pct: BigDecimal,
    pub welcome_bonus: i64,
    pub birthday_bonus: i64,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            earn_rate: BigDecimal::from(5) / BigDecimal::from(100),
            redeem_rate: BigDecimal::from(1) / BigDecimal::from(100),
            max_discount_pct: BigDecimal::from(50),
            welcome_bonus: 100,
            birthday_bonus: 500,
        }
    }
}

/// Outcome of a redemption calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Discount {
    /// Points actually spent after the cap clamp.
    pub points: i64,
    /// Discount percent, truncated to two decimals.
    pub percent: BigDecimal,
}

/// Largest accepted amount is just under 10^12.
const MAX_AMOUNT_INTEGER_DIGITS: u32 = 12;
const MAX_AMOUNT_SCALE: i64 = 2;
// longest plain rendering of an accepted amount, with a sign and some slack
const MAX_AMOUNT_TEXT: usize = 24;

/// Rejects amounts that are not positive, carry more than two decimals, use
/// exponent notation or exceed the integer digit limit. Cheap for any input:
/// nothing is rescaled before the scale is known to be small.
pub fn check_amount(amount: &BigDecimal) -> LedgerResult<()> {
    let (_, scale) = amount.as_bigint_and_exponent();
    if !(0..=MAX_AMOUNT_SCALE).contains(&scale) {
        return Err(LedgerError::InvalidAmount(format!(
            "at most {MAX_AMOUNT_SCALE} decimal places are allowed"
        )));
    }
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount("amount must be positive".into()));
    }
    if *amount >= BigDecimal::from(10i64.pow(MAX_AMOUNT_INTEGER_DIGITS)) {
        return Err(LedgerError::InvalidAmount(format!(
            "amount exceeds {MAX_AMOUNT_INTEGER_DIGITS} integer digits"
        )));
    }
    Ok(())
}

/// Parses and bounds a currency amount supplied from outside.
pub fn parse_amount(text: &str) -> LedgerResult<BigDecimal> {
    let text = text.trim();
    if text.len() > MAX_AMOUNT_TEXT {
        return Err(LedgerError::InvalidAmount("amount is too long".into()));
    }
    let amount = BigDecimal::from_str(text).map_err(|_| LedgerError::InvalidAmount("not a number".into()))?;
    check_amount(&amount)?;
    Ok(amount)
}

// truncates toward zero, so a point count never includes a fraction
fn whole_points(value: &BigDecimal) -> Option<i64> {
    value.with_scale(0).to_i64()
}

impl PointsPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !self.earn_rate.is_positive() {
            return Err("earn rate must be positive".into());
        }
        if !self.redeem_rate.is_positive() {
            return Err("redeem rate must be positive".into());
        }
        if !self.max_discount_pct.is_positive() || self.max_discount_pct > BigDecimal::from(100) {
            return Err("max discount must be within (0, 100]".into());
        }
        if self.welcome_bonus < 0 || self.birthday_bonus < 0 {
            return Err("bonuses must not be negative".into());
        }
        Ok(())
    }

    /// `floor(amount * earn_rate)`.
    pub fn points_earned_for(&self, amount: &BigDecimal) -> LedgerResult<i64> {
        check_amount(amount)?;
        whole_points(&(amount * &self.earn_rate)).ok_or_else(|| LedgerError::InvalidAmount("amount is out of range".into()))
    }

    /// Largest spend whose discount stays within the cap for this purchase:
    /// `floor(purchase * max_pct / 100 / redeem_rate)`, and never more points
    /// than the percent cap itself can honour.
    pub fn max_points_for(&self, purchase_amount: &BigDecimal) -> LedgerResult<i64> {
        check_amount(purchase_amount)?;
        let by_amount = purchase_amount * &self.max_discount_pct / BigDecimal::from(100) / &self.redeem_rate;
        let by_amount =
            whole_points(&by_amount).ok_or_else(|| LedgerError::InvalidAmount("amount is out of range".into()))?;
        let by_percent = whole_points(&(&self.max_discount_pct / &self.redeem_rate)).unwrap_or(i64::MAX);
        Ok(by_amount.min(by_percent))
    }

    /// Clamps the requested spend to the cap and computes the resulting
    /// discount. Clamping is silent; only non-positive inputs are rejected.
    pub fn discount_for(&self, points_to_spend: i64, purchase_amount: &BigDecimal) -> LedgerResult<Discount> {
        if points_to_spend <= 0 {
            return Err(LedgerError::InvalidPoints(format!(
                "{points_to_spend} is not a positive number of points"
            )));
        }
        let points = points_to_spend.min(self.max_points_for(purchase_amount)?);
        let percent = self.percent_for(points);
        Ok(Discount { points, percent })
    }

    /// Discount a balance could buy on its own, ignoring purchase size.
    pub fn percent_for(&self, points: i64) -> BigDecimal {
        if points <= 0 {
            return BigDecimal::zero();
        }
        let nominal = BigDecimal::from(points) * &self.redeem_rate;
        let capped = if nominal > self.max_discount_pct {
            self.max_discount_pct.clone()
        } else {
            nominal
        };
        capped.with_scale(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn default_policy_is_valid() {
        let policy = PointsPolicy::default();
        assert_eq!(policy.earn_rate, dec("0.05"));
        assert_eq!(policy.redeem_rate, dec("0.01"));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let mut policy = PointsPolicy::default();
        policy.redeem_rate = BigDecimal::zero();
        assert!(policy.validate().is_err());

        let mut policy = PointsPolicy::default();
        policy.max_discount_pct = dec("120");
        assert!(policy.validate().is_err());

        let mut policy = PointsPolicy::default();
        policy.welcome_bonus = -1;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn earn_floors_fractional_points() {
        let policy = PointsPolicy::default();
        assert_eq!(policy.points_earned_for(&dec("1500.00")).unwrap(), 75);
        assert_eq!(policy.points_earned_for(&dec("1500.50")).unwrap(), 75);
        assert_eq!(policy.points_earned_for(&dec("19.99")).unwrap(), 0);
        assert_eq!(policy.points_earned_for(&dec("20")).unwrap(), 1);
    }

    #[test]
    fn earn_rejects_non_positive_amounts() {
        let policy = PointsPolicy::default();
        assert!(matches!(
            policy.points_earned_for(&BigDecimal::zero()),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            policy.points_earned_for(&dec("-10")),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn amounts_are_bounded() {
        assert_eq!(parse_amount(" 1500.50 ").unwrap(), dec("1500.50"));
        assert_eq!(parse_amount("999999999999.99").unwrap(), dec("999999999999.99"));
        for text in ["1e500000", "1E3", "1e-500000", "0.001", "1000000000000", "-1", "0", "abc"] {
            assert!(
                matches!(parse_amount(text), Err(LedgerError::InvalidAmount(_))),
                "{text} accepted"
            );
        }
        let long = "1".repeat(500_000);
        let err = parse_amount(&long).unwrap_err().to_string();
        assert!(err.len() < 64, "error echoes input: {err}");
    }

    #[test]
    fn earn_rejects_huge_exponents_without_expanding_them() {
        let policy = PointsPolicy::default();
        let huge = dec("1e500000");
        let started = std::time::Instant::now();
        let err = policy.points_earned_for(&huge).unwrap_err();
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        assert!(err.to_string().len() < 64);
        assert!(policy.max_points_for(&huge).is_err());
    }

    #[test]
    fn discount_clamps_to_cap() {
        let policy = PointsPolicy::default();
        assert_eq!(policy.max_points_for(&dec("1000.00")).unwrap(), 5000);
        assert_eq!(policy.max_points_for(&dec("10.00")).unwrap(), 500);

        let discount = policy.discount_for(6000, &dec("1000.00")).unwrap();
        assert_eq!(discount.points, 5000);
        assert_eq!(discount.percent, dec("50"));
    }

    #[test]
    fn discount_below_cap_is_proportional() {
        let policy = PointsPolicy::default();
        let discount = policy.discount_for(150, &dec("1000")).unwrap();
        assert_eq!(discount.points, 150);
        assert_eq!(discount.percent, dec("1.50"));
    }

    #[test]
    fn discount_percent_truncates_to_two_decimals() {
        let policy = PointsPolicy {
            redeem_rate: dec("0.003"),
            ..PointsPolicy::default()
        };
        let discount = policy.discount_for(7, &dec("1000")).unwrap();
        assert_eq!(discount.points, 7);
        assert_eq!(discount.percent, dec("0.02"));
    }

    #[test]
    fn tiny_purchase_clamps_to_zero_points() {
        let policy = PointsPolicy::default();
        let discount = policy.discount_for(10, &dec("0.01")).unwrap();
        assert_eq!(discount.points, 0);
        assert_eq!(discount.percent, BigDecimal::zero());
    }

    #[test]
    fn discount_rejects_bad_inputs() {
        let policy = PointsPolicy::default();
        assert!(matches!(
            policy.discount_for(0, &dec("100")),
            Err(LedgerError::InvalidPoints(_))
        ));
        assert!(matches!(
            policy.discount_for(10, &dec("0")),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn percent_for_balance_is_capped() {
        let policy = PointsPolicy::default();
        assert_eq!(policy.percent_for(100), dec("1"));
        assert_eq!(policy.percent_for(9000), dec("50"));
        assert_eq!(policy.percent_for(0), BigDecimal::zero());
    }
}
