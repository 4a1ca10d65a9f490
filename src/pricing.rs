//! Prices
//!
//! Every customer-facing figure is held as [`Money`] in minor units, so a value is
//! always a multiple of 0.01. Arithmetic that can produce fractions of a minor unit
//! (percentages) is rounded half-up immediately.

use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Findable, Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::goods::GoodsItem;

/// Errors that can occur while calculating prices.
#[derive(Debug, Error, PartialEq)]
pub enum PriceError {
    /// A line total or the cart total left the representable range.
    #[error("price calculation overflowed")]
    Overflow,

    /// A percentage calculation could not be safely represented in minor units.
    #[error("percentage conversion overflowed")]
    PercentConversion,

    /// A price string was not in the `AMOUNT CURRENCY` format.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Unknown ISO currency code.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Round to two decimal places, halves away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of `price × count` over every goods line.
///
/// An empty cart sums to zero in `currency`.
///
/// # Errors
///
/// - [`PriceError::Overflow`]: a line total does not fit in minor units.
/// - [`PriceError::Money`]: a goods line is priced in a different currency.
pub fn goods_sum<'a>(
    goods: &[GoodsItem<'a>],
    currency: &'a Currency,
) -> Result<Money<'a, Currency>, PriceError> {
    goods
        .iter()
        .try_fold(Money::from_minor(0, currency), |acc, item| {
            Ok(acc.add(item.line_total()?)?)
        })
}

/// Apply `points` percent (e.g. `85` for 85%) to `amount`, rounding half-up to the minor unit.
///
/// # Errors
///
/// Returns [`PriceError::PercentConversion`] if the calculation overflows.
pub fn apply_percentage<'a>(
    amount: &Money<'a, Currency>,
    points: u16,
) -> Result<Money<'a, Currency>, PriceError> {
    let minor = percent_of_minor(points, amount.to_minor_units())?;

    Ok(Money::from_minor(minor, amount.currency()))
}

/// The larger of `amount` and the configured floor (both in the same currency).
pub fn at_least<'a>(amount: Money<'a, Currency>, floor_minor: i64) -> Money<'a, Currency> {
    if amount.to_minor_units() < floor_minor {
        Money::from_minor(floor_minor, amount.currency())
    } else {
        amount
    }
}

/// Calculate `points`% of a minor-unit amount, rounded half-up to whole minor units.
fn percent_of_minor(points: u16, minor: i64) -> Result<i64, PriceError> {
    let minor = Decimal::from_i64(minor).ok_or(PriceError::PercentConversion)?;
    let ratio = Decimal::new(i64::from(points), 2);

    ratio
        .checked_mul(minor)
        .ok_or(PriceError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(PriceError::PercentConversion)
}

/// Parse a price string (e.g. `"10.88 CNY"`) into money.
///
/// # Errors
///
/// Returns an error if the string is not in the format `AMOUNT CURRENCY`, if the amount
/// is not a decimal number, or if the currency code is not recognised.
pub fn parse_price(s: &str) -> Result<Money<'static, Currency>, PriceError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PriceError::InvalidPrice(s.to_string()));
    };

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| PriceError::InvalidPrice(s.to_string()))?;

    let currency =
        Currency::find(code).ok_or_else(|| PriceError::UnknownCurrency(code.to_string()))?;

    let minor_units = round2(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|value| value.to_i64())
        .ok_or_else(|| PriceError::InvalidPrice(s.to_string()))?;

    Ok(Money::from_minor(minor_units, currency))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rusty_money::iso::{CNY, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn round2_rounds_half_up() {
        assert_eq!(round2(Decimal::new(195_976, 3)), Decimal::new(19_598, 2));
        assert_eq!(round2(Decimal::new(1_005, 3)), Decimal::new(101, 2));
        assert_eq!(round2(Decimal::new(1_004, 3)), Decimal::new(100, 2));
    }

    #[test]
    fn round2_is_idempotent() {
        for raw in [Decimal::new(178_976, 3), Decimal::new(-12_345, 3), Decimal::new(7, 1)] {
            assert_eq!(round2(round2(raw)), round2(raw), "round2 must be idempotent");
        }
    }

    #[test]
    fn goods_sum_multiplies_counts() -> TestResult {
        let goods = [
            GoodsItem::new(Money::from_minor(10_88, CNY), 2, "leisure"),
            GoodsItem::new(Money::from_minor(20_88, CNY), 10, "leisure"),
        ];

        assert_eq!(goods_sum(&goods, CNY)?, Money::from_minor(230_56, CNY));

        Ok(())
    }

    #[test]
    fn goods_sum_of_empty_cart_is_zero() -> TestResult {
        let goods: [GoodsItem<'static>; 0] = [];

        assert_eq!(goods_sum(&goods, CNY)?, Money::from_minor(0, CNY));

        Ok(())
    }

    #[test]
    fn apply_percentage_rounds_half_up() -> TestResult {
        let amount = Money::from_minor(230_56, CNY);

        assert_eq!(apply_percentage(&amount, 85)?, Money::from_minor(195_98, CNY));

        Ok(())
    }

    #[test]
    fn percent_of_minor_overflow_returns_error() {
        let result = percent_of_minor(u16::MAX, i64::MAX);

        assert!(matches!(result, Err(PriceError::PercentConversion)));
    }

    #[test]
    fn at_least_clamps_to_floor() {
        let below = Money::from_minor(-50, CNY);
        let above = Money::from_minor(50, CNY);

        assert_eq!(at_least(below, 1), Money::from_minor(1, CNY));
        assert_eq!(at_least(above, 1), Money::from_minor(50, CNY));
    }

    #[test]
    fn parse_price_reads_amount_and_currency() -> TestResult {
        assert_eq!(parse_price("10.88 CNY")?, Money::from_minor(10_88, CNY));

        Ok(())
    }

    #[test]
    fn parse_price_rejects_invalid_format() {
        assert!(matches!(parse_price("10.88CNY"), Err(PriceError::InvalidPrice(_))));
        assert!(matches!(
            parse_price("10.88 CNY extra"),
            Err(PriceError::InvalidPrice(_))
        ));
    }

    #[test]
    fn parse_price_rejects_unknown_currency() {
        let result = parse_price("2.99 ABC");

        assert!(matches!(result, Err(PriceError::UnknownCurrency(code)) if code == "ABC"));
    }

    #[test]
    fn goods_sum_rejects_mixed_currencies() {
        let goods = [
            GoodsItem::new(Money::from_minor(100, CNY), 1, "leisure"),
            GoodsItem::new(Money::from_minor(100, USD), 1, "leisure"),
        ];

        assert!(matches!(goods_sum(&goods, CNY), Err(PriceError::Money(_))));
    }
}
