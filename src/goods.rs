//! Goods

use rusty_money::{Money, iso};

use crate::{pricing::PriceError, tags::string::StringTagCollection};

/// A line in the cart being settled.
#[derive(Clone, Debug, PartialEq)]
pub struct GoodsItem<'a> {
    price: Money<'a, iso::Currency>,
    count: u32,
    goods_type: String,
}

impl<'a> GoodsItem<'a> {
    /// Creates a goods line with a unit price, a quantity and a goods type tag.
    pub fn new(price: Money<'a, iso::Currency>, count: u32, goods_type: &str) -> Self {
        Self {
            price,
            count,
            goods_type: goods_type.to_string(),
        }
    }

    /// Returns the unit price
    pub fn price(&self) -> &Money<'a, iso::Currency> {
        &self.price
    }

    /// Returns the quantity
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the goods type tag
    pub fn goods_type(&self) -> &str {
        &self.goods_type
    }

    /// Unit price multiplied by quantity.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] when the product does not fit in minor units.
    pub fn line_total(&self) -> Result<Money<'a, iso::Currency>, PriceError> {
        let minor = self
            .price
            .to_minor_units()
            .checked_mul(i64::from(self.count))
            .ok_or(PriceError::Overflow)?;

        Ok(Money::from_minor(minor, self.price.currency()))
    }
}

/// Every distinct goods type present in the cart.
pub fn goods_types(goods: &[GoodsItem<'_>]) -> StringTagCollection {
    goods
        .iter()
        .map(|item| item.goods_type.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::CNY;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn line_total_multiplies_price_by_count() -> TestResult {
        let item = GoodsItem::new(Money::from_minor(20_88, CNY), 10, "leisure");

        assert_eq!(item.line_total()?, Money::from_minor(208_80, CNY));

        Ok(())
    }

    #[test]
    fn line_total_overflow_returns_error() {
        let item = GoodsItem::new(Money::from_minor(i64::MAX, CNY), 2, "leisure");

        assert!(matches!(item.line_total(), Err(PriceError::Overflow)));
    }

    #[test]
    fn goods_types_collects_distinct_types() {
        let goods = [
            GoodsItem::new(Money::from_minor(100, CNY), 1, "leisure"),
            GoodsItem::new(Money::from_minor(100, CNY), 3, "furniture"),
            GoodsItem::new(Money::from_minor(100, CNY), 2, "leisure"),
        ];

        assert_eq!(
            goods_types(&goods),
            StringTagCollection::from_strs(&["furniture", "leisure"])
        );
    }
}
