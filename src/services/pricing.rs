use crate::config::ShippingConfig;
use crate::entities::ShippingZone;
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use serde::Serialize;

/// One cart line as seen by the pricing engine.
#[derive(Debug, Clone)]
pub struct PricingLine {
    pub unit_price: Decimal,
    pub quantity: i32,
    pub with_charm: bool,
}

/// Full price breakdown for an order, rounded to 2 decimal places.
///
/// Invariant: `total == subtotal - discount + shipping_cost`.
#[derive(Debug, Clone, Serialize)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

/// Pure pricing computation: line totals, zone shipping, grand total.
///
/// All arithmetic is `Decimal`; repeated additions never accumulate binary
/// floating-point drift.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    shipping: ShippingConfig,
    charm_price: Decimal,
}

impl PricingEngine {
    pub fn new(shipping: ShippingConfig, charm_price: Decimal) -> Self {
        Self {
            shipping,
            charm_price,
        }
    }

    pub fn charm_price(&self) -> Decimal {
        self.charm_price
    }

    /// Effective per-unit price of a line, including the charm add-on.
    pub fn unit_price_with_addons(&self, line: &PricingLine) -> Decimal {
        if line.with_charm {
            line.unit_price + self.charm_price
        } else {
            line.unit_price
        }
    }

    /// Total for one line. Rejects non-positive quantities and negative
    /// prices.
    pub fn line_total(&self, line: &PricingLine) -> Result<Decimal, ServiceError> {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be at least 1, got {}",
                line.quantity
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price cannot be negative, got {}",
                line.unit_price
            )));
        }

        Ok(self.unit_price_with_addons(line) * Decimal::from(line.quantity))
    }

    /// Pre-discount subtotal over all lines.
    pub fn subtotal(&self, lines: &[PricingLine]) -> Result<Decimal, ServiceError> {
        let mut subtotal = Decimal::ZERO;
        for line in lines {
            subtotal += self.line_total(line)?;
        }
        Ok(subtotal)
    }

    /// Shipping cost for a zone, given the post-discount subtotal.
    ///
    /// Domestic orders at or above the free-shipping threshold ship free;
    /// other zones always pay their flat rate.
    pub fn shipping_cost(&self, zone: ShippingZone, post_discount_subtotal: Decimal) -> Decimal {
        match zone {
            ShippingZone::Domestic => {
                if post_discount_subtotal >= self.shipping.free_shipping_threshold {
                    Decimal::ZERO
                } else {
                    self.shipping.domestic_rate
                }
            }
            ShippingZone::Regional => self.shipping.regional_rate,
            ShippingZone::International => self.shipping.international_rate,
        }
    }

    /// Computes the full breakdown. The discount has already been computed
    /// against the pre-discount subtotal; the free-shipping waiver is
    /// evaluated against the post-discount subtotal.
    pub fn quote(
        &self,
        lines: &[PricingLine],
        zone: ShippingZone,
        discount: Decimal,
    ) -> Result<PricingBreakdown, ServiceError> {
        let subtotal = self.subtotal(lines)?;

        // A discount can never push the order value negative
        let discount = discount.min(subtotal).max(Decimal::ZERO);

        let post_discount = subtotal - discount;
        let shipping_cost = self.shipping_cost(zone, post_discount);
        let total = post_discount + shipping_cost;

        Ok(PricingBreakdown {
            subtotal: subtotal.round_dp(2),
            discount: discount.round_dp(2),
            shipping_cost: shipping_cost.round_dp(2),
            total: total.round_dp(2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> PricingEngine {
        PricingEngine::new(ShippingConfig::default(), dec!(2.00))
    }

    fn line(price: Decimal, qty: i32) -> PricingLine {
        PricingLine {
            unit_price: price,
            quantity: qty,
            with_charm: false,
        }
    }

    #[test]
    fn domestic_order_below_threshold_pays_shipping() {
        // cart = [{price 35, qty 2}], zone=domestic, threshold=80
        let breakdown = engine()
            .quote(&[line(dec!(35), 2)], ShippingZone::Domestic, Decimal::ZERO)
            .unwrap();

        assert_eq!(breakdown.subtotal, dec!(70.00));
        assert_eq!(breakdown.shipping_cost, dec!(5.00));
        assert_eq!(breakdown.total, dec!(75.00));
    }

    #[test]
    fn domestic_order_at_threshold_ships_free() {
        // same cart but qty=3: subtotal 105 >= 80
        let breakdown = engine()
            .quote(&[line(dec!(35), 3)], ShippingZone::Domestic, Decimal::ZERO)
            .unwrap();

        assert_eq!(breakdown.subtotal, dec!(105.00));
        assert_eq!(breakdown.shipping_cost, dec!(0.00));
        assert_eq!(breakdown.total, dec!(105.00));
    }

    #[test]
    fn discount_can_revoke_free_shipping() {
        // WELCOME5-style: 5% of 70 = 3.50, post-discount 66.50 < 80
        let breakdown = engine()
            .quote(&[line(dec!(35), 2)], ShippingZone::Domestic, dec!(3.50))
            .unwrap();

        assert_eq!(breakdown.subtotal, dec!(70.00));
        assert_eq!(breakdown.discount, dec!(3.50));
        assert_eq!(breakdown.shipping_cost, dec!(5.00));
        assert_eq!(breakdown.total, dec!(71.50));
    }

    #[test]
    fn waiver_uses_post_discount_subtotal() {
        // 85 pre-discount would ship free, but a 10 discount drops it to 75
        let breakdown = engine()
            .quote(&[line(dec!(85), 1)], ShippingZone::Domestic, dec!(10))
            .unwrap();

        assert_eq!(breakdown.shipping_cost, dec!(5.00));
        assert_eq!(breakdown.total, dec!(80.00));
    }

    #[test]
    fn regional_and_international_never_ship_free() {
        let eng = engine();
        assert_eq!(
            eng.shipping_cost(ShippingZone::Regional, dec!(500)),
            dec!(12.00)
        );
        assert_eq!(
            eng.shipping_cost(ShippingZone::International, dec!(500)),
            dec!(20.00)
        );
    }

    #[test]
    fn charm_adds_fixed_price_per_unit() {
        let charmed = PricingLine {
            unit_price: dec!(35),
            quantity: 2,
            with_charm: true,
        };

        let total = engine().line_total(&charmed).unwrap();
        assert_eq!(total, dec!(74.00)); // (35 + 2) * 2
    }

    #[test]
    fn rejects_invalid_lines() {
        let eng = engine();
        assert!(eng.line_total(&line(dec!(10), 0)).is_err());
        assert!(eng.line_total(&line(dec!(10), -3)).is_err());
        assert!(eng.line_total(&line(dec!(-1), 1)).is_err());
    }

    #[test]
    fn discount_is_clamped_to_subtotal() {
        let breakdown = engine()
            .quote(&[line(dec!(20), 1)], ShippingZone::Regional, dec!(50))
            .unwrap();

        assert_eq!(breakdown.discount, dec!(20.00));
        assert_eq!(breakdown.total, dec!(12.00)); // 0 + regional shipping
    }

    #[test]
    fn total_identity_holds() {
        let breakdown = engine()
            .quote(
                &[line(dec!(19.99), 3), line(dec!(0.01), 7)],
                ShippingZone::Domestic,
                dec!(5.25),
            )
            .unwrap();

        assert_eq!(
            breakdown.total,
            breakdown.subtotal - breakdown.discount + breakdown.shipping_cost
        );
    }

    #[test]
    fn repeated_additions_do_not_drift() {
        let lines: Vec<PricingLine> = (0..100).map(|_| line(dec!(0.01), 1)).collect();
        let subtotal = engine().subtotal(&lines).unwrap();
        assert_eq!(subtotal, dec!(1.00));
    }
}
