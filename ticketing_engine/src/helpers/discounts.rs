//! The discount stack.
//!
//! A single pure function that applies the three discount layers in their fixed order:
//! voucher, then coupon, then loyalty points. Each layer is capped by what is left of the
//! subtotal after the layers above it, so the payable total can never go negative. Eligibility
//! (voucher window, coupon expiry, ownership) is the storage layer's problem — by the time the
//! amounts arrive here they belong to codes that have already been atomically redeemed.
use tix_common::Money;

/// Inputs to the discount stack for one transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscountInputs {
    pub subtotal: Money,
    /// Face value of the redeemed voucher, if any.
    pub voucher_discount: Option<Money>,
    /// Face value of the redeemed coupon, if any.
    pub coupon_discount: Option<Money>,
    /// Points the customer asked to spend.
    pub requested_points: Money,
    /// The customer's current non-expired point balance.
    pub available_points: Money,
}

/// The capped, ordered result. `total` is what the customer still owes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountBreakdown {
    pub voucher_discount: Money,
    pub coupon_discount: Money,
    pub points_used: Money,
    pub total: Money,
}

/// Applies the discount stack. The order is part of the product contract and must not change:
/// reordering the layers changes who absorbs the cap when discounts exceed the subtotal.
///
/// Requested points above the available balance are silently capped, not rejected — the customer
/// simply spends everything they have.
pub fn stack(inputs: DiscountInputs) -> DiscountBreakdown {
    let subtotal = inputs.subtotal.floored();

    let voucher_discount = inputs.voucher_discount.unwrap_or_default().min(subtotal);
    let after_voucher = subtotal - voucher_discount;

    let coupon_discount = inputs.coupon_discount.unwrap_or_default().min(after_voucher);
    let max_payable = after_voucher - coupon_discount;

    let points_used = inputs
        .requested_points
        .floored()
        .min(inputs.available_points.floored())
        .min(max_payable);

    let total = (max_payable - points_used).floored();
    DiscountBreakdown { voucher_discount, coupon_discount, points_used, total }
}

#[cfg(test)]
mod test {
    use super::*;

    fn money(v: i64) -> Money {
        Money::from(v)
    }

    #[test]
    fn no_discounts_leaves_the_subtotal_untouched() {
        let result = stack(DiscountInputs { subtotal: money(150_000), ..Default::default() });
        assert_eq!(result.voucher_discount, Money::zero());
        assert_eq!(result.coupon_discount, Money::zero());
        assert_eq!(result.points_used, Money::zero());
        assert_eq!(result.total, money(150_000));
    }

    #[test]
    fn stacks_voucher_then_coupon_then_points() {
        let result = stack(DiscountInputs {
            subtotal: money(100_000),
            voucher_discount: Some(money(30_000)),
            coupon_discount: Some(money(20_000)),
            requested_points: money(10_000),
            available_points: money(50_000),
        });
        assert_eq!(result.voucher_discount, money(30_000));
        assert_eq!(result.coupon_discount, money(20_000));
        assert_eq!(result.points_used, money(10_000));
        assert_eq!(result.total, money(40_000));
    }

    #[test]
    fn caps_points_at_available_balance() {
        // Asking for more points than you own is not an error; you just spend what you have.
        let result = stack(DiscountInputs {
            subtotal: money(100_000),
            voucher_discount: Some(money(30_000)),
            coupon_discount: Some(money(20_000)),
            requested_points: money(60_000),
            available_points: money(40_000),
        });
        assert_eq!(result.points_used, money(40_000));
        assert_eq!(result.total, money(10_000));
    }

    #[test]
    fn voucher_is_capped_by_the_subtotal() {
        let result = stack(DiscountInputs {
            subtotal: money(25_000),
            voucher_discount: Some(money(40_000)),
            coupon_discount: Some(money(10_000)),
            ..Default::default()
        });
        assert_eq!(result.voucher_discount, money(25_000));
        assert_eq!(result.coupon_discount, Money::zero());
        assert_eq!(result.total, Money::zero());
    }

    #[test]
    fn coupon_only_sees_what_the_voucher_left() {
        let result = stack(DiscountInputs {
            subtotal: money(50_000),
            voucher_discount: Some(money(45_000)),
            coupon_discount: Some(money(20_000)),
            ..Default::default()
        });
        assert_eq!(result.coupon_discount, money(5_000));
        assert_eq!(result.total, Money::zero());
    }

    #[test]
    fn points_cannot_push_the_total_negative() {
        let result = stack(DiscountInputs {
            subtotal: money(10_000),
            voucher_discount: None,
            coupon_discount: None,
            requested_points: money(99_000),
            available_points: money(99_000),
        });
        assert_eq!(result.points_used, money(10_000));
        assert_eq!(result.total, Money::zero());
    }

    #[test]
    fn negative_point_requests_are_treated_as_zero() {
        let result = stack(DiscountInputs {
            subtotal: money(10_000),
            requested_points: money(-5_000),
            available_points: money(20_000),
            ..Default::default()
        });
        assert_eq!(result.points_used, Money::zero());
        assert_eq!(result.total, money(10_000));
    }
}
