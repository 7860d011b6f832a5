//! Coupon catalog types and discount computation.
//!
//! A coupon is an immutable discount rule looked up by code: either a flat
//! amount or a percentage rate, optionally gated by a minimum purchase and
//! a validity window. Eligibility is checked by the order service before a
//! coupon reaches the aggregate; the discount arithmetic itself lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CouponIneligibility;
use crate::types::{CouponCode, DiscountRate, Money};

/// The discount a coupon grants.
///
/// Exactly one of the two kinds; the "neither set" state of nullable-field
/// designs is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discount {
    /// A fixed amount off, capped at the order total.
    Flat(Money),
    /// A fraction of the order total.
    Rate(DiscountRate),
}

/// A discount rule from the coupon catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Unique code as printed on the coupon.
    pub code: CouponCode,
    /// The discount this coupon grants.
    pub discount: Discount,
    /// Minimum order total required to use the coupon.
    pub min_purchase: Option<Money>,
    /// Start of the validity window, if bounded below.
    pub valid_from: Option<DateTime<Utc>>,
    /// End of the validity window, if bounded above.
    pub valid_until: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Create a flat-amount coupon with no eligibility constraints.
    pub const fn flat(code: CouponCode, amount: Money) -> Self {
        Self {
            code,
            discount: Discount::Flat(amount),
            min_purchase: None,
            valid_from: None,
            valid_until: None,
        }
    }

    /// Create a percentage coupon with no eligibility constraints.
    pub const fn rate(code: CouponCode, rate: DiscountRate) -> Self {
        Self {
            code,
            discount: Discount::Rate(rate),
            min_purchase: None,
            valid_from: None,
            valid_until: None,
        }
    }

    /// Require a minimum order total.
    #[must_use]
    pub const fn with_min_purchase(mut self, min_purchase: Money) -> Self {
        self.min_purchase = Some(min_purchase);
        self
    }

    /// Bound the validity window below.
    #[must_use]
    pub const fn with_valid_from(mut self, from: DateTime<Utc>) -> Self {
        self.valid_from = Some(from);
        self
    }

    /// Bound the validity window above.
    #[must_use]
    pub const fn with_valid_until(mut self, until: DateTime<Utc>) -> Self {
        self.valid_until = Some(until);
        self
    }

    /// Check whether this coupon may be applied to an order totaling
    /// `total` at time `now`.
    ///
    /// Returns the first failing constraint: window opening, window close,
    /// then minimum purchase. A total exactly at the minimum is eligible.
    pub fn eligibility(
        &self,
        total: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CouponIneligibility> {
        if let Some(starts) = self.valid_from {
            if now < starts {
                return Err(CouponIneligibility::NotYetValid { starts });
            }
        }
        if let Some(ended) = self.valid_until {
            if now > ended {
                return Err(CouponIneligibility::Expired { ended });
            }
        }
        if let Some(required) = self.min_purchase {
            if total < required {
                return Err(CouponIneligibility::MinPurchaseNotMet {
                    required,
                    actual: total,
                });
            }
        }
        Ok(())
    }

    /// The discount this coupon yields on `total`.
    ///
    /// Flat amounts are capped at the total so the discounted price never
    /// goes negative; rates are below 1 and need no cap.
    pub fn discount_for(&self, total: Money) -> Money {
        match self.discount {
            Discount::Flat(amount) => amount.min(total),
            Discount::Rate(rate) => rate.apply_to(total),
        }
    }
}
