//! The order aggregate.
//!
//! An `Order` owns its lines and its delivery outright and references the
//! member and items by id only; there are no back-pointers into a live
//! object graph. All mutations go through methods that enforce the
//! delivery state machine first, so an order can never reach a state its
//! delivery forbids.
//!
//! Stock is *not* touched here: the aggregate records what was reserved,
//! and the order service drives the ledger so that releases happen before
//! the cancelled status is persisted.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::coupon::Coupon;
use crate::delivery::{Address, Delivery};
use crate::errors::{OrderError, OrderResult};
use crate::types::{CouponCode, ItemId, ItemName, MemberId, Money, OrderId, Quantity, Timestamp};

/// One item/quantity entry within an order.
///
/// Unit price and item name are snapshots taken at order time; later
/// catalog edits do not rewrite order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    item_id: ItemId,
    item_name: ItemName,
    unit_price: Money,
    quantity: Quantity,
}

impl OrderLine {
    /// Create a line, validating that its total fits the money range.
    pub fn new(
        item_id: ItemId,
        item_name: ItemName,
        unit_price: Money,
        quantity: Quantity,
    ) -> OrderResult<Self> {
        if unit_price.times(quantity).is_err() {
            return Err(OrderError::TotalOverflow);
        }
        Ok(Self {
            item_id,
            item_name,
            unit_price,
            quantity,
        })
    }

    /// The item this line reserves stock from.
    pub const fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Item name snapshot taken at order time.
    pub const fn item_name(&self) -> &ItemName {
        &self.item_name
    }

    /// Unit price snapshot taken at order time.
    pub const fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// Quantity reserved for this line.
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// `unit_price × quantity`, recomputed on demand.
    pub fn line_total(&self) -> Money {
        self.unit_price
            .times(self.quantity)
            .expect("line total validated at construction")
    }
}

/// Lifecycle status of an order, distinct from its delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order stands and its stock is reserved.
    Ordered,
    /// The order was cancelled and its stock released. Terminal.
    Canceled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ordered => write!(f, "ORDERED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDERED" => Ok(Self::Ordered),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(crate::errors::ValidationError::Custom(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// A coupon as applied to one order: the code and the amount it took off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    /// Code of the coupon that was applied.
    pub code: CouponCode,
    /// Discount the coupon yielded against this order's total.
    pub amount: Money,
}

/// The order aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    member_id: MemberId,
    delivery: Delivery,
    lines: Vec<OrderLine>,
    coupon: Option<AppliedCoupon>,
    ordered_at: Timestamp,
    status: OrderStatus,
}

impl Order {
    /// Place a new order.
    ///
    /// Requires at least one line; the delivery starts `PLACED` and the
    /// order `ORDERED`. Stock for every line must already be reserved by
    /// the caller.
    pub fn place(
        id: OrderId,
        member_id: MemberId,
        address: Address,
        lines: Vec<OrderLine>,
        ordered_at: Timestamp,
    ) -> OrderResult<Self> {
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        // Validate the sum once so total accessors stay infallible.
        let mut total = Money::zero();
        for line in &lines {
            total = total
                .checked_add(line.line_total())
                .map_err(|_| OrderError::TotalOverflow)?;
        }
        Ok(Self {
            id,
            member_id,
            delivery: Delivery::new(address),
            lines,
            coupon: None,
            ordered_at,
            status: OrderStatus::Ordered,
        })
    }

    /// Rebuild an order from stored state.
    ///
    /// For storage adapters; trusts the stored state and re-runs no guards.
    pub const fn restore(
        id: OrderId,
        member_id: MemberId,
        delivery: Delivery,
        lines: Vec<OrderLine>,
        coupon: Option<AppliedCoupon>,
        ordered_at: Timestamp,
        status: OrderStatus,
    ) -> Self {
        Self {
            id,
            member_id,
            delivery,
            lines,
            coupon,
            ordered_at,
            status,
        }
    }

    /// This order's identity.
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// The member who placed the order.
    pub const fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// The delivery owned by this order.
    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// The order lines.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// The applied coupon, if any.
    pub const fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    /// When the order was placed.
    pub const fn ordered_at(&self) -> Timestamp {
        self.ordered_at
    }

    /// Current order status.
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Whether `member` placed this order.
    pub fn is_owned_by(&self, member: &MemberId) -> bool {
        &self.member_id == member
    }

    /// Sum of line totals before any discount, recomputed on demand.
    pub fn total_before_discount(&self) -> Money {
        self.lines
            .iter()
            .map(OrderLine::line_total)
            .try_fold(Money::zero(), Money::checked_add)
            .expect("order total validated at placement")
    }

    /// The discount taken off this order (zero when no coupon applied).
    pub fn discount_amount(&self) -> Money {
        self.coupon
            .as_ref()
            .map_or_else(Money::zero, |applied| applied.amount)
    }

    /// The amount the member pays: total before discount minus discount.
    pub fn total_price(&self) -> Money {
        self.total_before_discount()
            .subtract(self.discount_amount())
            .expect("discount never exceeds the total")
    }

    /// Apply a coupon the service has already resolved and found eligible.
    ///
    /// Computes and stores the discount against the current total. Flat
    /// amounts are capped at the total, so the invariant
    /// `discount ≤ total_before_discount` holds for every coupon kind.
    pub fn apply_coupon(&mut self, coupon: &Coupon) {
        let amount = coupon.discount_for(self.total_before_discount());
        self.coupon = Some(AppliedCoupon {
            code: coupon.code.clone(),
            amount,
        });
    }

    /// Cancel the order.
    ///
    /// The delivery state machine guards the transition: only `PLACED` or
    /// `CONFIRMED` deliveries can be cancelled. On success both the
    /// delivery and the order are `CANCELED`; the caller must release each
    /// line's reserved stock and persist the flip only after every release
    /// succeeded.
    pub fn cancel(&mut self) -> OrderResult<()> {
        self.delivery.cancel()?;
        self.status = OrderStatus::Canceled;
        Ok(())
    }

    /// Replace the delivery address while the delivery still allows it.
    pub fn update_delivery_address(&mut self, address: Address) -> OrderResult<()> {
        self.delivery.change_address(address)
    }

    /// Fulfillment confirmed the order.
    pub fn mark_confirmed(&mut self) -> OrderResult<()> {
        self.delivery.confirm()
    }

    /// Fulfillment shipped the parcel.
    pub fn mark_shipped(&mut self) -> OrderResult<()> {
        self.delivery.ship()
    }

    /// Fulfillment recorded the parcel as delivered.
    pub fn mark_delivered(&mut self) -> OrderResult<()> {
        self.delivery.deliver()
    }
}
