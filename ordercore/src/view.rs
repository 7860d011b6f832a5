//! Read projections of the order aggregate.
//!
//! Views are plain serializable data handed to calling layers; they carry
//! everything a client renders (names included) so readers never walk the
//! aggregate or re-fetch collaborators.

use serde::{Deserialize, Serialize};

use crate::delivery::{Address, DeliveryStatus};
use crate::order::{Order, OrderStatus};
use crate::store::MemberRecord;
use crate::types::{CouponCode, ItemId, ItemName, MemberId, MemberName, Money, OrderId, Timestamp};

/// One order line as rendered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineView {
    /// Item identity.
    pub item_id: ItemId,
    /// Item name as it read at order time.
    pub item_name: ItemName,
    /// Unit price snapshot.
    pub unit_price: Money,
    /// Ordered quantity.
    pub quantity: u32,
    /// `unit_price × quantity`.
    pub line_total: Money,
}

/// Delivery details as rendered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryView {
    /// Shipping address.
    pub address: Address,
    /// Current shipment status.
    pub status: DeliveryStatus,
}

/// The full order read projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    /// Order identity.
    pub order_id: OrderId,
    /// Ordering member's identity.
    pub member_id: MemberId,
    /// Ordering member's display name.
    pub member_name: MemberName,
    /// The ordered lines.
    pub lines: Vec<OrderLineView>,
    /// Delivery address and status.
    pub delivery: DeliveryView,
    /// When the order was placed.
    pub ordered_at: Timestamp,
    /// Current order status.
    pub status: OrderStatus,
    /// Code of the applied coupon, if any.
    pub coupon_code: Option<CouponCode>,
    /// Discount taken off the total (zero without a coupon).
    pub discount_amount: Money,
    /// The amount the member pays.
    pub total_price: Money,
}

impl OrderView {
    /// Project an aggregate plus its member record into a view.
    pub fn project(order: &Order, member: &MemberRecord) -> Self {
        Self {
            order_id: order.id().clone(),
            member_id: order.member_id().clone(),
            member_name: member.name.clone(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineView {
                    item_id: line.item_id().clone(),
                    item_name: line.item_name().clone(),
                    unit_price: line.unit_price(),
                    quantity: line.quantity().value(),
                    line_total: line.line_total(),
                })
                .collect(),
            delivery: DeliveryView {
                address: order.delivery().address().clone(),
                status: order.delivery().status(),
            },
            ordered_at: order.ordered_at(),
            status: order.status(),
            coupon_code: order.coupon().map(|applied| applied.code.clone()),
            discount_amount: order.discount_amount(),
            total_price: order.total_price(),
        }
    }
}
