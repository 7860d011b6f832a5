//! The order service: orchestration over the storage ports.
//!
//! Each operation is a bounded sequence of port calls. The service owns
//! the ordering that keeps stock consistent:
//!
//! - **placing** reserves stock first, then resolves the coupon and
//!   persists; every failure after the reservation releases it again
//!   before the error surfaces (compensation), so a failed create leaves
//!   no trace;
//! - **cancelling** flips the aggregate in memory, releases every line,
//!   and persists the flipped status only after all releases succeeded —
//!   a crash mid-way leaves the order safely re-cancelable.
//!
//! Authorization is an ownership check against the caller's
//! already-verified identity; producing that identity is the auth
//! collaborator's job, not ours.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::delivery::Address;
use crate::errors::{OrderError, ServiceError, ServiceResult, ValidationError};
use crate::order::{Order, OrderLine};
use crate::store::{
    CouponCatalog, MemberDirectory, MemberRecord, OrderStore, Page, PageRequest, StockLedger,
};
use crate::types::{CouponCode, ItemId, MemberId, OrderId, Quantity, Timestamp};
use crate::view::OrderView;

/// A request to place an order: one item, a quantity, a shipping address,
/// and optionally a coupon code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    /// The ordering member.
    pub member_id: MemberId,
    /// The item to order.
    pub item_id: ItemId,
    /// How many units to order.
    pub quantity: Quantity,
    /// Where to ship.
    pub address: Address,
    /// Coupon to apply, if the member entered one.
    pub coupon_code: Option<CouponCode>,
}

impl PlaceOrder {
    /// Assemble a request without a coupon.
    pub const fn new(
        member_id: MemberId,
        item_id: ItemId,
        quantity: Quantity,
        address: Address,
    ) -> Self {
        Self {
            member_id,
            item_id,
            quantity,
            address,
            coupon_code: None,
        }
    }

    /// Attach a coupon code.
    #[must_use]
    pub fn with_coupon(mut self, code: CouponCode) -> Self {
        self.coupon_code = Some(code);
        self
    }
}

/// Orchestrates the order lifecycle against the storage ports.
#[derive(Debug, Clone)]
pub struct OrderService<L, O, C, M> {
    ledger: L,
    orders: O,
    coupons: C,
    members: M,
}

impl<L, O, C, M> OrderService<L, O, C, M>
where
    L: StockLedger,
    O: OrderStore,
    C: CouponCatalog,
    M: MemberDirectory,
{
    /// Wire the service to its ports.
    pub const fn new(ledger: L, orders: O, coupons: C, members: M) -> Self {
        Self {
            ledger,
            orders,
            coupons,
            members,
        }
    }

    /// Place an order.
    ///
    /// Verifies the member and item, reserves stock atomically (failing
    /// with `OutOfStock` creates nothing), snapshots price and name into
    /// the line, resolves and applies the coupon if one was supplied, and
    /// persists the aggregate in one transaction. An ineligible coupon
    /// fails the whole call; the fresh reservation is released on every
    /// post-reservation failure path.
    #[instrument(skip_all, fields(member = %request.member_id, item = %request.item_id))]
    pub async fn place_order(&self, request: PlaceOrder) -> ServiceResult<OrderView> {
        let member = self
            .members
            .find(&request.member_id)
            .await?
            .ok_or_else(|| ServiceError::MemberNotFound(request.member_id.clone()))?;
        let item = self
            .ledger
            .item(&request.item_id)
            .await?
            .ok_or_else(|| ServiceError::ItemNotFound(request.item_id.clone()))?;

        let line = OrderLine::new(item.id, item.name, item.price, request.quantity)
            .map_err(map_rule_error)?;

        // The atomic conditional decrement; maps to OutOfStock on conflict.
        self.ledger.reserve(&request.item_id, request.quantity).await?;
        debug!(quantity = request.quantity.value(), "stock reserved");

        // From here on a live reservation is held: release it on any
        // failure before surfacing the error.
        let order = match self.assemble(&request, line).await {
            Ok(order) => order,
            Err(err) => {
                self.release_reservation(&request.item_id, request.quantity).await;
                return Err(err);
            }
        };

        if let Err(err) = self.orders.insert(&order).await {
            self.release_reservation(&request.item_id, request.quantity).await;
            return Err(err.into());
        }

        info!(order = %order.id(), total = %order.total_price(), "order placed");
        Ok(OrderView::project(&order, &member))
    }

    /// Replace the delivery address of an order the caller owns.
    ///
    /// Allowed only while the delivery state machine still permits address
    /// changes; otherwise fails with `InvalidStateForUpdate`.
    #[instrument(skip_all, fields(order = %order_id, caller = %caller))]
    pub async fn update_delivery_address(
        &self,
        order_id: &OrderId,
        caller: &MemberId,
        address: Address,
    ) -> ServiceResult<OrderView> {
        let mut order = self.load_owned(order_id, caller).await?;

        order.update_delivery_address(address).map_err(map_rule_error)?;
        self.orders.save(&order).await?;

        info!("delivery address updated");
        let member = self.member_of(&order).await?;
        Ok(OrderView::project(&order, &member))
    }

    /// Cancel an order the caller owns.
    ///
    /// The delivery state guard decides whether cancellation is still
    /// possible; on success every line's reservation is released and the
    /// cancelled status is persisted last.
    #[instrument(skip_all, fields(order = %order_id, caller = %caller))]
    pub async fn cancel_order(&self, order_id: &OrderId, caller: &MemberId) -> ServiceResult<()> {
        let mut order = self.load_owned(order_id, caller).await?;

        order.cancel().map_err(map_rule_error)?;

        // Releases first; the flipped status is persisted only after all
        // of them succeeded, so a fault here leaves the order re-cancelable.
        for line in order.lines() {
            self.ledger.release(line.item_id(), line.quantity()).await?;
            debug!(item = %line.item_id(), quantity = line.quantity().value(), "stock released");
        }
        self.orders.save(&order).await?;

        info!("order cancelled");
        Ok(())
    }

    /// Load one order the caller owns, projected for reading.
    #[instrument(skip_all, fields(order = %order_id, caller = %caller))]
    pub async fn get_order(&self, order_id: &OrderId, caller: &MemberId) -> ServiceResult<OrderView> {
        let order = self.load_owned(order_id, caller).await?;
        let member = self.member_of(&order).await?;
        Ok(OrderView::project(&order, &member))
    }

    /// List a member's orders, paginated, newest first by default.
    #[instrument(skip_all, fields(member = %member_id, page = request.page))]
    pub async fn list_orders(
        &self,
        member_id: &MemberId,
        request: &PageRequest,
    ) -> ServiceResult<Page<OrderView>> {
        let member = self
            .members
            .find(member_id)
            .await?
            .ok_or_else(|| ServiceError::MemberNotFound(member_id.clone()))?;

        let page = self.orders.list_by_member(member_id, request).await?;
        Ok(page.map(|order| OrderView::project(&order, &member)))
    }

    // Builds the aggregate and applies the coupon, without touching stock.
    async fn assemble(&self, request: &PlaceOrder, line: OrderLine) -> ServiceResult<Order> {
        let mut order = Order::place(
            OrderId::generate(),
            request.member_id.clone(),
            request.address.clone(),
            vec![line],
            Timestamp::now(),
        )
        .map_err(map_rule_error)?;

        if let Some(code) = &request.coupon_code {
            let coupon = self
                .coupons
                .find_by_code(code)
                .await?
                .ok_or_else(|| ServiceError::CouponNotFound(code.clone()))?;
            coupon.eligibility(order.total_before_discount(), Utc::now())?;
            order.apply_coupon(&coupon);
            debug!(coupon = %code, discount = %order.discount_amount(), "coupon applied");
        }

        Ok(order)
    }

    // Compensation for a reservation whose order never came to be. A
    // failed release here cannot fail the call twice; it is logged for
    // the operator instead.
    async fn release_reservation(&self, item_id: &ItemId, quantity: Quantity) {
        if let Err(err) = self.ledger.release(item_id, quantity).await {
            warn!(item = %item_id, quantity = quantity.value(), error = %err,
                "failed to release reservation during compensation");
        }
    }

    async fn load_owned(&self, order_id: &OrderId, caller: &MemberId) -> ServiceResult<Order> {
        let order = self
            .orders
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.clone()))?;
        if !order.is_owned_by(caller) {
            return Err(ServiceError::NotOwner {
                order: order_id.clone(),
                caller: caller.clone(),
            });
        }
        Ok(order)
    }

    async fn member_of(&self, order: &Order) -> ServiceResult<MemberRecord> {
        self.members
            .find(order.member_id())
            .await?
            .ok_or_else(|| ServiceError::MemberNotFound(order.member_id().clone()))
    }
}

// Aggregate rule violations surfaced through the public taxonomy.
fn map_rule_error(err: OrderError) -> ServiceError {
    match err {
        OrderError::CancellationNotAllowed { status } => {
            ServiceError::CancellationNotAllowed { status }
        }
        OrderError::InvalidStateForUpdate { status } => {
            ServiceError::InvalidStateForUpdate { status }
        }
        other => ServiceError::Validation(ValidationError::Custom(other.to_string())),
    }
}
