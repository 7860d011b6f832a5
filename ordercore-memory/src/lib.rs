//! In-memory storage adapters for the `OrderCore` order engine.
//!
//! This crate implements every storage port from `ordercore` against one
//! process-local map, useful for tests, examples, and development where
//! persistence is not required.
//!
//! All four ports share a single `RwLock`, so `reserve` performs its
//! check-and-decrement under one exclusive guard — the in-memory
//! equivalent of the conditional `UPDATE` the PostgreSQL adapter issues.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ordercore::errors::{StoreError, StoreResult};
use ordercore::store::{
    CouponCatalog, ItemRecord, MemberDirectory, MemberRecord, OrderStore, Page, PageRequest,
    SortOrder, StockLedger,
};
use ordercore::{Coupon, CouponCode, ItemId, MemberId, Order, OrderId, Quantity};

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<ItemId, ItemRecord>,
    orders: HashMap<OrderId, Order>,
    coupons: HashMap<CouponCode, Coupon>,
    members: HashMap<MemberId, MemberRecord>,
}

/// Thread-safe in-memory implementation of all `ordercore` storage ports.
///
/// Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an item.
    pub fn put_item(&self, item: ItemRecord) {
        let mut state = self.state.write().expect("RwLock poisoned");
        state.items.insert(item.id.clone(), item);
    }

    /// Seed or replace a member.
    pub fn put_member(&self, member: MemberRecord) {
        let mut state = self.state.write().expect("RwLock poisoned");
        state.members.insert(member.id.clone(), member);
    }

    /// Seed or replace a coupon.
    pub fn put_coupon(&self, coupon: Coupon) {
        let mut state = self.state.write().expect("RwLock poisoned");
        state.coupons.insert(coupon.code.clone(), coupon);
    }

    /// Current stock of an item, if it exists. Intended for assertions.
    pub fn stock_of(&self, id: &ItemId) -> Option<u32> {
        let state = self.state.read().expect("RwLock poisoned");
        state.items.get(id).map(|item| item.stock)
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn item(&self, id: &ItemId) -> StoreResult<Option<ItemRecord>> {
        let state = self.state.read().expect("RwLock poisoned");
        Ok(state.items.get(id).cloned())
    }

    async fn reserve(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()> {
        // One exclusive guard spans the check and the decrement, so two
        // racing reservations can never both observe the same stock.
        let mut state = self.state.write().expect("RwLock poisoned");
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::ItemNotFound(id.clone()))?;

        let requested = quantity.value();
        if item.stock < requested {
            return Err(StoreError::InsufficientStock {
                item: id.clone(),
                requested,
                available: item.stock,
            });
        }
        item.stock -= requested;
        Ok(())
    }

    async fn release(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()> {
        let mut state = self.state.write().expect("RwLock poisoned");
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::ItemNotFound(id.clone()))?;

        item.stock = item.stock.checked_add(quantity.value()).ok_or_else(|| {
            StoreError::Internal(format!("stock overflow releasing {quantity} of {id}"))
        })?;
        Ok(())
    }
}

#[async_trait]
impl CouponCatalog for InMemoryStore {
    async fn find_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>> {
        let state = self.state.read().expect("RwLock poisoned");
        Ok(state.coupons.get(code).cloned())
    }
}

#[async_trait]
impl MemberDirectory for InMemoryStore {
    async fn find(&self, id: &MemberId) -> StoreResult<Option<MemberRecord>> {
        let state = self.state.read().expect("RwLock poisoned");
        Ok(state.members.get(id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.write().expect("RwLock poisoned");
        if state.orders.contains_key(order.id()) {
            return Err(StoreError::Internal(format!(
                "order '{}' already exists",
                order.id()
            )));
        }
        state.orders.insert(order.id().clone(), order.clone());
        Ok(())
    }

    async fn find(&self, id: &OrderId) -> StoreResult<Option<Order>> {
        let state = self.state.read().expect("RwLock poisoned");
        Ok(state.orders.get(id).cloned())
    }

    async fn save(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.write().expect("RwLock poisoned");
        let slot = state
            .orders
            .get_mut(order.id())
            .ok_or_else(|| StoreError::OrderNotFound(order.id().clone()))?;
        *slot = order.clone();
        Ok(())
    }

    async fn list_by_member(
        &self,
        member: &MemberId,
        request: &PageRequest,
    ) -> StoreResult<Page<Order>> {
        let state = self.state.read().expect("RwLock poisoned");
        let mut matching: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.member_id() == member)
            .cloned()
            .collect();

        // UUIDv7 order ids break timestamp ties deterministically.
        matching.sort_by(|a, b| (a.ordered_at(), a.id()).cmp(&(b.ordered_at(), b.id())));
        if request.sort == SortOrder::NewestFirst {
            matching.reverse();
        }

        let total_items =
            u64::try_from(matching.len()).map_err(|e| StoreError::Internal(e.to_string()))?;
        let offset =
            usize::try_from(request.offset()).map_err(|e| StoreError::Internal(e.to_string()))?;
        let limit = u32::from(request.size) as usize;
        let items: Vec<Order> = matching.into_iter().skip(offset).take(limit).collect();

        Ok(Page::new(items, request, total_items))
    }
}
