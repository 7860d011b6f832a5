//! Storage ports consumed by the order service.
//!
//! These traits are the backend-independent seams of the engine; the
//! workspace ships an in-memory implementation for tests and development
//! and a PostgreSQL implementation for production.
//!
//! The one contract with real teeth is [`StockLedger::reserve`]: it must
//! be a *single atomic conditional update* — check and decrement as one
//! operation — because concurrent order creation against the same item is
//! the only data race in the system. A read followed by a separate write
//! is not a valid implementation.

use async_trait::async_trait;
use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::coupon::Coupon;
use crate::errors::StoreResult;
use crate::order::Order;
use crate::types::{CouponCode, ItemId, ItemName, MemberId, MemberName, Money, OrderId, Quantity};

/// A sellable item as the order engine sees it.
///
/// Owned by the (external) catalog subsystem; the engine reads price and
/// name for snapshots and adjusts `stock` only through the ledger calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Item identity.
    pub id: ItemId,
    /// Display name.
    pub name: ItemName,
    /// Current unit price.
    pub price: Money,
    /// Units available for reservation. Never negative by construction.
    pub stock: u32,
}

impl ItemRecord {
    /// Assemble an item record.
    pub const fn new(id: ItemId, name: ItemName, price: Money, stock: u32) -> Self {
        Self {
            id,
            name,
            price,
            stock,
        }
    }
}

/// A member as the order engine sees it: an already-authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Member identity.
    pub id: MemberId,
    /// Display name, used by order views.
    pub name: MemberName,
}

impl MemberRecord {
    /// Assemble a member record.
    pub const fn new(id: MemberId, name: MemberName) -> Self {
        Self { id, name }
    }
}

/// Number of orders per page. Between 1 and 100.
#[nutype(
    validate(greater = 0, less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct PageSize(u32);

impl PageSize {
    /// The default page size (20).
    pub fn twenty() -> Self {
        Self::try_new(20).expect("20 is a valid page size")
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::twenty()
    }
}

/// Sort direction for order listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Most recently placed orders first (the default).
    #[default]
    NewestFirst,
    /// Oldest orders first.
    OldestFirst,
}

/// A page request: 0-based page number, page size, sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// 0-based page number.
    pub page: u32,
    /// Number of orders per page.
    pub size: PageSize,
    /// Sort direction.
    pub sort: SortOrder,
}

impl PageRequest {
    /// First page with the default size and sort.
    pub fn first() -> Self {
        Self::default()
    }

    /// Request a specific 0-based page.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Override the page size.
    #[must_use]
    pub fn with_size(mut self, size: PageSize) -> Self {
        self.size = size;
        self
    }

    /// Override the sort direction.
    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Number of records to skip before this page starts.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(u32::from(self.size))
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// The records on this page.
    pub items: Vec<T>,
    /// 0-based page number this page corresponds to.
    pub page: u32,
    /// Page size the request asked for.
    pub size: u32,
    /// Total matching records across all pages.
    pub total_items: u64,
}

impl<T> Page<T> {
    /// Assemble a page from the records and the request it answers.
    pub fn new(items: Vec<T>, request: &PageRequest, total_items: u64) -> Self {
        Self {
            items,
            page: request.page,
            size: u32::from(request.size),
            total_items,
        }
    }

    /// Total number of pages at this page size.
    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(u64::from(self.size))
    }

    /// Whether this page holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of records on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Map every record on the page, keeping the pagination totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
        }
    }
}

/// Stock ledger port: lookup plus the atomic reserve/release pair.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Look up an item by id.
    async fn item(&self, id: &ItemId) -> StoreResult<Option<ItemRecord>>;

    /// Atomically reserve `quantity` units of `id`.
    ///
    /// Succeeds and decrements iff `stock >= quantity`; otherwise fails
    /// with `StoreError::InsufficientStock` and changes nothing. The check
    /// and the decrement are one operation.
    async fn reserve(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()>;

    /// Atomically return `quantity` units of `id` to stock.
    ///
    /// At-most-once per order line is the caller's responsibility; the
    /// aggregate's cancel guard enforces it.
    async fn release(&self, id: &ItemId, quantity: Quantity) -> StoreResult<()>;
}

/// Coupon catalog port: lookup by code.
#[async_trait]
pub trait CouponCatalog: Send + Sync {
    /// Find the coupon for `code`, if one was ever issued.
    async fn find_by_code(&self, code: &CouponCode) -> StoreResult<Option<Coupon>>;
}

/// Member directory port: existence and display-name lookup.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Find a member by id.
    async fn find(&self, id: &MemberId) -> StoreResult<Option<MemberRecord>>;
}

/// Order store port.
///
/// `insert` persists the whole aggregate — order, delivery, lines — as one
/// transaction. Orders are never deleted; history is append-only.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a newly placed order with its delivery and lines.
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    /// Load an order aggregate by id.
    async fn find(&self, id: &OrderId) -> StoreResult<Option<Order>>;

    /// Persist the mutated state of an existing order.
    async fn save(&self, order: &Order) -> StoreResult<()>;

    /// List a member's orders, paginated, ordered by placement time.
    async fn list_by_member(
        &self,
        member: &MemberId,
        request: &PageRequest,
    ) -> StoreResult<Page<Order>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_bounds() {
        assert!(PageSize::try_new(1).is_ok());
        assert!(PageSize::try_new(100).is_ok());
        assert!(PageSize::try_new(0).is_err());
        assert!(PageSize::try_new(101).is_err());
        assert_eq!(u32::from(PageSize::default()), 20);
    }

    #[test]
    fn page_request_defaults_and_offset() {
        let request = PageRequest::first();
        assert_eq!(request.page, 0);
        assert_eq!(request.sort, SortOrder::NewestFirst);
        assert_eq!(request.offset(), 0);

        let request = PageRequest::first()
            .with_page(3)
            .with_size(PageSize::try_new(25).unwrap());
        assert_eq!(request.offset(), 75);
    }

    #[test]
    fn page_totals() {
        let request = PageRequest::first().with_size(PageSize::try_new(10).unwrap());
        let page = Page::new(vec![1, 2, 3], &request, 23);
        assert_eq!(page.len(), 3);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.is_empty());

        let empty: Page<i32> = Page::new(vec![], &request, 0);
        assert_eq!(empty.total_pages(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn page_map_keeps_totals() {
        let request = PageRequest::first();
        let page = Page::new(vec![1, 2], &request, 7).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total_items, 7);
    }
}
