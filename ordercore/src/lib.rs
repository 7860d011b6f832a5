//! `OrderCore` — the order lifecycle engine of a marketplace backend.
//!
//! The crate owns the one subsystem of the marketplace with real
//! invariants: placing an order reserves stock atomically, attaches a
//! delivery with its own state machine, optionally applies a coupon
//! discount, and supports cancellation that releases the reservation
//! again. Everything else (members, items, boards, chat) is a
//! collaborator consumed by reference through the storage ports.
//!
//! Storage is pluggable: `ordercore-memory` backs tests and development,
//! `ordercore-postgres` backs production.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coupon;
pub mod delivery;
pub mod errors;
pub mod order;
pub mod service;
pub mod store;
pub mod types;
pub mod view;

pub use coupon::{Coupon, Discount};
pub use delivery::{Address, City, Delivery, DeliveryStatus, Street, ZipCode};
pub use errors::{
    CouponIneligibility, OrderError, OrderResult, ServiceError, ServiceResult, StoreError,
    StoreResult, ValidationError,
};
pub use order::{AppliedCoupon, Order, OrderLine, OrderStatus};
pub use service::{OrderService, PlaceOrder};
pub use store::{
    CouponCatalog, ItemRecord, MemberDirectory, MemberRecord, OrderStore, Page, PageRequest,
    PageSize, SortOrder, StockLedger,
};
pub use types::{
    CouponCode, DiscountRate, ItemId, ItemName, MemberId, MemberName, Money, OrderId, Quantity,
    Timestamp,
};
pub use view::{DeliveryView, OrderLineView, OrderView};
