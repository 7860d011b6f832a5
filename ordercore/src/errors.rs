//! Error types for the order engine.
//!
//! Every expected failure is a typed error; nothing is signalled through
//! panics or stringly-typed exceptions. The taxonomy is layered:
//!
//! - **`ValidationError`**: smart-constructor failures at the boundary
//! - **`OrderError`**: aggregate state-machine rule violations
//! - **`CouponIneligibility`**: why a resolved coupon cannot be applied
//! - **`StoreError`**: storage-port failures, including the atomic
//!   reservation conflict
//! - **`ServiceError`**: the public taxonomy surfaced to calling layers
//!
//! Conversions between layers are explicit `From` impls so each layer can
//! remap variants (e.g. a ledger `InsufficientStock` becomes the public
//! `OutOfStock`).

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::delivery::{CityError, DeliveryStatus, StreetError, ZipCodeError};
use crate::types::{
    CouponCode, CouponCodeError, ItemId, ItemIdError, ItemNameError, MemberId, MemberIdError,
    MemberNameError, Money, OrderId, OrderIdError,
};

/// Errors raised by smart constructors when raw input enters the system.
///
/// These occur only at the boundary; once a domain value exists it is valid
/// everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An identifier did not match its required format.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A display name was blank or too long.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A money amount was negative, too precise, or too large.
    #[error("invalid money amount: {0}")]
    InvalidMoney(String),

    /// A quantity was zero or above the per-line maximum.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A discount rate was outside `[0, 1)` or too precise.
    #[error("invalid discount rate: {0}")]
    InvalidRate(String),

    /// An address field was blank or too long.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A custom validation rule failed.
    #[error("validation failed: {0}")]
    Custom(String),
}

impl From<OrderIdError> for ValidationError {
    fn from(err: OrderIdError) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<ItemIdError> for ValidationError {
    fn from(err: ItemIdError) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<MemberIdError> for ValidationError {
    fn from(err: MemberIdError) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<CouponCodeError> for ValidationError {
    fn from(err: CouponCodeError) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<ItemNameError> for ValidationError {
    fn from(err: ItemNameError) -> Self {
        Self::InvalidName(err.to_string())
    }
}

impl From<MemberNameError> for ValidationError {
    fn from(err: MemberNameError) -> Self {
        Self::InvalidName(err.to_string())
    }
}

impl From<CityError> for ValidationError {
    fn from(err: CityError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<StreetError> for ValidationError {
    fn from(err: StreetError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<ZipCodeError> for ValidationError {
    fn from(err: ZipCodeError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

/// Aggregate rule violations raised by `Order` and `Delivery` mutations.
///
/// Each state error carries the current delivery state so callers can tell
/// the user *why* ("already shipped") rather than just "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    /// An order must contain at least one line.
    #[error("an order requires at least one line")]
    EmptyOrder,

    /// The sum of line totals exceeded the representable money maximum.
    #[error("order total exceeds the representable maximum")]
    TotalOverflow,

    /// Cancellation attempted after the delivery left the cancelable states.
    #[error("cancellation not allowed: delivery is already {status}")]
    CancellationNotAllowed {
        /// Delivery state at the time of the attempt.
        status: DeliveryStatus,
    },

    /// Address update attempted after the delivery locked its address.
    #[error("delivery address can no longer be changed: delivery is {status}")]
    InvalidStateForUpdate {
        /// Delivery state at the time of the attempt.
        status: DeliveryStatus,
    },

    /// A forward delivery transition skipped a state or left a terminal one.
    #[error("invalid delivery transition from {from} to {to}")]
    InvalidTransition {
        /// State the delivery is currently in.
        from: DeliveryStatus,
        /// State the transition attempted to reach.
        to: DeliveryStatus,
    },
}

/// Why a coupon that exists cannot be applied to a particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CouponIneligibility {
    /// The coupon's validity window has not opened yet.
    #[error("coupon is not valid before {starts}")]
    NotYetValid {
        /// Start of the validity window.
        starts: DateTime<Utc>,
    },

    /// The coupon's validity window has closed.
    #[error("coupon expired at {ended}")]
    Expired {
        /// End of the validity window.
        ended: DateTime<Utc>,
    },

    /// The order total is below the coupon's minimum purchase amount.
    #[error("order total {actual} is below the minimum purchase {required}")]
    MinPurchaseNotMet {
        /// Minimum purchase the coupon requires.
        required: Money,
        /// Total the order actually reached.
        actual: Money,
    },
}

/// Errors raised by the storage ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The item targeted by a reserve/release does not exist.
    #[error("item '{0}' not found")]
    ItemNotFound(ItemId),

    /// The conditional decrement found less stock than requested.
    ///
    /// The reservation had no side effect.
    #[error("insufficient stock for item '{item}': requested {requested}, available {available}")]
    InsufficientStock {
        /// Item whose stock was insufficient.
        item: ItemId,
        /// Quantity the reservation asked for.
        requested: u32,
        /// Stock available at the time of the attempt.
        available: u32,
    },

    /// The order targeted by a save does not exist.
    #[error("order '{0}' not found")]
    OrderNotFound(OrderId),

    /// The backing store could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// An unexpected storage fault.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// The public error taxonomy of the order service.
///
/// Calling layers (HTTP handlers, jobs) match on these variants to map
/// failures onto transport-specific responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Input failed validation before touching storage.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The ordering member does not exist.
    #[error("member '{0}' not found")]
    MemberNotFound(MemberId),

    /// The ordered item does not exist.
    #[error("item '{0}' not found")]
    ItemNotFound(ItemId),

    /// The requested order does not exist.
    #[error("order '{0}' not found")]
    OrderNotFound(OrderId),

    /// No coupon exists for the supplied code.
    #[error("coupon '{0}' not found")]
    CouponNotFound(CouponCode),

    /// The atomic stock reservation failed; nothing was created.
    #[error("out of stock for item '{item}': requested {requested}, available {available}")]
    OutOfStock {
        /// Item that could not be reserved.
        item: ItemId,
        /// Quantity the order requested.
        requested: u32,
        /// Stock available at the time of the attempt.
        available: u32,
    },

    /// The coupon exists but cannot be applied to this order.
    ///
    /// The whole create call fails; a requested discount is never silently
    /// dropped.
    #[error("coupon not applicable: {0}")]
    CouponNotApplicable(#[from] CouponIneligibility),

    /// The caller is not the member who owns the order.
    #[error("member '{caller}' does not own order '{order}'")]
    NotOwner {
        /// Order the caller tried to act on.
        order: OrderId,
        /// The caller's identity.
        caller: MemberId,
    },

    /// The delivery state machine rejected a cancellation.
    #[error("cancellation not allowed: delivery is already {status}")]
    CancellationNotAllowed {
        /// Delivery state at the time of the attempt.
        status: DeliveryStatus,
    },

    /// The delivery state machine rejected an address update.
    #[error("delivery address can no longer be changed: delivery is {status}")]
    InvalidStateForUpdate {
        /// Delivery state at the time of the attempt.
        status: DeliveryStatus,
    },

    /// A storage-layer fault unrelated to any business rule.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(item) => Self::ItemNotFound(item),
            StoreError::OrderNotFound(order) => Self::OrderNotFound(order),
            StoreError::InsufficientStock {
                item,
                requested,
                available,
            } => Self::OutOfStock {
                item,
                requested,
                available,
            },
            other => Self::Store(other),
        }
    }
}

/// Type alias for aggregate operation results.
pub type OrderResult<T> = Result<T, OrderError>;

/// Type alias for storage-port results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for service operation results.
pub type ServiceResult<T> = Result<T, ServiceError>;
