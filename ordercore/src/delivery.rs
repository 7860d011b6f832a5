//! Delivery record and its state machine.
//!
//! A `Delivery` belongs to exactly one order: it is created when the order
//! is placed and lives and dies with it. The state machine walks
//! `PLACED → CONFIRMED → SHIPPED → DELIVERED`, with `CANCELED` reachable
//! only from the first two states. Forward transitions are driven by an
//! external fulfillment process; this module enforces the guards.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::errors::{OrderError, OrderResult};

/// City or region line of a shipping address.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct City(String);

/// Street line of a shipping address.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 200),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct Street(String);

/// Postal code of a shipping address.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 20),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ZipCode(String);

/// A structured shipping address.
///
/// Every field is non-blank by construction; "blank address" rejections
/// happen at the boundary, not inside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// City or region.
    pub city: City,
    /// Street line.
    pub street: Street,
    /// Postal code.
    pub zip_code: ZipCode,
}

impl Address {
    /// Assemble an address from its validated fields.
    pub const fn new(city: City, street: Street, zip_code: ZipCode) -> Self {
        Self {
            city,
            street,
            zip_code,
        }
    }
}

/// Shipment status of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Order placed; nothing has moved yet.
    Placed,
    /// Fulfillment confirmed the order.
    Confirmed,
    /// The parcel left the warehouse.
    Shipped,
    /// The parcel arrived. Terminal.
    Delivered,
    /// The order was cancelled before shipping. Terminal.
    Canceled,
}

impl DeliveryStatus {
    /// Whether the order can still be cancelled in this state.
    pub const fn allows_cancellation(self) -> bool {
        matches!(self, Self::Placed | Self::Confirmed)
    }

    /// Whether the shipping address can still be changed in this state.
    pub const fn allows_address_update(self) -> bool {
        matches!(self, Self::Placed | Self::Confirmed)
    }

    /// Whether no further transition is defined from this state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed => write!(f, "PLACED"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Shipped => write!(f, "SHIPPED"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = crate::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLACED" => Ok(Self::Placed),
            "CONFIRMED" => Ok(Self::Confirmed),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(crate::errors::ValidationError::Custom(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

/// The delivery attached to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    address: Address,
    status: DeliveryStatus,
}

impl Delivery {
    /// Create a delivery in the initial `PLACED` state.
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            status: DeliveryStatus::Placed,
        }
    }

    /// Rebuild a delivery from stored state.
    ///
    /// For storage adapters; does not re-run transition guards.
    pub const fn restore(address: Address, status: DeliveryStatus) -> Self {
        Self { address, status }
    }

    /// Current shipment status.
    pub const fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// Current shipping address.
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Replace the shipping address.
    ///
    /// Allowed only while the delivery is `PLACED` or `CONFIRMED`.
    pub fn change_address(&mut self, address: Address) -> OrderResult<()> {
        if !self.status.allows_address_update() {
            return Err(OrderError::InvalidStateForUpdate {
                status: self.status,
            });
        }
        self.address = address;
        Ok(())
    }

    /// Cancel the delivery.
    ///
    /// Allowed only while the delivery is `PLACED` or `CONFIRMED`;
    /// `CANCELED` is terminal.
    pub fn cancel(&mut self) -> OrderResult<()> {
        if !self.status.allows_cancellation() {
            return Err(OrderError::CancellationNotAllowed {
                status: self.status,
            });
        }
        self.status = DeliveryStatus::Canceled;
        Ok(())
    }

    /// Fulfillment confirmed the order.
    pub fn confirm(&mut self) -> OrderResult<()> {
        self.step(DeliveryStatus::Placed, DeliveryStatus::Confirmed)
    }

    /// The parcel left the warehouse.
    pub fn ship(&mut self) -> OrderResult<()> {
        self.step(DeliveryStatus::Confirmed, DeliveryStatus::Shipped)
    }

    /// The parcel arrived.
    pub fn deliver(&mut self) -> OrderResult<()> {
        self.step(DeliveryStatus::Shipped, DeliveryStatus::Delivered)
    }

    // Forward transitions accept only their immediate predecessor state.
    fn step(&mut self, from: DeliveryStatus, to: DeliveryStatus) -> OrderResult<()> {
        if self.status != from {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
