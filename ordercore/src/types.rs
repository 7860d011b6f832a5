//! Identifier and value types for the order engine.
//!
//! All types use smart constructors so that validity is established at
//! construction time, following the "parse, don't validate" principle:
//! once a value exists, no further checking is needed downstream.

use chrono::{DateTime, Utc};
use nutype::nutype;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Order identifier.
///
/// Format: `ORD-{UPPERCASE_ALPHANUMERIC}`, e.g. `ORD-A1B2C3D4`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^ORD-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a new order id with a UUIDv7 suffix.
    ///
    /// UUIDv7 suffixes keep generated ids roughly time-ordered.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("ORD-{uuid}")).expect("generated OrderId should be valid")
    }
}

/// Item identifier.
///
/// Format: `ITM-{UPPERCASE_ALPHANUMERIC}`, e.g. `ITM-BOOK0001`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^ITM-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a new item id with a UUIDv7 suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("ITM-{uuid}")).expect("generated ItemId should be valid")
    }
}

/// Member identifier.
///
/// Format: `MBR-{UPPERCASE_ALPHANUMERIC}`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 50, regex = r"^MBR-[A-Z0-9]+$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct MemberId(String);

impl MemberId {
    /// Generate a new member id with a UUIDv7 suffix.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7().simple().to_string().to_uppercase();
        Self::try_new(format!("MBR-{uuid}")).expect("generated MemberId should be valid")
    }
}

/// Coupon code as printed on the coupon.
///
/// Uppercase alphanumeric with interior hyphens, e.g. `WELCOME-5000`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 40, regex = r"^[A-Z0-9][A-Z0-9-]*$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Display,
        AsRef,
        Deref,
        Serialize,
        Deserialize,
        TryFrom
    )
)]
pub struct CouponCode(String);

/// Item display name.
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
pub struct ItemName(String);

/// Member display name.
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
pub struct MemberName(String);

/// Quantity of one item on an order line.
///
/// Must be positive; at most 1000 per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    /// Maximum quantity per order line.
    pub const MAX_PER_LINE: u32 = 1000;

    /// Create a new line quantity.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::InvalidQuantity(
                "quantity must be greater than 0".to_string(),
            ));
        }
        if value > Self::MAX_PER_LINE {
            return Err(ValidationError::InvalidQuantity(format!(
                "quantity {} exceeds maximum {}",
                value,
                Self::MAX_PER_LINE
            )));
        }
        Ok(Self(value))
    }

    /// The underlying value.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money amount in the marketplace currency.
///
/// Uses `Decimal` for precise arithmetic. Non-negative, at most 2 decimal
/// places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    /// Maximum representable amount (100 million).
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

    /// The zero amount.
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create money from a whole number of cents.
    pub fn from_cents(cents: u64) -> Result<Self, ValidationError> {
        let decimal = Decimal::new(
            i64::try_from(cents).map_err(|e| ValidationError::InvalidMoney(e.to_string()))?,
            2,
        );
        Self::new(decimal)
    }

    /// Create money from a decimal amount.
    pub fn new(amount: Decimal) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() {
            return Err(ValidationError::InvalidMoney(format!(
                "amount cannot be negative: {amount}"
            )));
        }
        if amount.scale() > 2 {
            return Err(ValidationError::InvalidMoney(format!(
                "amount cannot have more than 2 decimal places: {amount}"
            )));
        }
        if amount > Self::MAX_AMOUNT {
            return Err(ValidationError::InvalidMoney(format!(
                "amount {} exceeds maximum {}",
                amount,
                Self::MAX_AMOUNT
            )));
        }
        Ok(Self(amount))
    }

    /// The underlying decimal value.
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Convert to whole cents.
    pub fn to_cents(self) -> u64 {
        (self.0 * Decimal::from(100)).to_u64().unwrap_or(0)
    }

    /// Add two amounts, failing if the result exceeds the maximum.
    pub fn checked_add(self, other: Self) -> Result<Self, ValidationError> {
        Self::new(self.0 + other.0)
    }

    /// Subtract `other`, failing if it exceeds `self`.
    pub fn subtract(self, other: Self) -> Result<Self, ValidationError> {
        if other.0 > self.0 {
            return Err(ValidationError::InvalidMoney(format!(
                "cannot subtract {other} from {self}"
            )));
        }
        Self::new(self.0 - other.0)
    }

    /// Multiply by a line quantity.
    pub fn times(self, quantity: Quantity) -> Result<Self, ValidationError> {
        Self::new(self.0 * Decimal::from(quantity.value()))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

/// Percentage discount expressed as a fraction.
///
/// Valid range is `[0, 1)`: a rate of 1 or more would zero out or invert the
/// total. At most 4 decimal places so rates survive storage round-trips
/// exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiscountRate(Decimal);

impl DiscountRate {
    /// Create a rate from a decimal fraction.
    pub fn new(rate: Decimal) -> Result<Self, ValidationError> {
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(ValidationError::InvalidRate(format!(
                "discount rate must be in [0, 1): {rate}"
            )));
        }
        if rate.scale() > 4 {
            return Err(ValidationError::InvalidRate(format!(
                "discount rate cannot have more than 4 decimal places: {rate}"
            )));
        }
        Ok(Self(rate))
    }

    /// Create a rate from whole percent, e.g. `from_percent(25)` is 0.25.
    pub fn from_percent(percent: u32) -> Result<Self, ValidationError> {
        Self::new(Decimal::new(i64::from(percent), 2))
    }

    /// The underlying fraction.
    pub const fn fraction(self) -> Decimal {
        self.0
    }

    /// Compute the discount this rate yields on `total`, rounded to the
    /// currency's 2-decimal precision.
    ///
    /// Because the rate is below 1 the result never exceeds `total`.
    pub fn apply_to(self, total: Money) -> Money {
        let discounted = (total.amount() * self.0).round_dp(2);
        Money::new(discounted).expect("rate below 1 keeps the discount within [0, total]")
    }
}

impl Display for DiscountRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in time as recorded by the engine.
///
/// Wraps a UTC `DateTime` so timestamp handling stays consistent across
/// the aggregate, the stores, and the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_id_generation_and_validation() {
        let id = OrderId::generate();
        assert!(id.as_ref().starts_with("ORD-"));
        assert!(id.as_ref().len() <= 50);

        assert!(OrderId::try_new("ORD-ABC123".to_string()).is_ok());
        assert!(OrderId::try_new("ORD-".to_string()).is_err());
        assert!(OrderId::try_new("ord-abc".to_string()).is_err());
    }

    #[test]
    fn item_and_member_ids_follow_their_prefixes() {
        assert!(ItemId::generate().as_ref().starts_with("ITM-"));
        assert!(MemberId::generate().as_ref().starts_with("MBR-"));
        assert!(ItemId::try_new("MBR-X".to_string()).is_err());
        assert!(MemberId::try_new("ITM-X".to_string()).is_err());
    }

    #[test]
    fn coupon_code_validation() {
        assert!(CouponCode::try_new("WELCOME-5000".to_string()).is_ok());
        assert!(CouponCode::try_new("SPRING25".to_string()).is_ok());
        assert!(CouponCode::try_new("".to_string()).is_err());
        assert!(CouponCode::try_new("-LEADING".to_string()).is_err());
        assert!(CouponCode::try_new("lowercase".to_string()).is_err());
        assert!(CouponCode::try_new("A".repeat(41)).is_err());
    }

    #[test]
    fn quantity_bounds() {
        assert!(Quantity::new(1).is_ok());
        assert!(Quantity::new(Quantity::MAX_PER_LINE).is_ok());
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(Quantity::MAX_PER_LINE + 1).is_err());
    }

    #[test]
    fn money_validation() {
        assert!(Money::from_cents(100).is_ok());
        assert!(Money::new(dec!(10.50)).is_ok());
        assert!(Money::new(dec!(-1.00)).is_err());
        assert!(Money::new(dec!(1.001)).is_err());
        assert!(Money::new(Money::MAX_AMOUNT + Decimal::ONE).is_err());
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_cents(100).unwrap();
        let b = Money::from_cents(250).unwrap();

        assert_eq!(a.checked_add(b).unwrap().to_cents(), 350);
        assert_eq!(b.subtract(a).unwrap().to_cents(), 150);
        assert!(a.subtract(b).is_err());

        let qty = Quantity::new(3).unwrap();
        assert_eq!(a.times(qty).unwrap().to_cents(), 300);
    }

    #[test]
    fn discount_rate_bounds() {
        assert!(DiscountRate::new(dec!(0)).is_ok());
        assert!(DiscountRate::new(dec!(0.9999)).is_ok());
        assert!(DiscountRate::new(dec!(1)).is_err());
        assert!(DiscountRate::new(dec!(-0.1)).is_err());
        assert!(DiscountRate::new(dec!(0.00001)).is_err());
    }

    #[test]
    fn discount_rate_application() {
        let rate = DiscountRate::from_percent(25).unwrap();
        let total = Money::from_cents(20_000).unwrap();
        assert_eq!(rate.apply_to(total).to_cents(), 5_000);

        // Sub-cent results round to currency precision.
        let rate = DiscountRate::new(dec!(0.333)).unwrap();
        let total = Money::from_cents(100).unwrap();
        assert_eq!(rate.apply_to(total).to_cents(), 33);
    }

    #[test]
    fn timestamp_now_is_current() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();
        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    proptest! {
        #[test]
        fn prop_money_from_cents_roundtrip(cents in 0u64..1_000_000) {
            let money = Money::from_cents(cents).unwrap();
            prop_assert_eq!(money.to_cents(), cents);
        }

        #[test]
        fn prop_quantity_roundtrip(value in 1u32..=Quantity::MAX_PER_LINE) {
            prop_assert_eq!(Quantity::new(value).unwrap().value(), value);
        }

        #[test]
        fn prop_rate_discount_never_exceeds_total(
            cents in 0u64..1_000_000,
            basis_points in 0u32..10_000
        ) {
            let total = Money::from_cents(cents).unwrap();
            let rate = DiscountRate::new(Decimal::new(i64::from(basis_points), 4)).unwrap();
            let discount = rate.apply_to(total);
            prop_assert!(discount <= total);
        }

        #[test]
        fn prop_money_addition_commutative(a in 0u64..100_000, b in 0u64..100_000) {
            let ma = Money::from_cents(a).unwrap();
            let mb = Money::from_cents(b).unwrap();
            prop_assert_eq!(ma.checked_add(mb).unwrap(), mb.checked_add(ma).unwrap());
        }
    }
}
