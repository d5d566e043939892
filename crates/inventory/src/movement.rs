use core::str::FromStr;
use serde::{Deserialize, Serialize};

use glampstock_core::{DomainError, DomainResult, ProductId};

/// Kind of stock movement recorded in the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub const ALL: [MovementType; 3] = [MovementType::In, MovementType::Out, MovementType::Adjustment];

    /// Multiplier used to fold a quantity into net stock.
    pub fn sign(self) -> i64 {
        match self {
            MovementType::In => 1,
            MovementType::Out => -1,
            MovementType::Adjustment => 1,
        }
    }

    /// Stored/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            "ADJUSTMENT" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected IN, OUT or ADJUSTMENT)"
            ))),
        }
    }
}

/// Positive whole-number magnitude of a movement.
///
/// The sign of a movement is never stored; it comes from [`MovementType::sign`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    /// Largest accepted magnitude (the store keeps quantities in an `INTEGER` column).
    pub const MAX: i64 = i32::MAX as i64;

    /// Normalize a raw, caller-supplied quantity.
    ///
    /// The absolute value is taken first; the result must be finite, whole and
    /// within `1..=Quantity::MAX`.
    pub fn normalize(raw: f64) -> DomainResult<Self> {
        let magnitude = raw.abs();
        if !magnitude.is_finite() {
            return Err(DomainError::invalid_quantity("quantity must be a finite number"));
        }
        if magnitude <= 0.0 {
            return Err(DomainError::invalid_quantity("quantity must be greater than zero"));
        }
        if magnitude.fract() != 0.0 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must be a whole number (got {magnitude})"
            )));
        }
        if magnitude > Self::MAX as f64 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must not exceed {}",
                Self::MAX
            )));
        }
        Ok(Self(magnitude as i64))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Signed contribution of this quantity to net stock.
    pub fn signed(self, movement_type: MovementType) -> i64 {
        movement_type.sign() * self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let magnitude = value.checked_abs().unwrap_or(i64::MAX);
        if magnitude == 0 {
            return Err(DomainError::invalid_quantity("quantity must be greater than zero"));
        }
        if magnitude > Self::MAX {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must not exceed {}",
                Self::MAX
            )));
        }
        Ok(Self(magnitude))
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Decide whether a movement may be applied on top of `current` stock.
///
/// Returns the stock after the movement. Only outgoing movements can be refused:
/// they may never take stock below zero.
pub fn apply_movement(
    product_id: ProductId,
    current: i64,
    movement_type: MovementType,
    quantity: Quantity,
) -> DomainResult<i64> {
    if movement_type == MovementType::Out && current < quantity.get() {
        return Err(DomainError::insufficient_stock(
            product_id,
            current,
            quantity.get(),
        ));
    }
    Ok(current + quantity.signed(movement_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_table() {
        assert_eq!(MovementType::In.sign(), 1);
        assert_eq!(MovementType::Out.sign(), -1);
        assert_eq!(MovementType::Adjustment.sign(), 1);
    }

    #[test]
    fn movement_type_uses_upper_case_wire_names() {
        assert_eq!(serde_json::to_string(&MovementType::Adjustment).unwrap(), "\"ADJUSTMENT\"");
        let parsed: MovementType = serde_json::from_str("\"OUT\"").unwrap();
        assert_eq!(parsed, MovementType::Out);
        assert_eq!("in".parse::<MovementType>().unwrap(), MovementType::In);
        assert!(matches!(
            "transfer".parse::<MovementType>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn normalize_takes_absolute_value() {
        assert_eq!(Quantity::normalize(-20.0).unwrap().get(), 20);
        assert_eq!(Quantity::normalize(7.0).unwrap().get(), 7);
    }

    #[test]
    fn normalize_rejects_zero_non_finite_and_fractional() {
        for raw in [0.0, -0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 2.5] {
            assert!(
                matches!(Quantity::normalize(raw), Err(DomainError::InvalidQuantity(_))),
                "expected InvalidQuantity for {raw}"
            );
        }
    }

    #[test]
    fn normalize_rejects_values_above_column_range() {
        assert!(Quantity::normalize(Quantity::MAX as f64).is_ok());
        assert!(matches!(
            Quantity::normalize(Quantity::MAX as f64 + 1.0),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn deserialization_validates() {
        let q: Quantity = serde_json::from_str("12").unwrap();
        assert_eq!(q.get(), 12);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn out_beyond_stock_is_refused() {
        let product_id = ProductId::new();
        let qty = Quantity::try_from(40).unwrap();
        let err = apply_movement(product_id, 30, MovementType::Out, qty).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(product_id, 30, 40));
    }

    #[test]
    fn out_of_exact_stock_reaches_zero() {
        let qty = Quantity::try_from(30).unwrap();
        assert_eq!(apply_movement(ProductId::new(), 30, MovementType::Out, qty), Ok(0));
    }

    #[test]
    fn in_and_adjustment_always_apply() {
        let qty = Quantity::try_from(5).unwrap();
        let product_id = ProductId::new();
        assert_eq!(apply_movement(product_id, 0, MovementType::In, qty), Ok(5));
        assert_eq!(apply_movement(product_id, 30, MovementType::Adjustment, qty), Ok(35));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn whole_non_zero_values_normalize_to_their_magnitude(v in -(Quantity::MAX)..=Quantity::MAX) {
            prop_assume!(v != 0);
            let q = Quantity::normalize(v as f64).unwrap();
            prop_assert_eq!(q.get(), v.abs());
        }

        #[test]
        fn applied_movements_never_go_negative(
            current in 0i64..10_000,
            qty in 1i64..10_000,
            kind in prop::sample::select(MovementType::ALL.to_vec()),
        ) {
            let q = Quantity::try_from(qty).unwrap();
            if let Ok(after) = apply_movement(ProductId::new(), current, kind, q) {
                prop_assert!(after >= 0);
                prop_assert_eq!(after, current + kind.sign() * qty);
            }
        }
    }
}
