//! Rounding and clamping helpers shared by every resolver.
//!
//! All money leaves the engine through [`round_half_up`]; ratios reported to
//! callers go through [`round_rate`].

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds to cents, with exact midpoints going away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(161.596)), dec!(161.60));
/// assert_eq!(round_half_up(dec!(0.005)), dec!(0.01));
/// assert_eq!(round_half_up(dec!(-0.005)), dec!(-0.01));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a ratio to four decimal places, half-up.
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::round_rate;
///
/// assert_eq!(round_rate(dec!(0.123449)), dec!(0.1234));
/// assert_eq!(round_rate(dec!(0.12345)), dec!(0.1235));
/// ```
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the larger of two amounts. Mostly used as `max(x, Decimal::ZERO)`
/// to floor a result at zero.
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}
