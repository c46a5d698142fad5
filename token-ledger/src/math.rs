//! Checked arithmetic over [`Amount`]
//!
//! These are the only overflow/underflow guards in the ledger. Every function
//! fails instead of wrapping or truncating silently.

use crate::{types::Amount, Error, Result};

/// `a + b`, failing on overflow
pub fn add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(Error::ArithmeticOverflow)
}

/// `a - b`, failing when `b > a`
pub fn sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(Error::ArithmeticUnderflow)
}

/// `a * b`, failing on overflow
pub fn mul(a: Amount, b: Amount) -> Result<Amount> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    a.checked_mul(b).ok_or(Error::ArithmeticOverflow)
}

/// Truncating `a / b`, failing on a zero divisor
pub fn div(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_div(b).ok_or(Error::DivisionByZero)
}

/// Smallest multiple of `m` that is `>= a`
///
/// Computed as `((a + m - 1) / m) * m` through the checked primitives, so an
/// `a` near the top of the range overflows and `m == 0` fails as a division by
/// zero (after `a + 0 - 1` underflows when `a == 0`).
pub fn ceil(a: Amount, m: Amount) -> Result<Amount> {
    let c = sub(add(a, m)?, 1)?;
    mul(div(c, m)?, m)
}
