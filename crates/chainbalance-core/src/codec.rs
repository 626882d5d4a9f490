//! Numeric codec: raw on-chain integers to exact decimal strings.
//!
//! Amounts are rendered with integer/string arithmetic only. `f64` cannot
//! represent most 18-decimal balances exactly, so the float renderer is kept
//! solely as [`BalanceRendering::LegacyFloat`].

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Widest integer accepted by [`bytes_to_uint`].
pub const MAX_UINT_BYTES: usize = 32;

/// Largest decimals exponent the reconciler accepts. Token contracts store
/// decimals as `uint8`.
pub const MAX_DECIMALS: u32 = 255;

/// Reject a decimals exponent above [`MAX_DECIMALS`].
pub fn check_decimals(decimals: u32) -> Result<(), CodecError> {
    if decimals > MAX_DECIMALS {
        return Err(CodecError::DecimalsOutOfRange { decimals });
    }
    Ok(())
}

/// Interpret a big-endian byte sequence as an unsigned integer.
///
/// Inputs longer than 32 bytes are rejected even when the extra leading
/// bytes are zero. An empty slice is zero.
pub fn bytes_to_uint(bytes: &[u8]) -> Result<U256, CodecError> {
    if bytes.len() > MAX_UINT_BYTES {
        return Err(CodecError::TooWide { len: bytes.len() });
    }
    U256::try_from_be_slice(bytes).ok_or(CodecError::TooWide { len: bytes.len() })
}

/// Render `amount / 10^decimals` as an exact decimal string.
///
/// Trailing fractional zeros are stripped and the point is dropped when the
/// fraction is empty: `(123456, 4) → "12.3456"`, `(100000000, 8) → "1"`.
pub fn render_decimal(amount: U256, decimals: u32) -> String {
    let digits = amount.to_string();
    if decimals == 0 {
        return digits;
    }

    let scale = decimals as usize;
    let padded = if digits.len() <= scale {
        let mut padded = "0".repeat(scale + 1 - digits.len());
        padded.push_str(&digits);
        padded
    } else {
        digits
    };

    let (integer, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Legacy float rendering: `amount as f64 / 10^decimals`.
///
/// Falls back to the raw integer string when the divisor overflows `f64`.
/// Loses precision for large amounts; not used unless configured.
pub fn render_decimal_lossy(amount: U256, decimals: u32) -> String {
    let raw = amount.to_string();
    let Ok(value) = raw.parse::<f64>() else {
        return raw;
    };
    let divisor = i32::try_from(decimals)
        .map(|exp| 10f64.powi(exp))
        .unwrap_or(f64::INFINITY);
    if !divisor.is_finite() || divisor == 0.0 {
        return raw;
    }
    (value / divisor).to_string()
}

/// Which balance renderer the reconciler uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceRendering {
    /// Exact fixed-point string (canonical).
    #[default]
    Exact,
    /// Float division kept for parity with older consumers.
    LegacyFloat,
}

impl BalanceRendering {
    pub fn render(self, amount: U256, decimals: u32) -> String {
        match self {
            Self::Exact => render_decimal(amount, decimals),
            Self::LegacyFloat => render_decimal_lossy(amount, decimals),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn renders_exact_decimals() {
        assert_eq!(render_decimal(u(123456), 4), "12.3456");
        assert_eq!(render_decimal(u(100_000_000), 8), "1");
        assert_eq!(render_decimal(u(5), 0), "5");
        assert_eq!(render_decimal(u(0), 3), "0");
    }

    #[test]
    fn renders_sub_unit_amounts_with_leading_zero() {
        assert_eq!(render_decimal(u(5), 3), "0.005");
        assert_eq!(render_decimal(u(1), 18), "0.000000000000000001");
        assert_eq!(render_decimal(u(1_500), 3), "1.5");
    }

    #[test]
    fn renders_full_width_amount_exactly() {
        // 2^256 - 1 with 18 decimals; a float would round this.
        let max = U256::MAX;
        let rendered = render_decimal(max, 18);
        assert_eq!(
            rendered,
            "115792089237316195423570985008687907853269984665640564039457.584007913129639935"
        );
    }

    #[test]
    fn huge_decimals_render_without_panicking() {
        let rendered = render_decimal(u(7), 70_000);
        assert_eq!(rendered.len(), 70_002);
        assert!(rendered.starts_with("0.000"));
        assert!(rendered.ends_with("07"));
    }

    #[test]
    fn decimals_bound() {
        assert!(check_decimals(18).is_ok());
        assert!(check_decimals(MAX_DECIMALS).is_ok());
        assert_eq!(
            check_decimals(70_000),
            Err(CodecError::DecimalsOutOfRange { decimals: 70_000 })
        );
    }

    #[test]
    fn bytes_to_uint_big_endian() {
        assert_eq!(bytes_to_uint(&[]).unwrap(), U256::ZERO);
        assert_eq!(bytes_to_uint(&[0x01, 0x00]).unwrap(), u(256));
        assert_eq!(bytes_to_uint(&[0xff; 32]).unwrap(), U256::MAX);
    }

    #[test]
    fn bytes_to_uint_rejects_33_bytes() {
        let err = bytes_to_uint(&[0u8; 33]).unwrap_err();
        assert_eq!(err, CodecError::TooWide { len: 33 });
        assert!(bytes_to_uint(&[1u8; 40]).is_err());
    }

    #[test]
    fn lossy_rendering_matches_float_division() {
        assert_eq!(render_decimal_lossy(u(1_500), 3), "1.5");
        assert_eq!(render_decimal_lossy(u(7), 0), "7");
        // divisor overflows f64: raw integer string
        assert_eq!(render_decimal_lossy(u(42), 400), "42");
    }

    #[test]
    fn rendering_mode_dispatch() {
        assert_eq!(BalanceRendering::Exact.render(u(25), 1), "2.5");
        assert_eq!(BalanceRendering::LegacyFloat.render(u(25), 1), "2.5");
        assert_eq!(BalanceRendering::default(), BalanceRendering::Exact);
    }
}
