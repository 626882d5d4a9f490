//! Column encodings and identifiers shared by the backends.

use chainbalance_core::{StoreError, U256};

#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
/// Decimal digits in `U256::MAX`.
pub(crate) const MAX_DIGITS: usize = 78;

#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
/// Zero-padded decimal text; lexicographic order equals numeric order.
pub(crate) fn to_sortable(n: U256) -> String {
    format!("{:0>width$}", n.to_string(), width = MAX_DIGITS)
}

/// Parse a stored decimal block number (padded or not).
pub(crate) fn parse_stored(address: &str, text: &str) -> Result<U256, StoreError> {
    U256::from_str_radix(text.trim(), 10).map_err(|e| StoreError::Corrupt {
        address: address.to_string(),
        reason: format!("block_number '{text}': {e}"),
    })
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is allowed.
#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
pub(crate) fn check_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("invalid table name '{table}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sortable_text_orders_numerically() {
        let small = to_sortable(U256::from(9u64));
        let large = to_sortable(U256::from(10u64));
        assert_eq!(small.len(), MAX_DIGITS);
        assert!(small < large);
        assert_eq!(to_sortable(U256::MAX).len(), MAX_DIGITS);
    }

    #[test]
    fn parse_accepts_padding() {
        let text = to_sortable(U256::from(1234u64));
        assert_eq!(parse_stored("0x1", &text).unwrap(), U256::from(1234u64));
        assert!(parse_stored("0x1", "12ab").is_err());
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(check_table_name("latest_balances").is_ok());
        assert!(check_table_name("balances; DROP TABLE x").is_err());
        assert!(check_table_name("1table").is_err());
        assert!(check_table_name("").is_err());
    }
}
