use ethers::types::{Address, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest scale a `Decimal` can carry. Token decimals above this cannot be valued.
pub const MAX_DECIMALS: u8 = 28;

// Raw on-chain units -> human units (e.g. wei -> ETH, sun -> TRX)
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    if decimals > MAX_DECIMALS {
        return Err(ConversionError::Overflow);
    }
    let value_str = value.to_string();
    let mut decimal_value = Decimal::from_str(&value_str)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;

    decimal_value
        .set_scale(u32::from(decimals))
        .map_err(|_| ConversionError::Overflow)?;
    Ok(decimal_value)
}

/// Human units as f64, for USD valuation only. Never feed the result back into a transfer.
pub fn units_to_f64(value: U256, decimals: u8) -> Result<f64, ConversionError> {
    u256_to_decimal(value, decimals)?
        .to_f64()
        .ok_or(ConversionError::Overflow)
}

/// Parses a decimal string of raw units (as returned by REST explorers and Tron/Solana RPCs).
pub fn parse_raw_units(s: &str) -> Result<U256, ConversionError> {
    U256::from_dec_str(s.trim()).map_err(|e| ConversionError::InvalidDecimal(e.to_string()))
}

pub fn address_to_string(addr: Address) -> String {
    ethers::utils::to_checksum(&addr, None)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_decimal_scales_by_decimals() {
        let twelve_eth = U256::from(12u64) * U256::exp10(18);
        assert_eq!(u256_to_decimal(twelve_eth, 18).unwrap(), Decimal::from(12));

        let fifty_usdt = U256::from(50_000_000u64);
        assert_eq!(units_to_f64(fifty_usdt, 6).unwrap(), 50.0);
    }

    #[test]
    fn test_u256_to_decimal_rejects_unrepresentable_scales() {
        let one = U256::one();
        assert_eq!(
            u256_to_decimal(one, MAX_DECIMALS).unwrap(),
            Decimal::new(1, u32::from(MAX_DECIMALS))
        );
        assert!(matches!(u256_to_decimal(one, 29), Err(ConversionError::Overflow)));
        assert!(matches!(u256_to_decimal(one, 39), Err(ConversionError::Overflow)));
        assert!(matches!(u256_to_decimal(one, u8::MAX), Err(ConversionError::Overflow)));
        assert!(units_to_f64(U256::from(5u64), 200).is_err());

        // above 96 bits of mantissa
        assert!(u256_to_decimal(U256::MAX, 18).is_err());
    }

    #[test]
    fn test_parse_raw_units() {
        assert_eq!(parse_raw_units(" 1500 ").unwrap(), U256::from(1500u64));
        assert!(parse_raw_units("12.5").is_err());
    }

    #[test]
    fn test_address_round_trip_is_checksummed() {
        let addr = string_to_address("0xdac17f958d2ee523a2206206994597c13d831ec7").unwrap();
        assert_eq!(
            address_to_string(addr),
            "0xdAC17F958D2ee523a2206206994597C13D831ec7"
        );
        assert!(string_to_address("not-an-address").is_err());
    }
}
