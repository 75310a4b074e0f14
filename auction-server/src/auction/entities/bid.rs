use {
    super::auction::AuctionId,
    crate::kernel::entities::UserId,
    sqlx::types::BigDecimal,
    std::str::FromStr,
    time::OffsetDateTime,
};

pub type BidId = i64;

/// Number of fractional digits a price may carry.
pub const PRICE_SCALE: i64 = 2;
/// Prices must stay strictly below this value to fit the stored precision.
pub const PRICE_UPPER_BOUND: i64 = 100_000_000;
/// Number of integer digits below the upper bound.
const PRICE_INTEGER_DIGITS: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub id:            BidId,
    pub auction_id:    AuctionId,
    pub bidder_id:     UserId,
    pub price:         BigDecimal,
    pub creation_time: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BidCreate {
    pub auction_id:    AuctionId,
    pub bidder_id:     UserId,
    pub price:         BigDecimal,
    pub creation_time: OffsetDateTime,
}

/// Only `digits[.digits]` is accepted. Exponent notation is refused before parsing, as
/// rescaling a value like `1e-20000000` allocates a number with millions of digits.
fn is_plain_decimal(raw: &str) -> bool {
    let (integer, fraction) = match raw.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (raw, None),
    };
    let is_digits = |part: &str, max_len: usize| {
        !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
    };
    is_digits(integer, PRICE_INTEGER_DIGITS)
        && fraction.map_or(true, |fraction| is_digits(fraction, PRICE_SCALE as usize))
}

/// Parses a client supplied price. Returns None unless the value is a positive decimal
/// below the upper bound with at most two fractional digits.
pub fn parse_price(raw: &str) -> Option<BigDecimal> {
    let raw = raw.trim();
    if !is_plain_decimal(raw) {
        return None;
    }
    let price = BigDecimal::from_str(raw).ok()?;
    if price <= BigDecimal::from(0_i64) || price >= BigDecimal::from(PRICE_UPPER_BOUND) {
        return None;
    }
    if price.with_scale(PRICE_SCALE) != price {
        return None;
    }
    Some(price.with_scale(PRICE_SCALE))
}

/// Renders a price with exactly two fractional digits.
pub fn format_price(price: &BigDecimal) -> String {
    price.with_scale(PRICE_SCALE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_accepts_valid_prices() {
        assert_eq!(parse_price("150"), Some(BigDecimal::from(150_i64).with_scale(2)));
        assert_eq!(
            parse_price("150.5").map(|price| format_price(&price)),
            Some("150.50".to_string())
        );
        assert_eq!(
            parse_price(" 0.01 ").map(|price| format_price(&price)),
            Some("0.01".to_string())
        );
        assert_eq!(
            parse_price("99999999.99").map(|price| format_price(&price)),
            Some("99999999.99".to_string())
        );
    }

    #[test]
    fn test_parse_price_rejects_invalid_prices() {
        for raw in [
            "",
            "abc",
            "0",
            "0.00",
            "-5",
            "10.001",
            "100000000",
            "1e9",
            "NaN",
            "1e-20000000",
            "1E5",
            "5e0",
            "+5",
            "1.",
            ".5",
            "1.5.0",
            "000000001",
            "1_000",
        ] {
            assert_eq!(parse_price(raw), None, "{raw} should be rejected");
        }
    }

    #[test]
    fn test_huge_exponent_is_rejected_quickly() {
        let started = std::time::Instant::now();
        assert_eq!(parse_price("1e-100000000"), None);
        assert_eq!(parse_price("1e100000000"), None);
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(&BigDecimal::from(100_i64)), "100.00");
        assert_eq!(
            format_price(&BigDecimal::from_str("7.5").unwrap()),
            "7.50"
        );
    }
}
