//! Decimal rounding shared by every amount the engine computes.

use rust_decimal::{Decimal, RoundingStrategy};

/// Scale of period fractions.
pub const PRORATION_SCALE: u32 = 9;

const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Minor-unit digits for an ISO 4217 code.
pub fn currency_scale(currency: &str) -> u32 {
    match currency {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "UYI" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Round a money amount to the currency's minor unit.
pub fn round_amount(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(currency_scale(currency), ROUNDING)
}

/// Round a period fraction.
pub fn round_fraction(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRORATION_SCALE, ROUNDING)
}
