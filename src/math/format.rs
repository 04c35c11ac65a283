// src/math/format.rs

use super::flow_math::{U256, flow_rate_per_month};

const COMPACT_SUFFIXES: [(f64, &str); 5] = [
    (1.0, ""),
    (1e3, "K"),
    (1e6, "M"),
    (1e9, "B"),
    (1e12, "T"),
];

/// Raccourcit une adresse pour l'affichage : `0x1234…abcd`.
/// Les chaînes trop courtes sont renvoyées telles quelles.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Format compact lisible : `1.23K`, `4.5M`, `12B`...
pub fn format_compact(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let abs = value.abs();
    if abs < 1.0 {
        return trim_decimals(value, 4);
    }
    let mut tier = COMPACT_SUFFIXES.iter().rposition(|(threshold, _)| abs >= *threshold).unwrap_or(0);
    // On arrondit avant de choisir le suffixe : 999.999 s'affiche 1K, pas 1000.
    while tier + 1 < COMPACT_SUFFIXES.len() && round_to(abs / COMPACT_SUFFIXES[tier].0, 2) >= 1000.0 {
        tier += 1;
    }
    let (threshold, suffix) = COMPACT_SUFFIXES[tier];
    format!("{}{}", trim_decimals(value / threshold, 2), suffix)
}

/// Convertit un montant brut (en plus petite unité) en valeur décimale pour l'affichage.
/// La précision est celle d'un f64 : réservé à l'UI, jamais aux calculs.
pub fn to_display_amount(raw: U256, decimals: u8) -> f64 {
    let as_float: f64 = raw.to_string().parse().unwrap_or(0.0);
    as_float / 10f64.powi(decimals as i32)
}

/// Montant de token formaté en notation compacte.
pub fn format_token_amount(raw: U256, decimals: u8) -> String {
    format_compact(to_display_amount(raw, decimals))
}

/// Flow rate (par seconde) affiché en flux mensuel : `"12.5K/mo"`.
pub fn format_flow_rate(flow_rate: U256, decimals: u8) -> String {
    format!("{}/mo", format_token_amount(flow_rate_per_month(flow_rate), decimals))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn trim_decimals(value: f64, max_decimals: usize) -> String {
    let formatted = format!("{:.*}", max_decimals, value);
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234…5678"
        );
        assert_eq!(shorten_address("0xabc"), "0xabc");
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(0.0), "0");
        assert_eq!(format_compact(12.0), "12");
        assert_eq!(format_compact(1_234.0), "1.23K");
        assert_eq!(format_compact(4_500_000.0), "4.5M");
        assert_eq!(format_compact(2_000_000_000.0), "2B");
        assert_eq!(format_compact(0.00123), "0.0012");
        assert_eq!(format_compact(f64::NAN), "0");
    }

    #[test]
    fn test_format_compact_rounds_across_suffix_boundaries() {
        assert_eq!(format_compact(999.999), "1K");
        assert_eq!(format_compact(999_999.0), "1M");
        assert_eq!(format_compact(999_999_999.0), "1B");
        assert_eq!(format_compact(-999_999.0), "-1M");
        assert_eq!(format_compact(999.99), "999.99");
        assert_eq!(format_compact(999_994.0), "999.99K");
    }

    #[test]
    fn test_format_token_amount_uses_decimals() {
        let one_and_a_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_token_amount(one_and_a_half, 18), "1.5");
        assert_eq!(format_token_amount(U256::from(2_500u64), 0), "2.5K");
    }

    #[test]
    fn test_format_flow_rate_is_monthly() {
        // 1 token/s avec 0 décimales => 2 592 000 par mois.
        assert_eq!(format_flow_rate(U256::from(1u64), 0), "2.59M/mo");
        assert_eq!(format_flow_rate(U256::zero(), 18), "0/mo");
    }
}
