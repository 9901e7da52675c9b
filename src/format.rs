//! Amount formatting helpers
//!
//! Converts USD magnitudes to compact strings ("1.23M") and back, plus the
//! APR to APY conversion used when a source only reports simple rates.

/// Compounding periods per year used when synthesizing APY from APR
pub const DAILY_COMPOUNDING_PERIODS: u32 = 365;

const SUFFIXES: [(f64, &str, usize); 3] = [(1e9, "B", 2), (1e6, "M", 2), (1e3, "K", 1)];

/// Format a magnitude with a K/M/B suffix so the mantissa sits in [1, 1000)
///
/// Mantissas carry 2 decimals (1 in the K range). NaN and infinite values
/// format as "0.00". No currency symbol is added.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return "0.00".to_string();
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();

    for (idx, &(scale, suffix, decimals)) in SUFFIXES.iter().enumerate() {
        if magnitude < scale {
            continue;
        }
        let mantissa = round_to(magnitude / scale, decimals);
        // 999_999 rounds to "1000.0K"; bump it into the next bucket instead
        if mantissa >= 1000.0 && idx > 0 {
            let (next_scale, next_suffix, next_decimals) = SUFFIXES[idx - 1];
            return format!(
                "{}{:.*}{}",
                sign,
                next_decimals,
                magnitude / next_scale,
                next_suffix
            );
        }
        return format!("{}{:.*}{}", sign, decimals, mantissa, suffix);
    }

    if round_to(magnitude, 2) >= 1000.0 {
        return format!("{}{:.1}K", sign, magnitude / 1e3);
    }
    format!("{}{:.2}", sign, magnitude)
}

/// `format_amount` with a leading "$"
pub fn format_usd(value: f64) -> String {
    format!("${}", format_amount(value))
}

/// Parse "$1.23M", "4,500", "12.5k" back into a number
///
/// Empty or unparsable input yields 0.
pub fn parse_formatted_amount(text: &str) -> f64 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let cleaned = cleaned.trim();

    let Some(last) = cleaned.chars().last() else {
        return 0.0;
    };

    let (mantissa, multiplier) = match last.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        _ => (cleaned, 1.0),
    };

    let mantissa = mantissa.trim();
    if mantissa.is_empty() || !mantissa.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return 0.0;
    }

    mantissa
        .parse::<f64>()
        .map(|v| v * multiplier)
        .unwrap_or(0.0)
}

/// Parse a rate such as "12.5%" or "12.5" into a percentage value
pub fn parse_percentage(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Compound a simple APR (in percent) into an APY (in percent)
///
/// `((1 + apr/n)^n - 1)`, with `n` compounding periods per year.
pub fn apr_to_apy(apr_pct: f64, periods: u32) -> f64 {
    if periods == 0 || !apr_pct.is_finite() {
        return 0.0;
    }
    let n = periods as f64;
    let apr = apr_pct / 100.0;
    ((1.0 + apr / n).powf(n) - 1.0) * 100.0
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_suffixes() {
        assert_eq!(format_amount(1_234_567.0), "1.23M");
        assert_eq!(format_amount(2_500_000_000.0), "2.50B");
        assert_eq!(format_amount(1_500_000.0), "1.50M");
        assert_eq!(format_amount(12_345.0), "12.3K");
        assert_eq!(format_amount(999.5), "999.50");
        assert_eq!(format_amount(0.0), "0.00");
    }

    #[test]
    fn test_format_non_finite() {
        assert_eq!(format_amount(f64::NAN), "0.00");
        assert_eq!(format_amount(f64::INFINITY), "0.00");
    }

    #[test]
    fn test_format_promotes_rounded_mantissa() {
        assert_eq!(format_amount(999_999.0), "1.00M");
        assert_eq!(format_amount(999_999.9), "1.00M");
    }

    #[test]
    fn test_format_usd_prefix() {
        assert_eq!(format_usd(2_501_500_000.0), "$2.50B");
    }

    #[test]
    fn test_parse_formatted_amount() {
        assert!((parse_formatted_amount("$1.23M") - 1_230_000.0).abs() < 1e-6);
        assert_eq!(parse_formatted_amount("4,500"), 4500.0);
        assert_eq!(parse_formatted_amount("12.5k"), 12_500.0);
        assert_eq!(parse_formatted_amount("$2.50B"), 2_500_000_000.0);
        assert_eq!(parse_formatted_amount(""), 0.0);
        assert_eq!(parse_formatted_amount("n/a"), 0.0);
        assert_eq!(parse_formatted_amount("$M"), 0.0);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        for x in [1_000.0, 4_321.0, 99_999.0, 1_234_567.0, 87_654_321.0, 3.2e9] {
            let back = parse_formatted_amount(&format_amount(x));
            assert!(
                ((back - x) / x).abs() < 0.01,
                "x={} back={}",
                x,
                back
            );
        }
        for x in [0.0, 0.5, 12.34, 999.99] {
            let back = parse_formatted_amount(&format_amount(x));
            assert!((back - x).abs() < 0.005, "x={} back={}", x, back);
        }
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("12.5%"), Some(12.5));
        assert_eq!(parse_percentage(" 3 "), Some(3.0));
        assert_eq!(parse_percentage("abc"), None);
    }

    #[test]
    fn test_apr_to_apy_daily() {
        let apy = apr_to_apy(10.0, DAILY_COMPOUNDING_PERIODS);
        assert!((apy - 10.5156).abs() < 0.001, "got {}", apy);
        assert_eq!(apr_to_apy(0.0, DAILY_COMPOUNDING_PERIODS), 0.0);
        assert_eq!(apr_to_apy(10.0, 0), 0.0);
    }
}
