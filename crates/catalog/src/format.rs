use crate::metric::{MetricKind, ValueFormat};

/// Sentinel rendered for absent or non-finite values.
pub const MISSING_VALUE: &str = "N/A";

/// Renders a metric value for display. Never fails; `None` and non-finite
/// values render as [`MISSING_VALUE`].
pub fn format_metric_value(value: Option<f64>, metric: MetricKind) -> String {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return MISSING_VALUE.to_string();
    };

    match metric.spec().format {
        ValueFormat::Currency => format_currency(v),
        ValueFormat::CurrencyPerSqft => format!("{}/sqft", format_currency(v)),
        ValueFormat::Percent => format!("{}%", format_decimal(v, 2, false)),
        ValueFormat::Days => format!("{} days", format_decimal(v, 1, true)),
        ValueFormat::Months => format!("{} months", format_decimal(v, 1, true)),
        ValueFormat::Number => format_decimal(v, 3, true),
    }
}

fn format_currency(v: f64) -> String {
    let digits = format_decimal(v.abs(), 2, true);
    if is_negative(v, 2) {
        format!("-${digits}")
    } else {
        format!("${digits}")
    }
}

/// Rounds to at most `max_fraction_digits`, trims trailing zeros, and
/// optionally groups the integer part in thousands (`1234567.5` → `1,234,567.5`).
pub fn format_decimal(v: f64, max_fraction_digits: usize, group: bool) -> String {
    let fixed = format!("{:.*}", max_fraction_digits, v.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f.trim_end_matches('0')),
        None => (fixed.as_str(), ""),
    };

    let mut out = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    if is_negative(v, max_fraction_digits) {
        out.push('-');
    }
    if group {
        push_grouped(&mut out, int_part);
    } else {
        out.push_str(int_part);
    }
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

// "-0" is never rendered.
fn is_negative(v: f64, max_fraction_digits: usize) -> bool {
    v < 0.0 && format!("{:.*}", max_fraction_digits, -v).bytes().any(|b| (b'1'..=b'9').contains(&b))
}

fn push_grouped(out: &mut String, int_digits: &str) {
    let len = int_digits.len();
    for (i, ch) in int_digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
}
