use serde_json::Number;

/// Renders a number with `,` thousands separators.
///
/// Integers render without a fractional part (`1234` -> `"1,234"`); other
/// values keep two decimals (`12345.678` -> `"12,345.68"`).
pub fn display_value(value: &Number) -> String {
    if let Some(n) = value.as_i64() {
        return group_integer(n.unsigned_abs(), n < 0);
    }
    if let Some(n) = value.as_u64() {
        return group_integer(n, false);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            group_integer(f.abs() as u64, f < 0.0)
        }
        Some(f) if f.is_finite() => {
            let fixed = format!("{:.2}", f.abs());
            let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
            let grouped = group_digits(int_part);
            let sign = if f < 0.0 { "-" } else { "" };
            format!("{}{}.{}", sign, grouped, frac_part)
        }
        _ => value.to_string(),
    }
}

fn group_integer(n: u64, negative: bool) -> String {
    let grouped = group_digits(&n.to_string());
    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
