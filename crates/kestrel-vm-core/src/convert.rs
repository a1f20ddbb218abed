//! Value conversions
//!
//! `ToString` and `ToNumber` for primitive values. Objects have no
//! `ToPrimitive` hook here: they stringify as `"[object Object]"` and convert
//! to NaN.

use crate::runtime::Runtime;
use crate::value::Value;

/// Format a number the way `Number.prototype.toString()` does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 {
        return itoa::Buffer::new().format(n as i32).to_owned();
    }

    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(n);
    let (negative, digits, point) = decompose(shortest);

    let mut out = String::with_capacity(digits.len() + 8);
    if negative {
        out.push('-');
    }
    let k = digits.len() as i32;
    if k <= point && point <= 21 {
        // Integer, padded with zeros
        out.push_str(&digits);
        out.extend(std::iter::repeat_n('0', (point - k) as usize));
    } else if 0 < point && point <= 21 {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-point) as usize));
        out.push_str(&digits);
    } else {
        let exponent = point - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        out.push_str(itoa::Buffer::new().format(exponent.abs()));
    }
    out
}

/// Split ryu's output into sign, significant digits, and the position of the
/// decimal point relative to the first digit
fn decompose(formatted: &str) -> (bool, String, i32) {
    let (negative, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, formatted),
    };
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let all: String = int_part.chars().chain(frac_part.chars()).collect();
    let leading = all.len() - all.trim_start_matches('0').len();
    let digits = all[leading..].trim_end_matches('0').to_owned();
    let point = int_part.len() as i32 + exponent - leading as i32;
    (negative, digits, point)
}

/// `ToString` of a primitive value
pub fn to_display_string(rt: &Runtime, value: Value) -> String {
    if value.is_undefined() || value.is_empty() {
        "undefined".to_owned()
    } else if value.is_null() {
        "null".to_owned()
    } else if let Some(b) = value.as_boolean() {
        b.to_string()
    } else if let Some(i) = value.as_int32() {
        itoa::Buffer::new().format(i).to_owned()
    } else if let Some(n) = value.as_number() {
        number_to_string(n)
    } else if let Some(s) = value.as_string() {
        rt.get(s).as_str().to_owned()
    } else {
        "[object Object]".to_owned()
    }
}

/// `ToNumber` of a primitive value
pub fn to_number(rt: &Runtime, value: Value) -> f64 {
    if let Some(n) = value.as_number() {
        n
    } else if value.is_null() {
        0.0
    } else if let Some(b) = value.as_boolean() {
        if b { 1.0 } else { 0.0 }
    } else if let Some(s) = value.as_string() {
        string_to_number(rt.get(s).as_str())
    } else {
        f64::NAN
    }
}

/// Whitespace and line terminators that `StringToNumber` ignores at both ends
fn is_js_whitespace(c: char) -> bool {
    // char::is_whitespace covers Zs and the line terminators, plus NEL which
    // JS does not count; it misses the BOM.
    (c.is_whitespace() && c != '\u{85}') || c == '\u{FEFF}'
}

/// Whether `s` is an unsigned decimal literal: digits with an optional
/// fraction and an exponent whose sign may only follow the `e`
fn is_unsigned_decimal(s: &str) -> bool {
    let mut prev = None;
    let mut digits = false;
    for b in s.bytes() {
        match b {
            b'0'..=b'9' => digits = true,
            b'.' | b'e' | b'E' => {}
            b'+' | b'-' if matches!(prev, Some(b'e' | b'E')) => {}
            _ => return false,
        }
        prev = Some(b);
    }
    digits
}

/// `StringToNumber`: decimal, `0x`/`0o`/`0b` integers, and `Infinity`
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return 0.0;
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }

    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    // Rust's float parser also accepts "inf", "nan" and a leading sign; JS
    // allows none of them here.
    if !is_unsigned_decimal(unsigned) {
        return f64::NAN;
    }
    unsigned.parse::<f64>().map_or(f64::NAN, |n| sign * n)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut result = 0.0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => result = result * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    result
}
