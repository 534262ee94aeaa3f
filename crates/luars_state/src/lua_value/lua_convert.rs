// String <-> number conversion helpers used by the value accessors.
// Only the subset needed for stack conversions: decimal/float literals
// and hexadecimal integers, surrounding whitespace allowed.

/// Render a number the way values stringify: integral values without a
/// fractional part, everything else as a float.
pub fn number_to_string(n: f64) -> String {
    if let Some(i) = super::lua_value::float_to_integer(n) {
        let mut buf = itoa::Buffer::new();
        return buf.format(i).to_owned();
    }
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    format!("{}", n)
}

/// Parse a numeric string, returning None when it is not a number literal
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.starts_with(['+', '-']) {
        return None;
    }

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let value = u64::from_str_radix(hex, 16).ok()? as i64 as f64;
        return Some(if negative { -value } else { value });
    }

    // Rust accepts "inf", "nan" and "infinity"; number literals do not
    if digits
        .bytes()
        .any(|b| !(b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')))
    {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parse a numeric string and truncate it toward zero
pub fn parse_integer(s: &str) -> Option<i64> {
    parse_number(s).map(|n| n.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(10.0), "10");
        assert_eq!(number_to_string(-3.0), "-3");
        assert_eq!(number_to_string(99.9), "99.9");
        assert_eq!(number_to_string(f64::INFINITY), "inf");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("99.9"), Some(99.9));
        assert_eq!(parse_number("  42  "), Some(42.0));
        assert_eq!(parse_number("-0x10"), Some(-16.0));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_integer("99.9"), Some(99));
        assert_eq!(parse_integer("-7.5"), Some(-7));
    }
}
