//! GVariant text format for the scalar types we exchange with `gsettings`

/// Quote a string as a GVariant string literal
pub fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Parse a GVariant string literal as printed by `gsettings get`
pub fn parse_string(text: &str) -> Option<String> {
    let text = strip_annotation(text.trim(), "@s ");
    let mut chars = text.chars();
    let quote = chars.next().filter(|q| *q == '\'' || *q == '"')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }

    let body = &text[1..text.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            'u' => out.push(parse_hex_escape(&mut chars, 4)?),
            'U' => out.push(parse_hex_escape(&mut chars, 8)?),
            other => out.push(other),
        }
    }
    Some(out)
}

fn parse_hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    char::from_u32(u32::from_str_radix(&hex, 16).ok()?)
}

fn strip_annotation<'a>(text: &'a str, annotation: &str) -> &'a str {
    text.strip_prefix(annotation).unwrap_or(text).trim()
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

pub fn parse_double(text: &str) -> Option<f64> {
    strip_annotation(text.trim(), "@d ").parse().ok().filter(|v: &f64| v.is_finite())
}

pub fn parse_int(text: &str) -> Option<i32> {
    strip_annotation(text.trim(), "int32 ").parse().ok()
}

pub fn format_bool(value: bool) -> String {
    value.to_string()
}

/// Always includes a decimal point so the value parses as a double
pub fn format_double(value: f64) -> String {
    format!("{value:?}")
}

pub fn format_int(value: i32) -> String {
    value.to_string()
}
