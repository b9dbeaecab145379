use std::collections::BTreeMap;

/// Parses the `key=value` files the SDK ships as `source.properties`.
///
/// Supports `#` and `!` comments, `=` or `:` separators and backslash
/// escapes of the separator characters. Line continuations are not used by
/// the SDK and are not supported.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let mut key = String::new();
        let mut chars = line.chars();
        let mut escaped = false;
        for c in chars.by_ref() {
            if escaped {
                key.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '=' || c == ':' {
                break;
            } else {
                key.push(c);
            }
        }
        let value = chars.as_str().trim().replace("\\:", ":").replace("\\=", "=");
        props.insert(key.trim().to_string(), value);
    }
    props
}
