//! String encodings exposed through `get_as_html` / `get_as_url`.

/// Escapes the characters that are unsafe inside HTML text and attribute
/// values: ampersand, angle brackets, both quotes, slash and backtick.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            '`' => escaped.push_str("&#x60;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Percent-encodes everything outside the URL unreserved set.
pub fn encode_url(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="/x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;&#x2F;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;&#x2F;a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_encode_url() {
        assert_eq!(encode_url("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_url("safe-_.~"), "safe-_.~");
    }
}
