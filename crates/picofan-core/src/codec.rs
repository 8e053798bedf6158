//! Form decoding and HTML helpers shared by every page the device serves.
//!
//! Browsers submit forms as `application/x-www-form-urlencoded`: fields are
//! joined with `&`, keys and values with `=`, and both are percent-escaped
//! with `+` standing in for a space.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is when encoding form values.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Decode a percent-escaped form component.
///
/// `+` decodes to a space and `%XX` escapes may form multi-byte UTF-8
/// sequences. Malformed escapes are kept verbatim and invalid UTF-8 is
/// replaced with U+FFFD.
pub fn percent_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Percent-escape a form component so that [`percent_decode`] restores it.
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, FORM_VALUE).to_string()
}

/// Split a url-encoded body into decoded `(key, value)` pairs.
///
/// Pairs keep their submission order. A segment without `=` yields an empty
/// value and empty segments are skipped.
pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.trim_end_matches(|c: char| c == '\r' || c == '\n')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

/// Escape text for use inside HTML element content or quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Start of every page: doctype, viewport and the shared stylesheet.
pub fn html_head() -> &'static str {
    concat!(
        "<!DOCTYPE html>\n",
        "<html>\n",
        "    <head>\n",
        "        <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
        "        <link rel=\"stylesheet\" href=\"custom.css\">\n",
        "    </head>\n",
    )
}

/// Build a small page with a heading and a body fragment.
///
/// `body` is inserted verbatim and must already be escaped.
pub fn simple_page(heading: &str, body: &str) -> String {
    format!(
        "{}    <body>\n        <h1>{}</h1>\n        {}\n    </body>\n</html>\n",
        html_head(),
        escape_html(heading),
        body
    )
}
