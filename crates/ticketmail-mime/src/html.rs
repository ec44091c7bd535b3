//! HTML to plain text for messages without a text/plain part.

/// Converts an HTML body to readable text.
///
/// Uses `htmd` and falls back to dropping tags if the converter fails.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    htmd::convert(html).map_or_else(|_| strip_tags(html), |text| text.trim().to_string())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}
