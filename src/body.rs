use regex::Regex;
use std::sync::LazyLock;

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\s+").unwrap());

const HTML_RENDER_WIDTH: usize = 200;

/// Text of a body part, or an empty string if it is not UTF-8.
///
/// The client has already base64url-decoded `MessagePartBody.data`.
pub fn decode_text(data: &[u8]) -> String {
    String::from_utf8(data.to_vec()).unwrap_or_default()
}

/// Normalises a plain-text body for export.
pub fn clean_text(text: &str) -> String {
    let unescaped = html_escape::decode_html_entities(text);
    let normalized = unescaped.replace("\r\n", "\n").replace('\r', "\n");
    let mut result = String::with_capacity(normalized.len());

    let mut consecutive_empty_lines = 0;
    let mut first_content = true;

    for line in normalized.split('\n') {
        let trimmed = line.trim_end();

        if trimmed.is_empty() {
            consecutive_empty_lines += 1;
            continue;
        }

        if !first_content {
            // One newline between adjacent lines, at most one blank line otherwise.
            let newlines_to_add = std::cmp::min(consecutive_empty_lines + 1, 2);
            for _ in 0..newlines_to_add {
                result.push('\n');
            }
        }

        result.push_str(trimmed);
        consecutive_empty_lines = 0;
        first_content = false;
    }

    let collapsed = MULTI_SPACE.replace_all(result.trim(), " ");
    LEADING_NUMBER.replace(&collapsed, "").into_owned()
}

/// Renders an HTML body as readable text for messages without a plain part.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH).unwrap_or_default()
}
