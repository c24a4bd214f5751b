//! Small markup helpers used for titles, reading-time estimates and
//! related-article discovery. These deliberately avoid a full HTML parser:
//! feed content is frequently malformed and only text and `href`s are needed.

use html_escape::decode_html_entities;

/// Remove every `<...>` tag, keeping the text between them.
///
/// Tags are replaced by a single space so that `a<br>b` yields two words.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;

    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out
}

/// Normalize a title as it arrives from a feed: trim, unescape entities,
/// strip markup and collapse the whitespace left behind.
pub fn clean_title(raw: &str) -> String {
    let unescaped = decode_html_entities(raw.trim());
    strip_html(&unescaped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect the values of every `href` attribute in `html`, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let mut links = Vec::new();
    let lower = html.to_ascii_lowercase();
    let mut cursor = 0;

    while let Some(pos) = lower[cursor..].find("href") {
        let mut idx = cursor + pos + "href".len();
        let bytes = lower.as_bytes();

        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if idx >= bytes.len() || bytes[idx] != b'=' {
            cursor = idx;
            continue;
        }
        idx += 1;
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if idx >= bytes.len() {
            break;
        }

        let quote = bytes[idx];
        let (start, end) = if quote == b'"' || quote == b'\'' {
            let start = idx + 1;
            match lower[start..].find(quote as char) {
                Some(len) => (start, start + len),
                None => break,
            }
        } else {
            let start = idx;
            let len = lower[start..]
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .unwrap_or(lower.len() - start);
            (start, start + len)
        };

        let value = decode_html_entities(&html[start..end]).trim().to_string();
        if !value.is_empty() {
            links.push(value);
        }
        cursor = end;
    }

    links
}
