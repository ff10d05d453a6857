//! HTML sanitization for the read-only email preview.
//!
//! Stored bodies come straight from the wire, so anything rendered for a
//! reviewer is rebuilt from a parsed DOM: tracking pixels dropped, tags and
//! attributes reduced to a fixed allow-list, URL schemes restricted, and
//! links forced to open in a new tab. Disallowed tags are stripped but their
//! text content is kept.

use scraper::node::Element;
use scraper::{Html, Node};

const ALLOWED_TAGS: &[&str] = &[
    "a", "p", "div", "span", "br", "strong", "em", "ul", "ol", "li", "table", "thead", "tbody",
    "tr", "th", "td", "img",
];

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &["br", "img"];

const ALLOWED_PROTOCOLS: &[&str] = &["http", "https", "mailto"];

/// Render the preview for a stored message: sanitized HTML when present,
/// escaped plain text otherwise.
pub fn render_preview(body_html: Option<&str>, body_plain: Option<&str>) -> String {
    if let Some(html) = body_html.filter(|s| !s.is_empty()) {
        return sanitize_html(html);
    }

    if let Some(plain) = body_plain.filter(|s| !s.is_empty()) {
        return format!("<pre>{}</pre>", escape_text(plain));
    }

    "(No content)".to_string()
}

/// Sanitize untrusted email HTML down to the preview allow-list.
pub fn sanitize_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();

    for child in fragment.root_element().children() {
        write_node(child, &mut out);
    }

    out
}

fn write_node(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(&text)),
        Node::Element(element) => {
            let tag = element.name();

            if !ALLOWED_TAGS.contains(&tag) {
                // Strip the tag, keep whatever readable content it wraps.
                for child in node.children() {
                    write_node(child, out);
                }
                return;
            }

            if tag == "img" && is_tracking_pixel(&element) {
                return;
            }

            out.push('<');
            out.push_str(tag);
            for (name, value) in element.attrs() {
                if !attr_allowed(tag, name) || !url_allowed(name, value) {
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            if tag == "a" {
                out.push_str(" target=\"_blank\" rel=\"noopener noreferrer\"");
            }
            out.push('>');

            if VOID_TAGS.contains(&tag) {
                return;
            }

            for child in node.children() {
                write_node(child, out);
            }

            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        // Comments, doctypes and processing instructions are dropped.
        _ => {}
    }
}

fn attr_allowed(tag: &str, attr: &str) -> bool {
    matches!(
        (tag, attr),
        ("a", "href" | "title") | ("img", "src" | "alt" | "width" | "height") | (_, "style")
    )
}

/// Restrict URL-bearing attributes to http/https/mailto; relative URLs pass.
fn url_allowed(attr: &str, value: &str) -> bool {
    if attr != "href" && attr != "src" {
        return true;
    }

    let value = value.trim();
    match value.split_once(':') {
        Some((scheme, _)) => ALLOWED_PROTOCOLS.contains(&scheme.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// A 1x1 or hidden image is a tracking pixel, not content.
fn is_tracking_pixel(element: &Element) -> bool {
    let one = |attr: &str| element.attr(attr).map(str::trim) == Some("1");
    if one("width") || one("height") {
        return true;
    }

    element
        .attr("style")
        .map(|style| {
            let style = style.to_ascii_lowercase().replace(char::is_whitespace, "");
            style.contains("display:none") || style.contains("visibility:hidden")
        })
        .unwrap_or(false)
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_markup_passes_through() {
        let html = r#"<p>Hello <strong>world</strong></p>"#;
        assert_eq!(sanitize_html(html), "<p>Hello <strong>world</strong></p>");
    }

    #[test]
    fn test_disallowed_tag_stripped_but_text_kept() {
        let html = "<p>Hi</p><script>alert(1)</script><h1>Big</h1>";
        let cleaned = sanitize_html(html);

        assert!(cleaned.contains("<p>Hi</p>"));
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("<h1"));
        assert!(cleaned.contains("Big"));
    }

    #[test]
    fn test_tracking_pixels_removed() {
        let html = r#"<img src="https://t.example.com/px" width="1" height="1"><img src="https://cdn.example.com/logo.png" width="120">"#;
        let cleaned = sanitize_html(html);

        assert!(!cleaned.contains("t.example.com/px"));
        assert!(cleaned.contains("logo.png"));
    }

    #[test]
    fn test_hidden_image_removed() {
        let html = r#"<img src="https://t.example.com/px" style="display: none">"#;
        assert_eq!(sanitize_html(html), "");
    }

    #[test]
    fn test_javascript_href_dropped() {
        let html = r#"<a href="javascript:alert(1)" title="x">click</a>"#;
        let cleaned = sanitize_html(html);

        assert!(!cleaned.contains("javascript"));
        assert!(cleaned.contains("title=\"x\""));
        assert!(cleaned.contains("click"));
    }

    #[test]
    fn test_links_open_in_new_tab() {
        let html = r#"<a href="https://example.com">site</a>"#;
        let cleaned = sanitize_html(html);

        assert!(cleaned.contains(r#"href="https://example.com""#));
        assert!(cleaned.contains(r#"target="_blank" rel="noopener noreferrer""#));
    }

    #[test]
    fn test_disallowed_attributes_dropped() {
        let html = r#"<p onclick="alert(1)" style="color: red">text</p>"#;
        let cleaned = sanitize_html(html);

        assert!(!cleaned.contains("onclick"));
        assert!(cleaned.contains(r#"style="color: red""#));
    }

    #[test]
    fn test_render_preview_prefers_html() {
        let out = render_preview(Some("<p>html</p>"), Some("plain"));
        assert_eq!(out, "<p>html</p>");
    }

    #[test]
    fn test_render_preview_plain_fallback_is_escaped() {
        let out = render_preview(None, Some("1 < 2 & 3 > 2"));
        assert_eq!(out, "<pre>1 &lt; 2 &amp; 3 &gt; 2</pre>");
    }

    #[test]
    fn test_render_preview_no_content() {
        assert_eq!(render_preview(None, None), "(No content)");
        assert_eq!(render_preview(Some(""), Some("")), "(No content)");
    }
}
