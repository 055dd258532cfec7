//! HTML sanitization for rendered responses.
//!
//! Removes `<script>` elements, inline event-handler attributes (`onclick=`,
//! `onerror=`, …) and `javascript:` URIs. Everything else is kept as is.
//!
//! Opening tags are split into attributes the way a browser reads them:
//! quoted values may contain `>`, an unquoted value runs to whitespace or
//! `>`, and attributes may follow a quoted value or `/` with no space.
//! Attribute rewriting only happens inside tags, so text content that
//! happens to contain `on…=` is untouched.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?script\b[^>]*>").expect("valid regex"));

/// Opening tag: name, attribute run, trailing `/` or whitespace.
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<([A-Za-z][A-Za-z0-9-]*)((?:[\s/]*[^\s/>=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*))?)*)([\s/]*)>"#,
    )
    .expect("valid regex")
});

/// One attribute inside a tag's attribute run.
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\s/]*)([^\s/>=]+)(?:(\s*=\s*)("[^"]*"|'[^']*'|[^\s>]*))?"#)
        .expect("valid regex")
});

/// Numeric character references and the named ones used to hide a scheme.
static CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&#x([0-9a-f]+);?|&#([0-9]+);?|&(colon|tab|newline);").expect("valid regex")
});

const URI_ATTRS: &[&str] = &["href", "src", "action", "formaction", "xlink:href", "data"];

pub fn sanitize_html(html: &str) -> String {
    let without_blocks = SCRIPT_BLOCK.replace_all(html, "");
    let without_scripts = SCRIPT_TAG.replace_all(&without_blocks, "");
    TAG.replace_all(&without_scripts, |caps: &Captures| clean_tag(caps))
        .into_owned()
}

fn clean_tag(tag: &Captures) -> String {
    let name = &tag[1];
    if name.eq_ignore_ascii_case("script") {
        return String::new();
    }
    let attrs = ATTR.replace_all(&tag[2], |attr: &Captures| clean_attr(attr));
    format!("<{}{}{}>", name, attrs, &tag[3])
}

fn clean_attr(attr: &Captures) -> String {
    let key = attr[2].to_ascii_lowercase();
    if key.len() > 2 && key.starts_with("on") {
        return String::new();
    }
    match (attr.get(3), attr.get(4)) {
        (Some(eq), Some(value))
            if URI_ATTRS.contains(&key.as_str()) && is_script_uri(value.as_str()) =>
        {
            format!("{}{}{}\"#\"", &attr[1], &attr[2], eq.as_str())
        }
        _ => attr[0].to_string(),
    }
}

/// True for `javascript:`/`vbscript:` values, ignoring quotes, case,
/// embedded whitespace and character references.
fn is_script_uri(value: &str) -> bool {
    let unquoted = value.trim_matches(|c| c == '"' || c == '\'');
    let decoded = CHAR_REF.replace_all(unquoted, |c: &Captures| {
        let code = if let Some(hex) = c.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok()
        } else if let Some(dec) = c.get(2) {
            dec.as_str().parse().ok()
        } else {
            match c[3].to_ascii_lowercase().as_str() {
                "colon" => Some(':' as u32),
                _ => Some(' ' as u32),
            }
        };
        code.and_then(char::from_u32).map(String::from).unwrap_or_default()
    });
    let scheme: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(11)
        .collect::<String>()
        .to_ascii_lowercase();
    scheme.starts_with("javascript:") || scheme.starts_with("vbscript:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_blocks() {
        assert_eq!(
            sanitize_html("<p>a</p><script>alert('x')</script><p>b</p>"),
            "<p>a</p><p>b</p>"
        );
        assert_eq!(
            sanitize_html("<SCRIPT type=\"text/javascript\">\nevil()\n</SCRIPT >ok"),
            "ok"
        );
    }

    #[test]
    fn strips_stray_script_tags() {
        assert_eq!(sanitize_html("<script src=\"x.js\">hi"), "hi");
    }

    #[test]
    fn strips_event_handlers() {
        assert_eq!(
            sanitize_html("<img src=\"a.png\" onerror=\"alert(1)\" alt=\"a\">"),
            "<img src=\"a.png\" alt=\"a\">"
        );
        assert_eq!(
            sanitize_html("<div OnClick='x()' class=\"c\">t</div>"),
            "<div class=\"c\">t</div>"
        );
        assert_eq!(sanitize_html("<a onmouseover=go href=\"/\">l</a>"), "<a href=\"/\">l</a>");
    }

    #[test]
    fn quoted_gt_does_not_end_the_tag() {
        assert_eq!(
            sanitize_html("<img src=\"x\" alt=\"a>b\" onerror=\"alert(1)\">"),
            "<img src=\"x\" alt=\"a>b\">"
        );
        assert_eq!(
            sanitize_html("<img src=x alt='a>b' onerror=alert(1)>"),
            "<img src=x alt='a>b'>"
        );
    }

    #[test]
    fn handlers_without_leading_space_are_stripped() {
        assert_eq!(
            sanitize_html("<img src=\"x\"onerror=\"alert(1)\">"),
            "<img src=\"x\">"
        );
        assert_eq!(sanitize_html("<svg/onload=alert(1)>"), "<svg>");
        // A stray quote inside an unquoted value does not hide what follows.
        assert_eq!(
            sanitize_html("<img alt=a\"b onerror=alert(1)>"),
            "<img alt=a\"b>"
        );
    }

    #[test]
    fn neutralizes_javascript_uris() {
        assert_eq!(
            sanitize_html("<a href=\"javascript:alert(1)\">x</a>"),
            "<a href=\"#\">x</a>"
        );
        assert_eq!(
            sanitize_html("<a HREF = ' JavaScript:void(0)'>x</a>"),
            "<a HREF = \"#\">x</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"java\tscript:alert(1)\">x</a>"),
            "<a href=\"#\">x</a>"
        );
        assert_eq!(
            sanitize_html("<a href=\"&#106;avascript&colon;alert(1)\">x</a>"),
            "<a href=\"#\">x</a>"
        );
    }

    #[test]
    fn preserves_other_markup_and_text() {
        let html = "<h1 class=\"t\">Title</h1><p>set once=1 and onload = later</p>\
                    <a href=\"https://example.com\">link</a><br /><input checked>";
        assert_eq!(sanitize_html(html), html);
    }
}
