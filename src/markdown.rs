//! Markdown → sanitized HTML for assistant responses.
//!
//! Two passes exist:
//!
//! - [`render_incremental`] runs after every streamed fragment: plain
//!   `pulldown-cmark` output plus sanitization.
//! - [`render`] runs once on the final text: fence repair, decorated code
//!   blocks (language label and copy button), classed headings, lists and
//!   block quotes, then sanitization.
//!
//! LLM output frequently mangles code fences, so [`repair_fences`] fixes the
//! common patterns before parsing.

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::sanitize::sanitize_html;

/// How response text is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Escaped text, no markdown interpretation.
    Raw,
    Markdown,
}

impl RenderMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" | "text" => Some(RenderMode::Raw),
            "markdown" | "md" => Some(RenderMode::Markdown),
            _ => None,
        }
    }
}

/// Languages recognized when splitting code glued onto an opening fence.
const KNOWN_LANGUAGES: &[&str] = &[
    "bash", "c", "c++", "cpp", "csharp", "css", "go", "html", "java", "javascript", "js", "json",
    "kotlin", "markdown", "php", "python", "py", "ruby", "rust", "scala", "sh", "shell", "sql",
    "swift", "toml", "ts", "tsx", "typescript", "xml", "yaml", "yml",
];

/// Characters that mark the remainder of a fence line as code rather than
/// part of an info string such as `c++` or `html+jinja`.
const CODE_CHARS: &str = "(){}[];=<>'\"$:,/";

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Full render used once a response is complete.
pub fn render(text: &str, mode: RenderMode) -> String {
    match mode {
        RenderMode::Raw => render_raw(text),
        RenderMode::Markdown => {
            let repaired = repair_fences(text);
            let events = decorate(Parser::new_ext(&repaired, options()));
            let mut html = String::with_capacity(repaired.len() * 3 / 2);
            pulldown_cmark::html::push_html(&mut html, events.into_iter());
            sanitize_html(&html)
        }
    }
}

/// Cheap render used for every streamed fragment.
pub fn render_incremental(text: &str, mode: RenderMode) -> String {
    match mode {
        RenderMode::Raw => render_raw(text),
        RenderMode::Markdown => {
            let mut html = String::with_capacity(text.len() * 3 / 2);
            pulldown_cmark::html::push_html(&mut html, Parser::new_ext(text, options()));
            sanitize_html(&html)
        }
    }
}

fn render_raw(text: &str) -> String {
    format!("<div class=\"raw-text\">{}</div>", escape_html(text))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace code blocks, headings, lists and quotes with classed markup.
fn decorate<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut code: Option<(String, String)> = None;
    let mut block_index = 0usize;

    for event in parser {
        if let Some((_, buf)) = code.as_mut() {
            match event {
                Event::Text(t) => {
                    buf.push_str(&t);
                    continue;
                }
                Event::End(TagEnd::CodeBlock) => {
                    let (lang, body) = code.take().unwrap_or_default();
                    block_index += 1;
                    out.push(Event::Html(CowStr::from(code_block_html(
                        &lang,
                        &body,
                        block_index,
                    ))));
                    continue;
                }
                _ => continue,
            }
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::Start(Tag::Heading { level, .. }) => {
                let n = level as usize;
                out.push(Event::Html(CowStr::from(format!(
                    "<h{n} class=\"md-heading md-h{n}\">"
                ))));
            }
            Event::End(TagEnd::Heading(level)) => {
                out.push(Event::Html(CowStr::from(format!("</h{}>\n", level as usize))));
            }
            Event::Start(Tag::List(Some(start))) => {
                let attr = if start == 1 {
                    String::new()
                } else {
                    format!(" start=\"{}\"", start)
                };
                out.push(Event::Html(CowStr::from(format!(
                    "<ol class=\"md-list\"{}>\n",
                    attr
                ))));
            }
            Event::Start(Tag::List(None)) => {
                out.push(Event::Html(CowStr::from("<ul class=\"md-list\">\n")));
            }
            Event::End(TagEnd::List(ordered)) => {
                let tag = if ordered { "</ol>\n" } else { "</ul>\n" };
                out.push(Event::Html(CowStr::from(tag)));
            }
            Event::Start(Tag::BlockQuote { .. }) => {
                out.push(Event::Html(CowStr::from(
                    "<blockquote class=\"md-quote\">\n",
                )));
            }
            Event::End(TagEnd::BlockQuote { .. }) => {
                out.push(Event::Html(CowStr::from("</blockquote>\n")));
            }
            other => out.push(other),
        }
    }

    // An unterminated block can only occur if the parser stops mid-block.
    if let Some((lang, body)) = code {
        block_index += 1;
        out.push(Event::Html(CowStr::from(code_block_html(
            &lang,
            &body,
            block_index,
        ))));
    }
    out
}

fn code_block_html(lang: &str, body: &str, index: usize) -> String {
    let lang = if lang.is_empty() { "text" } else { lang };
    let lang = escape_html(lang);
    let id = format!("code-block-{}", index);
    format!(
        "<div class=\"code-block\"><div class=\"code-header\"><span class=\"code-lang\">{lang}</span>\
         <button class=\"copy-button\" data-copy-target=\"{id}\">Copy</button></div>\
         <pre><code id=\"{id}\" class=\"language-{lang}\">{}</code></pre></div>\n",
        escape_html(body)
    )
}

/// Fix malformed code fences commonly produced by language models.
///
/// - a fence glued to preceding text is moved to its own line
/// - a duplicated language tag (`pythonpython`, `python python`) is collapsed
/// - code glued to the opening fence after a known language is moved to the
///   next line
/// - an unterminated final fence is closed
pub fn repair_fences(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut open = false;

    for raw_line in unglue_fences(text).split('\n') {
        let trimmed = raw_line.trim_start();
        if !trimmed.starts_with("```") {
            lines.push(raw_line.to_string());
            continue;
        }

        let indent = &raw_line[..raw_line.len() - trimmed.len()];
        let ticks = trimmed.chars().take_while(|&c| c == '`').count();
        let info = &trimmed[ticks..];
        let fence = &trimmed[..ticks];

        if open {
            // Closing fence; anything after it is ordinary text.
            open = false;
            lines.push(format!("{indent}{fence}"));
            let rest = info.trim();
            if !rest.is_empty() {
                lines.push(rest.to_string());
            }
            continue;
        }

        open = true;
        let info = collapse_duplicate_tag(info.trim());
        match split_glued_code(&info) {
            Some((lang, code)) => {
                lines.push(format!("{indent}{fence}{lang}"));
                lines.push(format!("{indent}{code}"));
            }
            None => lines.push(format!("{indent}{fence}{info}")),
        }
    }

    let mut out = lines.join("\n");
    if open {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```");
    }
    out
}

/// Put a fence that directly follows text on its own line.
fn unglue_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("```") {
            if let Some(p) = prev {
                if p != '\n' && p != '`' && !p.is_whitespace() {
                    out.push('\n');
                }
            }
            let ticks = rest.chars().take_while(|&c| c == '`').count();
            out.push_str(&rest[..ticks]);
            rest = &rest[ticks..];
            prev = Some('`');
            continue;
        }
        out.push(c);
        prev = Some(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn collapse_duplicate_tag(info: &str) -> String {
    let words: Vec<&str> = info.split_whitespace().collect();
    if words.len() == 2 && words[0].eq_ignore_ascii_case(words[1]) {
        return words[0].to_string();
    }
    if words.len() == 1 {
        let w = words[0];
        let half = w.len() / 2;
        if w.len() >= 2
            && w.len() % 2 == 0
            && w.is_char_boundary(half)
            && w[..half].eq_ignore_ascii_case(&w[half..])
        {
            return w[..half].to_string();
        }
    }
    info.to_string()
}

/// If `info` is a known language followed by code, return both parts.
fn split_glued_code(info: &str) -> Option<(String, String)> {
    let lower = info.to_ascii_lowercase();
    let lang = KNOWN_LANGUAGES
        .iter()
        .filter(|l| lower.starts_with(*l))
        .max_by_key(|l| l.len())?;

    let rest = &info[lang.len()..];
    let code = rest.trim();
    if code.is_empty() {
        return None;
    }
    let has_code_chars = code.chars().any(|c| CODE_CHARS.contains(c));
    let multi_word = code.split_whitespace().count() >= 2;
    if has_code_chars || multi_word {
        Some((info[..lang.len()].to_string(), code.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicated_language_tag_is_collapsed() {
        assert_eq!(
            repair_fences("```pythonpython\ncode\n```"),
            "```python\ncode\n```"
        );
        assert_eq!(repair_fences("```js js\nx\n```"), "```js\nx\n```");
    }

    #[test]
    fn duplicated_tag_renders_single_block() {
        let html = render("```pythonpython\ncode\n```", RenderMode::Markdown);
        assert_eq!(html.matches("<pre>").count(), 1);
        assert!(html.contains("class=\"language-python\""));
        assert!(html.contains("<span class=\"code-lang\">python</span>"));
        assert!(!html.contains("pythonpython"));
        assert!(html.contains(">code\n</code>"));
    }

    #[test]
    fn code_glued_to_fence_moves_to_next_line() {
        assert_eq!(
            repair_fences("```python print('hi')\n```"),
            "```python\nprint('hi')\n```"
        );
        assert_eq!(
            repair_fences("```pythonimport os; os.getcwd()\n```"),
            "```python\nimport os; os.getcwd()\n```"
        );
    }

    #[test]
    fn plain_language_names_are_left_alone() {
        assert_eq!(repair_fences("```javascript\nx\n```"), "```javascript\nx\n```");
        assert_eq!(repair_fences("```cython\nx\n```"), "```cython\nx\n```");
        assert_eq!(repair_fences("```rust ignore\nx\n```"), "```rust ignore\nx\n```");
    }

    #[test]
    fn fence_glued_to_text_gets_own_line() {
        assert_eq!(
            repair_fences("Here you go:```bash\nls\n```"),
            "Here you go:\n```bash\nls\n```"
        );
        assert_eq!(repair_fences("```sh\nls```"), "```sh\nls\n```");
    }

    #[test]
    fn unterminated_fence_is_closed() {
        assert_eq!(repair_fences("```rust\nfn main() {}"), "```rust\nfn main() {}\n```");
    }

    #[test]
    fn well_formed_text_is_unchanged() {
        let text = "# Title\n\nSome `inline` code.\n\n```rust\nlet x = 1;\n```\n";
        assert_eq!(repair_fences(text), text);
    }

    #[test]
    fn structural_elements_get_classes() {
        let html = render(
            "## Steps\n\n1. one\n2. two\n\n- a\n\n> quoted",
            RenderMode::Markdown,
        );
        assert!(html.contains("<h2 class=\"md-heading md-h2\">Steps</h2>"));
        assert!(html.contains("<ol class=\"md-list\">"));
        assert!(html.contains("<ul class=\"md-list\">"));
        assert!(html.contains("<blockquote class=\"md-quote\">"));
    }

    #[test]
    fn code_content_is_escaped() {
        let html = render("```html\n<script>alert(1)</script>\n```", RenderMode::Markdown);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn raw_mode_escapes() {
        assert_eq!(
            render("<b>hi</b> *x*", RenderMode::Raw),
            "<div class=\"raw-text\">&lt;b&gt;hi&lt;/b&gt; *x*</div>"
        );
    }

    #[test]
    fn incremental_pass_is_sanitized() {
        let html = render_incremental(
            "[x](javascript:alert(1)) <img src=x onerror=\"alert(1)\">",
            RenderMode::Markdown,
        );
        assert!(!html.contains("javascript:"));
        assert!(!html.contains("onerror"));
    }

    #[test]
    fn inline_html_with_quoted_gt_is_sanitized() {
        let html = render("hi <img src=x alt=\"a>b\" onerror=alert(1)>", RenderMode::Markdown);
        assert!(html.contains("alt=\"a>b\""), "got: {}", html);
        assert!(!html.contains("onerror"), "got: {}", html);
    }

    #[test]
    fn block_ids_are_unique() {
        let html = render("```a\n1\n```\n\n```b\n2\n```", RenderMode::Markdown);
        assert!(html.contains("id=\"code-block-1\""));
        assert!(html.contains("id=\"code-block-2\""));
    }
}
