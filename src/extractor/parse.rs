//! HTML 解析：标题、元信息、正文
//!
//! 正文按选择器优先级依次收集（article / main / 常见内容容器 / 段落 / 标题 / 列表），
//! 导航栏里的列表跳过；选择器都没有命中时退回 html2text 渲染整页。最后按行去重，先出现者保留。

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use super::WebPageRecord;

/// 正文选择器（按优先级）
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "#content",
    ".content",
    ".article-content",
    ".post-content",
    ".content p",
    "[role='main']",
    "[role='article']",
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "ul",
    "ol",
];

/// 列表选择器：嵌在 <nav> 里的不算正文
const LIST_SELECTORS: &[&str] = &["ul", "ol"];

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::warn!(css = %css, error = ?e, "invalid selector");
            None
        }
    }
}

/// 把任意空白序列折叠成单个空格
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按行去重（去掉首尾空白、跳过空行），先出现者保留
pub fn dedup_lines(content: &str) -> String {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && seen.insert(*line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn inside_nav(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|e| e.name() == "nav")
}

fn first_text(doc: &Html, css: &str) -> String {
    selector(css)
        .and_then(|sel| doc.select(&sel).next().map(|el| collapse_whitespace(&el.text().collect::<String>())))
        .unwrap_or_default()
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> String {
    selector(css)
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .and_then(|el| el.value().attr(attr).map(collapse_whitespace))
        })
        .unwrap_or_default()
}

fn extract_content(doc: &Html) -> String {
    let mut content = String::new();
    for css in CONTENT_SELECTORS {
        let Some(sel) = selector(css) else { continue };
        let skip_nav = LIST_SELECTORS.contains(css);
        for el in doc.select(&sel) {
            if skip_nav && inside_nav(&el) {
                continue;
            }
            let text = el.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                content.push_str(&collapse_whitespace(text));
                content.push('\n');
            }
        }
    }
    content
}

/// 解析单个页面为记录
pub fn parse_page(url: &str, html: &str) -> WebPageRecord {
    let doc = Html::parse_document(html);

    let mut content = extract_content(&doc);
    if content.trim().is_empty() {
        content = match html2text::from_read(html.as_bytes(), 120) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "html2text fallback failed");
                String::new()
            }
        };
    }

    WebPageRecord {
        url: url.to_string(),
        title: first_text(&doc, "title"),
        description: first_attr(&doc, "meta[name='description']", "content"),
        date: first_attr(&doc, "time[datetime]", "datetime"),
        author: first_attr(&doc, "meta[name='author']", "content"),
        content: dedup_lines(&content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_lines_first_wins() {
        assert_eq!(dedup_lines("A\nB\nA\nC\nB"), "A\nB\nC");
        assert_eq!(dedup_lines("  x \n\n x\ny"), "x\ny");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_parse_metadata_and_paragraphs() {
        let html = r#"<html><head>
            <title>  Rust
              Release </title>
            <meta name="description" content="Release   notes">
            <meta name="author" content="Core Team">
            </head><body>
            <time datetime="2024-02-08">Feb 8</time>
            <p>First   paragraph.</p>
            <p>Second paragraph.</p>
            <p>First paragraph.</p>
            </body></html>"#;
        let record = parse_page("https://example.com/post", html);
        assert_eq!(record.url, "https://example.com/post");
        assert_eq!(record.title, "Rust Release");
        assert_eq!(record.description, "Release notes");
        assert_eq!(record.author, "Core Team");
        assert_eq!(record.date, "2024-02-08");
        assert_eq!(record.content, "First paragraph.\nSecond paragraph.");
    }

    #[test]
    fn test_nav_lists_are_skipped() {
        let html = r#"<html><body>
            <nav><ul><li>Home</li><li>About</li></ul></nav>
            <ul><li>Real item</li></ul>
            </body></html>"#;
        let record = parse_page("https://example.com", html);
        assert!(record.content.contains("Real item"));
        assert!(!record.content.contains("Home"));
    }

    #[test]
    fn test_article_outranks_paragraphs() {
        let html = "<html><body><article><p>Inside</p></article><p>Outside</p></body></html>";
        let record = parse_page("https://example.com", html);
        let lines: Vec<&str> = record.content.lines().collect();
        assert_eq!(lines, vec!["Inside", "Outside"]);
    }

    #[test]
    fn test_fallback_renders_whole_page() {
        let html = "<html><body><div>Only a div here</div></body></html>";
        let record = parse_page("https://example.com", html);
        assert!(record.content.contains("Only a div here"));
    }
}
