//! HTML extraction: outbound links and word tokens from raw page bytes.
//!
//! The server's Content-Type is never trusted; bytes are decoded as UTF-8
//! with replacement and handed to html5ever, which never fails on malformed
//! markup. Binary garbage simply yields empty output.

use std::collections::{HashMap, HashSet};

use scraper::{Html, Node, Selector};

use crate::url_norm;

/// Result of extracting one document.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Absolute outbound links, deduplicated, in document order.
    pub links: Vec<String>,
    /// Occurrence count per word token.
    pub tokens: HashMap<String, usize>,
}

/// Parse `bytes` and pull out links and word tokens.
///
/// Links come from `href` on `<a>` and `src` on `<img>`/`<script>`/
/// `<iframe>`, resolved against `base_url`; anything the normalizer rejects
/// is dropped. Text inside `<script>` and `<style>` is never tokenized.
pub fn extract(bytes: &[u8], base_url: &str) -> Extraction {
    let html = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&html);

    let link_selector = Selector::parse("a[href], img[src], script[src], iframe[src]").unwrap();

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for element in document.select(&link_selector) {
        let attr = if element.value().name() == "a" {
            "href"
        } else {
            "src"
        };
        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        if let Some(absolute) = url_norm::normalize(raw, Some(base_url)) {
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    }

    let text = visible_text(&document);

    Extraction {
        links,
        tokens: token_counts(&text),
    }
}

/// Concatenated text content of the document, excluding `<script>` and
/// `<style>` subtrees. Entity references are already decoded by the parser.
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    // iterative walk keeps arbitrarily nested documents off the call stack
    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Element(element) => {
                let name = element.name();
                if name == "script" || name == "style" {
                    continue;
                }
            }
            Node::Text(text) => {
                out.push_str(&text.text);
                out.push(' ');
                continue;
            }
            _ => {}
        }
        for child in node.children() {
            stack.push(child);
        }
    }
    out
}

/// Maximal runs of Unicode letters, lowercased, at least two letters long.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|run| run.chars().count() >= 2)
        .map(|run| run.to_lowercase())
        .collect()
}

/// Token occurrence counts for a block of text.
pub fn token_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://example.com/dir/page";

    #[test]
    fn test_extracts_links_in_document_order() {
        let html = br#"<html><body>
            <a href="/first">one</a>
            <img src="/second.png">
            <a href="http://other.com/third">three</a>
            <iframe src="/fourth"></iframe>
        </body></html>"#;
        let result = extract(html, BASE);
        assert_eq!(
            result.links,
            vec![
                "http://example.com/first",
                "http://example.com/second.png",
                "http://other.com/third",
                "http://example.com/fourth",
            ]
        );
    }

    #[test]
    fn test_deduplicates_links() {
        let html = br#"<a href="/a">x</a><a href="/a">y</a><a href="/a#frag">z</a>"#;
        let result = extract(html, BASE);
        assert_eq!(result.links, vec!["http://example.com/a"]);
    }

    #[test]
    fn test_drops_unfetchable_links() {
        let html = br#"<a href="mailto:x@y.z">m</a><a href="javascript:void(0)">j</a>"#;
        let result = extract(html, BASE);
        assert!(result.links.is_empty());
    }

    #[test]
    fn test_script_and_style_are_not_tokenized() {
        let html = br#"<html><head>
            <style>body { color: red; }</style>
            <script>var hidden = "sneaky";</script>
        </head><body>visible words here</body></html>"#;
        let result = extract(html, BASE);
        assert!(result.tokens.contains_key("visible"));
        assert!(result.tokens.contains_key("words"));
        assert!(!result.tokens.contains_key("sneaky"));
        assert!(!result.tokens.contains_key("color"));
        assert!(!result.tokens.contains_key("var"));
    }

    #[test]
    fn test_script_src_still_discovered() {
        let html = br#"<script src="/app.js">ignored()</script>"#;
        let result = extract(html, BASE);
        assert_eq!(result.links, vec!["http://example.com/app.js"]);
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn test_entities_are_decoded() {
        let html = "<p>fish &amp; chips &lt;today&gt;</p>".as_bytes();
        let result = extract(html, BASE);
        assert_eq!(result.tokens.get("fish"), Some(&1));
        assert_eq!(result.tokens.get("chips"), Some(&1));
        assert_eq!(result.tokens.get("today"), Some(&1));
        assert!(!result.tokens.contains_key("amp"));
    }

    #[test]
    fn test_token_rules() {
        let counts = token_counts("Rust rust RUST a 42 naïve word2word");
        // case-folded and counted
        assert_eq!(counts.get("rust"), Some(&3));
        // single letters and digit runs dropped
        assert!(!counts.contains_key("a"));
        assert!(!counts.contains_key("42"));
        // non-ASCII letters are letters
        assert_eq!(counts.get("naïve"), Some(&1));
        // digits split letter runs
        assert_eq!(counts.get("word"), Some(&2));
    }

    #[test]
    fn test_binary_input_yields_empty_output() {
        let garbage: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let result = extract(&garbage, BASE);
        assert!(result.links.is_empty());
    }

    #[test]
    fn test_malformed_html_does_not_panic() {
        let html = b"<a href='/x'><div><<<>>></a unclosed <b><i>text";
        let result = extract(html, BASE);
        assert_eq!(result.links, vec!["http://example.com/x"]);
        assert!(result.tokens.contains_key("text"));
    }

    #[test]
    fn test_empty_document() {
        let result = extract(b"", BASE);
        assert!(result.links.is_empty());
        assert!(result.tokens.is_empty());
    }
}
