//! Citation extraction and formatting for generated blocks.
//!
//! Citations come from two places: URL-citation annotations reported by the
//! backend while streaming, and URLs the model wrote inline (markdown links
//! or bare `http(s)://` URLs). Both are merged, deduplicated by URL, and
//! rendered as a `Sources:` footer.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `[title](https://...)`. The URL may hold one level of balanced
/// parentheses, as in `/wiki/Dune_(novel)`.
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]+)\]\((https?://(?:[^\s()]|\([^\s()]*\))+)\)")
        .expect("invalid markdown link regex")
});

/// Bare `http(s)://` URL, stopping at whitespace, brackets and quotes.
/// Balanced parentheses are kept as part of the URL.
static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://(?:[^\s<>()\[\]"'`]|\([^\s<>()\[\]"'`]*\))+"#)
        .expect("invalid url regex")
});

/// Trailing characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

/// A single source reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Citation {
    pub url: String,
    pub title: Option<String>,
}

impl Citation {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }
}

/// Collect citations from backend annotations and the response text.
///
/// Annotations come first, then inline URLs in order of appearance. Each
/// URL appears once; a later occurrence only contributes a title when the
/// first one had none.
pub fn extract_citations(text: &str, annotations: &[Citation]) -> Vec<Citation> {
    let mut found: Vec<(usize, Citation)> = Vec::new();
    for caps in MARKDOWN_LINK.captures_iter(text) {
        let (Some(whole), Some(title), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        found.push((
            whole.start(),
            Citation::new(url.as_str(), Some(title.as_str().trim().to_string())),
        ));
    }
    for m in BARE_URL.find_iter(text) {
        let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if url.len() > "https://".len() {
            found.push((m.start(), Citation::new(url, None)));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut merged: Vec<Citation> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let candidates = annotations
        .iter()
        .cloned()
        .chain(found.into_iter().map(|(_, c)| c));
    for citation in candidates {
        match index.get(&citation.url) {
            Some(&i) => {
                if merged[i].title.is_none() {
                    merged[i].title = citation.title;
                }
            }
            None => {
                index.insert(citation.url.clone(), merged.len());
                merged.push(citation);
            }
        }
    }
    merged
}

/// Format citations as a "Sources:" footer. Empty when there are none.
pub fn format_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = citations
        .iter()
        .map(|c| {
            let title = c.title.as_deref().filter(|t| !t.is_empty()).unwrap_or(&c.url);
            format!("- [{title}]({})", c.url)
        })
        .collect();
    format!("\n\nSources:\n{}", lines.join("\n"))
}

/// Append the citation footer to a response.
pub fn format_response_with_citations(text: &str, citations: &[Citation]) -> String {
    format!("{text}{}", format_citations(citations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_and_bare_urls_in_order() {
        let text = "See https://b.example/x. Also [Alpha](https://a.example/page) and \
                    (https://c.example).";
        let citations = extract_citations(text, &[]);
        let urls: Vec<&str> = citations.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://b.example/x", "https://a.example/page", "https://c.example"]
        );
        assert_eq!(citations[1].title.as_deref(), Some("Alpha"));
        assert!(citations[0].title.is_none());
    }

    #[test]
    fn deduplicates_and_keeps_first_title() {
        let annotations = vec![Citation::new("https://a.example/page", None)];
        let text = "[Alpha](https://a.example/page) then https://a.example/page again";
        let citations = extract_citations(text, &annotations);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].title.as_deref(), Some("Alpha"));
    }

    #[test]
    fn urls_with_balanced_parentheses() {
        let citations = extract_citations(
            "See [Dune](https://en.wikipedia.org/wiki/Dune_(novel)). \
             Also https://en.wikipedia.org/wiki/Arrakis_(planet), and \
             (https://c.example/plain).",
            &[],
        );
        assert_eq!(
            citations,
            vec![
                Citation::new("https://en.wikipedia.org/wiki/Dune_(novel)", Some("Dune".into())),
                Citation::new("https://en.wikipedia.org/wiki/Arrakis_(planet)", None),
                Citation::new("https://c.example/plain", None),
            ]
        );
    }

    #[test]
    fn no_citations_means_no_footer() {
        let text = "A tale with no sources.";
        let citations = extract_citations(text, &[]);
        assert!(citations.is_empty());
        assert_eq!(format_response_with_citations(text, &citations), text);
    }

    #[test]
    fn footer_falls_back_to_url_title() {
        let citations = vec![
            Citation::new("https://a.example", Some("Alpha".into())),
            Citation::new("https://b.example", None),
        ];
        assert_eq!(
            format_response_with_citations("Body", &citations),
            "Body\n\nSources:\n- [Alpha](https://a.example)\n- [https://b.example](https://b.example)"
        );
    }
}
