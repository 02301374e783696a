//! Text pipeline — keyword admission and message cleanup.
//!
//! Both functions are pure: same input, same output, no I/O.

use regex::Regex;

/// Keyword allow-list check.
///
/// An empty list admits everything; otherwise at least one keyword must
/// occur as a case-insensitive substring.
pub fn admits_keywords(text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let low = text.to_lowercase();
    keywords.iter().any(|k| low.contains(&k.to_lowercase()))
}

/// Cleans forwarded text: strips @mentions and t.me links, removes the
/// configured literal patterns, then normalizes whitespace.
#[derive(Debug)]
pub struct TextCleaner {
    mention_re: Regex,
    deep_link_re: Regex,
    newlines_re: Regex,
    spaces_re: Regex,
    remove_patterns: Vec<String>,
}

impl TextCleaner {
    pub fn new(remove_patterns: Vec<String>) -> Self {
        Self {
            mention_re: Regex::new(r"@\w+").unwrap(),
            deep_link_re: Regex::new(r"https?://t\.me/\S+").unwrap(),
            newlines_re: Regex::new(r"\n{3,}").unwrap(),
            spaces_re: Regex::new(r" {2,}").unwrap(),
            remove_patterns,
        }
    }

    /// Apply the full cleanup sequence. Order matters: mentions, links,
    /// literal patterns, then whitespace collapse and trim.
    pub fn cleanse(&self, text: &str) -> String {
        let mut text = self.mention_re.replace_all(text, "").into_owned();
        text = self.deep_link_re.replace_all(&text, "").into_owned();

        for pattern in &self.remove_patterns {
            if pattern.is_empty() {
                continue;
            }
            text = text.replace(pattern.as_str(), "");
        }

        let text = self.newlines_re.replace_all(&text, "\n\n");
        let text = self.spaces_re.replace_all(&text, " ");
        text.trim().to_string()
    }
}
