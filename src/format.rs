//! Reply cleanup and formatting.
//!
//! All functions here are pure string transformations.

use regex::Regex;
use std::sync::OnceLock;

/// Sentence count above which a reply becomes a numbered list.
const LIST_THRESHOLD: usize = 3;

/// Keywords marking an instructional reply.
const FOLLOW_UP_KEYWORDS: &[&str] = &["fill", "create", "register", "apply", "setup"];

/// Phrase whose presence suppresses the follow-up question.
const FOLLOW_UP_MARKER: &str = "Would you like";

pub const FOLLOW_UP_QUESTION: &str = "Would you like me to walk you through the steps in detail?";

static WS_RE: OnceLock<Regex> = OnceLock::new();
static WS_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace() -> &'static Regex {
    WS_RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn whitespace_runs() -> &'static Regex {
    WS_RUN_RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid whitespace-run regex"))
}

/// Collapse every whitespace run to one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    whitespace().replace_all(text, " ").trim().to_string()
}

/// Collapse runs of two or more whitespace characters to one space and trim.
/// Single newlines survive.
pub fn collapse_whitespace_runs(text: &str) -> String {
    whitespace_runs().replace_all(text, " ").trim().to_string()
}

/// Strip escaped and real newlines plus markdown emphasis from model output.
pub fn clean_reply(raw: &str) -> String {
    let text = raw
        .replace("\\n", " ")
        .replace('\n', " ")
        .replace("**", "")
        .replace('*', "");
    normalize_whitespace(&text)
}

/// Split after `.`, `!` or `?` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
        }
    }
    sentences.push(current);
    sentences
}

/// Render a reply as a paragraph, or as a lead sentence followed by numbered
/// steps when it has more than three sentences. Instructional replies get a
/// follow-up offer.
pub fn format_reply(raw: &str) -> String {
    let text = normalize_whitespace(&raw.replace("\\n", " ").replace("**", ""));
    let sentences = split_sentences(&text);

    let mut formatted = if sentences.len() > LIST_THRESHOLD {
        let steps = sentences[1..]
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n{}", sentences[0], steps)
    } else {
        sentences.join(" ")
    };

    if needs_follow_up(&text) {
        formatted.push_str("\n\n");
        formatted.push_str(FOLLOW_UP_QUESTION);
    }

    formatted
}

fn needs_follow_up(text: &str) -> bool {
    let lower = text.to_lowercase();
    FOLLOW_UP_KEYWORDS.iter().any(|k| lower.contains(k)) && !text.contains(FOLLOW_UP_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reply_strips_markdown_and_newlines() {
        let raw = "**Hello**\\nthere *friend*\n\n  how   are you?";
        assert_eq!(clean_reply(raw), "Hello there friend how are you?");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        // no whitespace after the dot: not a boundary
        assert_eq!(split_sentences("Visit v1.2 now."), vec!["Visit v1.2 now."]);
    }

    #[test]
    fn test_short_reply_is_paragraph() {
        let out = format_reply("You can browse freely. Everything is public.");
        assert_eq!(out, "You can browse freely. Everything is public.");
    }

    #[test]
    fn test_long_reply_is_numbered() {
        let out = format_reply("Here is how. Open the app. Tap Profile. Save changes.");
        assert_eq!(
            out,
            "Here is how.\n1. Open the app.\n2. Tap Profile.\n3. Save changes."
        );
    }

    #[test]
    fn test_exactly_three_sentences_stay_paragraph() {
        let out = format_reply("One. Two. Three.");
        assert!(!out.contains("1."));
    }

    #[test]
    fn test_follow_up_added_for_instructions() {
        let out = format_reply("You can register from the home page.");
        assert!(out.ends_with(&format!("\n\n{}", FOLLOW_UP_QUESTION)));
    }

    #[test]
    fn test_follow_up_not_duplicated() {
        let out = format_reply("You can register today. Would you like help?");
        assert!(!out.contains(FOLLOW_UP_QUESTION));
    }

    #[test]
    fn test_collapse_keeps_single_newlines() {
        let text = "Lead.\n1. Step.\n\nWould you like more?";
        assert_eq!(
            collapse_whitespace_runs(text),
            "Lead.\n1. Step. Would you like more?"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(format_reply(""), "");
        assert_eq!(clean_reply("   "), "");
    }
}
