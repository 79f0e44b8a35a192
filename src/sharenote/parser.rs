//! Shared-note parsing.
//!
//! A note is an unstructured text blob written by a phone share sheet or a
//! sync agent. Normalization runs as an ordered pipeline of pure string
//! transforms, then the result is split into a title and body lines.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::str::Utf8Error;
use std::sync::LazyLock;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TITLE_DELIMITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?[-!:|] ").expect("title delimiter pattern"));
static LINK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s)(https?:)").expect("link start pattern"));
static LINE_BREAK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+").expect("line break run pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub body: Vec<String>,
    pub timestamp: NaiveDateTime,
}

impl Entry {
    /// First body line carrying a URL scheme. The link stays inline in `body`.
    pub fn link(&self) -> Option<&str> {
        self.body
            .iter()
            .map(String::as_str)
            .find(|line| line.starts_with("http:") || line.starts_with("https:"))
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn timestamp_label(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

pub fn strip_tabs(text: &str) -> String {
    text.chars().filter(|c| *c != '\t' && *c != '\r').collect()
}

pub fn split_title_delimiters(text: &str) -> String {
    TITLE_DELIMITER_RE.replace_all(text, "\n").into_owned()
}

pub fn separate_links(text: &str) -> String {
    LINK_START_RE.replace_all(text, "${1}\n${2}").into_owned()
}

pub fn drop_leading_blank_line(text: &str) -> String {
    let rest = text.trim_start_matches('\n');
    if rest.is_empty() {
        return text.to_string();
    }
    rest.to_string()
}

pub fn collapse_line_breaks(text: &str) -> String {
    LINE_BREAK_RUN_RE.replace_all(text, "\n").into_owned()
}

pub fn normalize(text: &str) -> String {
    let text = strip_tabs(text);
    let text = split_title_delimiters(&text);
    let text = separate_links(&text);
    let text = drop_leading_blank_line(&text);
    collapse_line_breaks(&text)
}

pub fn split_lines(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.lines().map(|line| line.trim_end().to_string()).collect()
}

fn derive_header(mut lines: Vec<String>, fallback_name: &str) -> (String, Vec<String>) {
    if lines.len() <= 1 {
        return (fallback_name.to_string(), lines);
    }
    let title = lines.remove(0);
    if title.trim().is_empty() {
        return (fallback_name.to_string(), lines);
    }
    (title, lines)
}

pub fn parse_text(text: &str, mtime: NaiveDateTime, fallback_name: &str) -> Entry {
    let lines = split_lines(&normalize(text));
    let (title, body) = derive_header(lines, fallback_name);
    Entry {
        title,
        body,
        timestamp: mtime,
    }
}

pub fn parse_note(
    raw: &[u8],
    mtime: NaiveDateTime,
    fallback_name: &str,
) -> Result<Entry, Utf8Error> {
    let text = std::str::from_utf8(raw)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    Ok(parse_text(text, mtime, fallback_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(hh, mm, ss))
            .expect("valid timestamp")
    }

    fn parse(text: &str) -> Entry {
        parse_text(text, at(2014, 3, 5, 10, 0, 0), "fallback")
    }

    #[test]
    fn strip_tabs_removes_every_tab() {
        assert_eq!(strip_tabs("a\tb\t\tc"), "abc");
        assert_eq!(strip_tabs("line\r\nnext"), "line\nnext");
    }

    #[test]
    fn title_delimiters_become_line_breaks() {
        assert_eq!(split_title_delimiters("Foo - bar: baz"), "Foo\nbar\nbaz");
        assert_eq!(split_title_delimiters("Wow! Great | Site"), "Wow\nGreat\nSite");
        assert_eq!(split_title_delimiters("Foo-bar"), "Foo-bar");
        assert_eq!(
            split_title_delimiters("http://example.com/a-b"),
            "http://example.com/a-b"
        );
    }

    #[test]
    fn links_preceded_by_whitespace_move_to_own_line() {
        assert_eq!(
            separate_links("Read this http://example.com/x"),
            "Read this \nhttp://example.com/x"
        );
        assert_eq!(
            separate_links("Secure https://example.com"),
            "Secure \nhttps://example.com"
        );
        assert_eq!(separate_links("http://example.com"), "http://example.com");
        assert_eq!(separate_links("nohttp:here"), "nohttp:here");
    }

    #[test]
    fn leading_blank_line_dropped_unless_nothing_remains() {
        assert_eq!(drop_leading_blank_line("\nhttp://x"), "http://x");
        assert_eq!(drop_leading_blank_line("\n\nTitle"), "Title");
        assert_eq!(drop_leading_blank_line("\n"), "\n");
        assert_eq!(drop_leading_blank_line("Title\n"), "Title\n");
    }

    #[test]
    fn line_break_runs_collapse() {
        assert_eq!(collapse_line_breaks("a\n\n\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn bare_url_takes_fallback_title() {
        let entry = parse_text(
            "http://example.com/article\n",
            at(2014, 3, 5, 10, 0, 0),
            "shared-link",
        );
        assert_eq!(entry.title, "shared-link");
        assert_eq!(entry.body, vec!["http://example.com/article".to_string()]);
        assert_eq!(entry.link(), Some("http://example.com/article"));
    }

    #[test]
    fn title_blank_line_url() {
        let entry = parse("Interesting Article\n\nhttp://example.com/x");
        assert_eq!(entry.title, "Interesting Article");
        assert_eq!(entry.body, vec!["http://example.com/x".to_string()]);
    }

    #[test]
    fn delimiter_chain_promotes_first_line_to_title() {
        let entry = parse("Foo - bar: baz");
        assert_eq!(entry.title, "Foo");
        assert_eq!(entry.body, vec!["bar".to_string(), "baz".to_string()]);
        assert_eq!(entry.link(), None);
    }

    #[test]
    fn glued_url_is_split_from_headline() {
        let entry = parse("\tRust 2024 is out - The Blog http://blog.example.com/rust");
        assert_eq!(entry.title, "Rust 2024 is out");
        assert_eq!(
            entry.body,
            vec![
                "The Blog".to_string(),
                "http://blog.example.com/rust".to_string()
            ]
        );
    }

    #[test]
    fn leading_blank_line_does_not_become_title() {
        let entry = parse("\n\nHeadline\nhttp://example.com");
        assert_eq!(entry.title, "Headline");
        assert_eq!(entry.body, vec!["http://example.com".to_string()]);
    }

    #[test]
    fn empty_note_is_title_only() {
        let entry = parse("");
        assert_eq!(entry.title, "fallback");
        assert!(entry.body.is_empty());

        let entry = parse("\t\n\n");
        assert_eq!(entry.title, "fallback");
        assert!(entry.body.is_empty());
    }

    #[test]
    fn timestamp_label_is_second_precision() {
        let entry = parse_text("x\ny", at(2014, 3, 5, 9, 7, 3), "f");
        assert_eq!(entry.timestamp_label(), "2014-03-05 09:07:03");
        assert_eq!(entry.date(), NaiveDate::from_ymd_opt(2014, 3, 5).expect("date"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let raw = [0x66, 0x6f, 0xff, 0xfe];
        assert!(parse_note(&raw, at(2014, 3, 5, 10, 0, 0), "bad").is_err());
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let raw = "\u{feff}Title\nhttp://example.com".as_bytes();
        let entry = parse_note(raw, at(2014, 3, 5, 10, 0, 0), "bom").expect("parse");
        assert_eq!(entry.title, "Title");
    }
}
