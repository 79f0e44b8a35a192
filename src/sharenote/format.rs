use crate::sharenote::datetree::heading_depth;
use crate::sharenote::parser::Entry;

/// Datetree levels between the base depth and an entry heading: year, month, day.
pub const ENTRY_DEPTH_OFFSET: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedEntry(String);

impl FormattedEntry {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.lines()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntryFormatter {
    heading_depth: usize,
}

impl EntryFormatter {
    pub fn for_datetree(base_depth: usize) -> Self {
        Self {
            heading_depth: base_depth + ENTRY_DEPTH_OFFSET,
        }
    }

    pub fn heading_depth(&self) -> usize {
        self.heading_depth
    }

    pub fn format(&self, entry: &Entry) -> FormattedEntry {
        let mut out = String::new();
        out.push_str(&"*".repeat(self.heading_depth));
        out.push(' ');
        out.push_str(entry.title.trim());
        out.push('\n');
        for line in &entry.body {
            out.push_str(&escape_heading_line(line));
            out.push('\n');
        }
        out.push_str(&format!("Entered on [{}]\n", entry.timestamp_label()));
        out.push('\n');
        FormattedEntry(out)
    }
}

fn escape_heading_line(line: &str) -> String {
    if heading_depth(line).is_some() {
        return format!(",{line}");
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(title: &str, body: &[&str]) -> Entry {
        Entry {
            title: title.to_string(),
            body: body.iter().map(|s| s.to_string()).collect(),
            timestamp: NaiveDate::from_ymd_opt(2014, 3, 5)
                .and_then(|d| d.and_hms_opt(10, 0, 0))
                .expect("valid"),
        }
    }

    #[test]
    fn formats_heading_body_and_footer() {
        let formatted = EntryFormatter::for_datetree(1)
            .format(&entry("Interesting Article", &["http://example.com/x"]));
        assert_eq!(
            formatted.as_str(),
            "**** Interesting Article\nhttp://example.com/x\nEntered on [2014-03-05 10:00:00]\n\n"
        );
        assert_eq!(formatted.lines().count(), 4);
    }

    #[test]
    fn depth_follows_base_depth() {
        let formatter = EntryFormatter::for_datetree(2);
        assert_eq!(formatter.heading_depth(), 5);
        let formatted = formatter.format(&entry("Title", &[]));
        assert!(formatted.as_str().starts_with("***** Title\nEntered on ["));
    }

    #[test]
    fn body_lines_that_look_like_headings_are_escaped() {
        let formatted = EntryFormatter::for_datetree(1).format(&entry("T", &["* not a node", "*bold*"]));
        let lines = formatted.lines().collect::<Vec<_>>();
        assert_eq!(lines[1], ",* not a node");
        assert_eq!(lines[2], "*bold*");
    }
}
