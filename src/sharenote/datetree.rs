//! Year → Month → Day heading tree inside an org-style text document.
//!
//! The document is held as lines. Date nodes are located by the leading date
//! token of their heading (`2014`, `2014-03`, `2014-03-05`), so weekday and
//! month names are cosmetic. Everything that is not a date node is kept as-is.

use crate::error::IngestError;
use crate::sharenote::format::FormattedEntry;
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Star count of an org heading line (`*** Title` → 3).
pub fn heading_depth(line: &str) -> Option<usize> {
    let stars = line.bytes().take_while(|b| *b == b'*').count();
    if stars == 0 {
        return None;
    }
    match line.as_bytes().get(stars) {
        Some(b' ') => Some(stars),
        _ => None,
    }
}

fn heading_title(line: &str) -> &str {
    line.trim_start_matches('*').trim()
}

fn leading_token(title: &str) -> &str {
    title.split_whitespace().next().unwrap_or("")
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn year_key(title: &str) -> Option<i32> {
    let token = leading_token(title);
    if !all_digits(token, 4) {
        return None;
    }
    token.parse().ok()
}

fn month_key(title: &str) -> Option<(i32, u32)> {
    let (year, month) = leading_token(title).split_once('-')?;
    if !all_digits(year, 4) || !all_digits(month, 2) {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year.parse().ok()?, month))
}

fn day_key(title: &str) -> Option<NaiveDate> {
    let token = leading_token(title);
    if token.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone)]
pub struct DatetreeDocument {
    path: PathBuf,
    write_path: PathBuf,
    lines: Vec<String>,
    base_depth: usize,
    newline: &'static str,
    read_only: bool,
    dirty: bool,
}

impl DatetreeDocument {
    pub fn open(path: &Path, base_depth: usize) -> Result<Self, IngestError> {
        if !path.exists() {
            return Err(IngestError::TargetMissing(path.to_path_buf()));
        }
        let write_path =
            fs::canonicalize(path).map_err(|err| IngestError::storage("resolve", path, err))?;
        let meta =
            fs::metadata(&write_path).map_err(|err| IngestError::storage("stat", path, err))?;
        let raw = fs::read_to_string(&write_path)
            .map_err(|err| IngestError::storage("read", path, err))?;

        let mut doc = Self::from_text(path, &raw, base_depth);
        doc.write_path = write_path;
        doc.read_only = meta.permissions().readonly();
        Ok(doc)
    }

    pub fn from_text(path: impl Into<PathBuf>, text: &str, base_depth: usize) -> Self {
        let path = path.into();
        Self {
            write_path: path.clone(),
            path,
            lines: text.lines().map(ToOwned::to_owned).collect(),
            base_depth: base_depth.max(1),
            newline: if text.contains("\r\n") { "\r\n" } else { "\n" },
            read_only: false,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join(self.newline);
        out.push_str(self.newline);
        out
    }

    pub fn insert_under_date(
        &mut self,
        date: NaiveDate,
        formatted: &FormattedEntry,
    ) -> Result<(), IngestError> {
        if self.read_only {
            return Err(IngestError::ReadOnlyTarget(self.path.clone()));
        }

        let depth = self.base_depth;
        let stars = |n: usize| "*".repeat(n);

        let year = self.find_or_create(
            self.root_range(),
            depth,
            &date.year(),
            year_key,
            format!("{} {}", stars(depth), date.format("%Y")),
        );
        let month = self.find_or_create(
            year + 1..self.subtree_end(year),
            depth + 1,
            &(date.year(), date.month()),
            month_key,
            format!("{} {}", stars(depth + 1), date.format("%Y-%m %B")),
        );
        let day = self.find_or_create(
            month + 1..self.subtree_end(month),
            depth + 2,
            &date,
            day_key,
            format!("{} {}", stars(depth + 2), date.format("%Y-%m-%d %A")),
        );

        let day_end = self.subtree_end(day);
        let mut at = day + 1;
        while at < day_end && heading_depth(&self.lines[at]).is_none() {
            at += 1;
        }
        self.lines
            .splice(at..at, formatted.lines().map(ToOwned::to_owned));
        self.dirty = true;
        Ok(())
    }

    /// Titles of the entries filed under `date`, in document order.
    pub fn day_entries(&self, date: NaiveDate) -> Vec<String> {
        let depth = self.base_depth;
        let Some(year) = self.locate(self.root_range(), depth, &date.year(), year_key) else {
            return Vec::new();
        };
        let Some(month) = self.locate(
            year + 1..self.subtree_end(year),
            depth + 1,
            &(date.year(), date.month()),
            month_key,
        ) else {
            return Vec::new();
        };
        let Some(day) = self.locate(month + 1..self.subtree_end(month), depth + 2, &date, day_key)
        else {
            return Vec::new();
        };

        self.lines[day + 1..self.subtree_end(day)]
            .iter()
            .filter(|line| heading_depth(line) == Some(depth + 3))
            .map(|line| heading_title(line).to_string())
            .collect()
    }

    pub fn persist(&mut self) -> Result<bool, IngestError> {
        if !self.dirty {
            return Ok(false);
        }
        if self.read_only {
            return Err(IngestError::ReadOnlyTarget(self.path.clone()));
        }

        let dir = self
            .write_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|err| IngestError::storage("stage", dir, err))?;
        tmp.write_all(self.render().as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|err| IngestError::storage("write", tmp.path(), err))?;
        if let Ok(meta) = fs::metadata(&self.write_path) {
            let _ = fs::set_permissions(tmp.path(), meta.permissions());
        }
        tmp.persist(&self.write_path)
            .map_err(|err| IngestError::storage("persist", &self.path, err.error))?;

        self.dirty = false;
        Ok(true)
    }

    /// Lines the year nodes live in: the whole document at base depth 1, otherwise
    /// the body of the first heading one level above the base depth.
    fn root_range(&self) -> Range<usize> {
        if self.base_depth > 1 {
            let parent = self
                .lines
                .iter()
                .position(|line| heading_depth(line) == Some(self.base_depth - 1));
            if let Some(parent) = parent {
                return parent + 1..self.subtree_end(parent);
            }
        }
        0..self.lines.len()
    }

    fn subtree_end(&self, index: usize) -> usize {
        let depth = heading_depth(&self.lines[index]).unwrap_or(0);
        self.lines[index + 1..]
            .iter()
            .position(|line| heading_depth(line).is_some_and(|d| d <= depth))
            .map(|offset| index + 1 + offset)
            .unwrap_or(self.lines.len())
    }

    fn locate<K: Ord>(
        &self,
        range: Range<usize>,
        depth: usize,
        key: &K,
        key_of: fn(&str) -> Option<K>,
    ) -> Option<usize> {
        range.into_iter().find(|&i| {
            heading_depth(&self.lines[i]) == Some(depth)
                && key_of(heading_title(&self.lines[i])).as_ref() == Some(key)
        })
    }

    fn find_or_create<K: Ord>(
        &mut self,
        range: Range<usize>,
        depth: usize,
        key: &K,
        key_of: fn(&str) -> Option<K>,
        heading: String,
    ) -> usize {
        if let Some(found) = self.locate(range.clone(), depth, key, key_of) {
            return found;
        }

        let mut insert_at = None;
        let mut after_last_dated = None;
        let mut i = range.start;
        while i < range.end {
            if heading_depth(&self.lines[i]) == Some(depth) {
                if let Some(existing) = key_of(heading_title(&self.lines[i])) {
                    if existing.cmp(key) == Ordering::Greater {
                        insert_at = Some(i);
                        break;
                    }
                    let end = self.subtree_end(i);
                    after_last_dated = Some(end);
                    i = end;
                    continue;
                }
            }
            i += 1;
        }

        let at = insert_at.or(after_last_dated).unwrap_or(range.end);
        self.lines.insert(at, heading);
        at
    }
}
