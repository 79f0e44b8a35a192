use crate::error::{ErrorCode, IngestError};
use crate::sharenote::clock::NoteClock;
use crate::sharenote::datetree::DatetreeDocument;
use crate::sharenote::format::EntryFormatter;
use crate::sharenote::parser::{Entry, parse_note};
use crate::sharenote::util::plural;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub note_extension: String,
    pub base_depth: usize,
    pub clock: NoteClock,
    pub lock_target: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            note_extension: "txt".to_string(),
            base_depth: 1,
            clock: NoteClock::Local,
            lock_target: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedNote {
    pub path: PathBuf,
    pub code: ErrorCode,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    pub target_present: bool,
    pub scanned: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedNote>,
    pub undeleted: Vec<PathBuf>,
    pub persisted: bool,
}

impl PassOutcome {
    pub fn status_line(&self) -> Option<String> {
        if self.processed == 0 {
            return None;
        }
        Some(format!("processed {}", plural(self.processed, "shared note")))
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.undeleted.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IngestionRunner {
    note_dir: PathBuf,
    target_file: PathBuf,
    formatter: EntryFormatter,
    opts: RunnerOptions,
}

fn is_note_file(path: &Path, extension: &str) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext == extension)
}

pub fn collect_notes(note_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, IngestError> {
    let entries =
        fs::read_dir(note_dir).map_err(|err| IngestError::storage("list", note_dir, err))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::storage("list", note_dir, err))?;
        let path = entry.path();
        if is_note_file(&path, extension) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Hidden `.<name>.lock` sidecar next to the resolved target.
pub fn target_lock_path(target_file: &Path) -> Result<PathBuf, IngestError> {
    let resolved = fs::canonicalize(target_file)
        .map_err(|err| IngestError::storage("resolve", target_file, err))?;
    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_string());
    let dir = resolved.parent().unwrap_or(Path::new("."));
    Ok(dir.join(format!(".{name}.lock")))
}

fn same_file(path: &Path, resolved: &Path) -> bool {
    fs::canonicalize(path).is_ok_and(|p| p == resolved)
}

fn fallback_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("note")
        .to_string()
}

impl IngestionRunner {
    pub fn new(
        note_dir: impl Into<PathBuf>,
        target_file: impl Into<PathBuf>,
        opts: RunnerOptions,
    ) -> Self {
        Self {
            note_dir: note_dir.into(),
            target_file: target_file.into(),
            formatter: EntryFormatter::for_datetree(opts.base_depth),
            opts,
        }
    }

    pub fn note_dir(&self) -> &Path {
        &self.note_dir
    }

    pub fn target_file(&self) -> &Path {
        &self.target_file
    }

    /// Reads and parses one note without touching the target document.
    pub fn load_note(&self, path: &Path) -> Result<Entry, IngestError> {
        let meta = fs::metadata(path).map_err(|err| IngestError::storage("stat", path, err))?;
        let modified = meta
            .modified()
            .map_err(|err| IngestError::storage("stat", path, err))?;
        let raw = fs::read(path).map_err(|err| IngestError::storage("read", path, err))?;

        parse_note(
            &raw,
            self.opts.clock.wall_time_of(modified),
            &fallback_name(path),
        )
        .map_err(|source| IngestError::MalformedNote {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn formatter(&self) -> &EntryFormatter {
        &self.formatter
    }

    /// Notes waiting in the note dir. The target document and its lock never count,
    /// even when they live there with the note extension.
    pub fn pending_notes(&self) -> Result<Vec<PathBuf>, IngestError> {
        let mut notes = collect_notes(&self.note_dir, &self.opts.note_extension)?;
        if let Ok(target) = fs::canonicalize(&self.target_file) {
            let lock = target_lock_path(&target).ok();
            notes.retain(|path| {
                !same_file(path, &target) && lock.as_deref().is_none_or(|l| !same_file(path, l))
            });
        }
        Ok(notes)
    }

    fn acquire_lock(&self) -> Result<Option<File>, IngestError> {
        if !self.opts.lock_target {
            return Ok(None);
        }
        let lock_path = target_lock_path(&self.target_file)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| IngestError::storage("open", &lock_path, err))?;
        file.try_lock_exclusive()
            .map_err(|_| IngestError::Locked(self.target_file.clone()))?;
        Ok(Some(file))
    }

    pub fn run(&self) -> Result<PassOutcome, IngestError> {
        let mut out = PassOutcome::default();

        if !self.target_file.exists() {
            debug!(document = %self.target_file.display(), "target document missing; skipping pass");
            return Ok(out);
        }

        let _lock = self.acquire_lock()?;
        let mut document = match DatetreeDocument::open(&self.target_file, self.opts.base_depth) {
            Ok(doc) => doc,
            Err(IngestError::TargetMissing(_)) => return Ok(out),
            Err(err) => return Err(err),
        };
        out.target_present = true;

        if !self.note_dir.exists() {
            fs::create_dir_all(&self.note_dir)
                .map_err(|err| IngestError::storage("create", &self.note_dir, err))?;
        }
        let notes = self.pending_notes()?;
        out.scanned = notes.len();

        let mut inserted = Vec::new();
        for path in notes {
            let entry = match self.load_note(&path) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(note = %path.display(), code = err.code().as_str(), "skipping note: {err}");
                    out.skipped.push(SkippedNote {
                        path,
                        code: err.code(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let formatted = self.formatter.format(&entry);
            document.insert_under_date(entry.date(), &formatted)?;
            debug!(note = %path.display(), title = %entry.title, date = %entry.date(), "note filed");
            inserted.push(path);
        }

        out.persisted = document.persist()?;
        if out.persisted {
            debug!(document = %document.path().display(), "target document persisted");
        }

        for path in inserted {
            match fs::remove_file(&path) {
                Ok(()) => out.processed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => out.processed += 1,
                Err(err) => {
                    warn!(note = %path.display(), "filed note could not be removed: {err}");
                    out.undeleted.push(path);
                }
            }
        }

        if let Some(line) = out.status_line() {
            info!(document = %self.target_file.display(), "{line}");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _tmp: TempDir,
        notes: PathBuf,
        target: PathBuf,
    }

    fn fixture(target_text: Option<&str>) -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let notes = tmp.path().join("notes");
        fs::create_dir_all(&notes).expect("mkdir notes");
        let target = tmp.path().join("journal.org");
        if let Some(text) = target_text {
            fs::write(&target, text).expect("write target");
        }
        Fixture {
            notes,
            target,
            _tmp: tmp,
        }
    }

    fn utc_clock() -> NoteClock {
        NoteClock::Zone(chrono_tz::UTC)
    }

    fn runner(fx: &Fixture) -> IngestionRunner {
        IngestionRunner::new(
            &fx.notes,
            &fx.target,
            RunnerOptions {
                clock: utc_clock(),
                ..RunnerOptions::default()
            },
        )
    }

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(hh, mm, ss))
            .expect("valid timestamp")
    }

    fn write_note(dir: &Path, name: &str, body: &[u8], mtime: NaiveDateTime) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write note");
        let secs = u64::try_from(mtime.and_utc().timestamp()).expect("post-epoch");
        let file = File::options().write(true).open(&path).expect("open note");
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .expect("set mtime");
        path
    }

    #[test]
    fn end_to_end_single_note() {
        let fx = fixture(Some("#+TITLE: Journal\n"));
        let note = write_note(
            &fx.notes,
            "a.txt",
            b"Interesting Article\n\nhttp://example.com/x",
            at(2014, 3, 5, 10, 0, 0),
        );

        let out = runner(&fx).run().expect("pass");
        assert!(out.target_present);
        assert_eq!(out.processed, 1);
        assert!(out.persisted);
        assert!(!note.exists());
        assert_eq!(out.status_line().as_deref(), Some("processed 1 shared note"));

        let doc = fs::read_to_string(&fx.target).expect("read target");
        assert_eq!(
            doc,
            "#+TITLE: Journal\n\
             * 2014\n\
             ** 2014-03 March\n\
             *** 2014-03-05 Wednesday\n\
             **** Interesting Article\n\
             http://example.com/x\n\
             Entered on [2014-03-05 10:00:00]\n\
             \n"
        );
    }

    #[test]
    fn missing_target_leaves_notes_alone() {
        let fx = fixture(None);
        let note = write_note(&fx.notes, "a.txt", b"Title\nbody", at(2014, 3, 5, 10, 0, 0));

        let out = runner(&fx).run().expect("pass");
        assert!(!out.target_present);
        assert_eq!(out.processed, 0);
        assert!(out.status_line().is_none());
        assert!(note.exists());
        assert!(!fx.target.exists());
    }

    #[test]
    fn same_day_notes_file_in_reverse_processing_order() {
        let fx = fixture(Some(""));
        write_note(&fx.notes, "1-first.txt", b"First\nhttp://a", at(2014, 3, 5, 9, 0, 0));
        write_note(&fx.notes, "2-second.txt", b"Second\nhttp://b", at(2014, 3, 5, 11, 0, 0));

        let out = runner(&fx).run().expect("pass");
        assert_eq!(out.processed, 2);

        let doc = DatetreeDocument::open(&fx.target, 1).expect("reopen");
        assert_eq!(
            doc.day_entries(NaiveDate::from_ymd_opt(2014, 3, 5).expect("date")),
            vec!["Second".to_string(), "First".to_string()]
        );
    }

    #[test]
    fn every_filed_note_is_removed_and_filed_once() {
        let fx = fixture(Some(""));
        write_note(&fx.notes, "a.txt", b"Alpha\nhttp://a", at(2014, 3, 5, 9, 0, 0));
        write_note(&fx.notes, "b.txt", b"http://b", at(2013, 1, 2, 9, 0, 0));
        let other = write_note(&fx.notes, "keep.md", b"not a note", at(2014, 3, 5, 9, 0, 0));

        let first = runner(&fx).run().expect("first pass");
        assert_eq!(first.scanned, 2);
        assert_eq!(first.processed, 2);
        assert!(other.exists());
        assert!(collect_notes(&fx.notes, "txt").expect("list").is_empty());

        let second = runner(&fx).run().expect("second pass");
        assert_eq!(second.processed, 0);
        assert!(!second.persisted);

        let doc = DatetreeDocument::open(&fx.target, 1).expect("reopen");
        assert_eq!(
            doc.day_entries(NaiveDate::from_ymd_opt(2014, 3, 5).expect("date")),
            vec!["Alpha".to_string()]
        );
        assert_eq!(
            doc.day_entries(NaiveDate::from_ymd_opt(2013, 1, 2).expect("date")),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn malformed_note_is_skipped_and_kept() {
        let fx = fixture(Some(""));
        let bad = write_note(&fx.notes, "bad.txt", &[0xff, 0xfe, 0x00], at(2014, 3, 5, 9, 0, 0));
        let good = write_note(&fx.notes, "good.txt", b"Good\nhttp://ok", at(2014, 3, 5, 9, 0, 0));

        let out = runner(&fx).run().expect("pass");
        assert_eq!(out.processed, 1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].code, ErrorCode::E004MalformedNote);
        assert_eq!(out.skipped[0].path, bad);
        assert!(bad.exists());
        assert!(!good.exists());
        assert!(!out.is_clean());
    }

    #[test]
    fn read_only_target_aborts_without_deleting() {
        let fx = fixture(Some("* 2014\n"));
        let note = write_note(&fx.notes, "a.txt", b"Title\nhttp://x", at(2014, 3, 5, 9, 0, 0));
        let mut perms = fs::metadata(&fx.target).expect("meta").permissions();
        perms.set_readonly(true);
        fs::set_permissions(&fx.target, perms).expect("chmod");

        let err = runner(&fx).run().expect_err("read-only");
        assert!(matches!(err, IngestError::ReadOnlyTarget(_)));
        assert!(note.exists());
        assert_eq!(fs::read_to_string(&fx.target).expect("read"), "* 2014\n");
    }

    #[test]
    fn held_lock_blocks_the_pass() {
        let fx = fixture(Some(""));
        let note = write_note(&fx.notes, "a.txt", b"Title\nhttp://x", at(2014, 3, 5, 9, 0, 0));
        let lock_path = target_lock_path(&fx.target).expect("lock path");
        let resolved = fs::canonicalize(&fx.target).expect("resolve target");
        assert_eq!(lock_path.parent(), resolved.parent());
        let holder = File::create(&lock_path).expect("lock file");
        holder.lock_exclusive().expect("hold lock");

        let err = runner(&fx).run().expect_err("locked");
        assert!(matches!(err, IngestError::Locked(_)));
        assert!(note.exists());
    }

    #[test]
    fn target_inside_note_dir_is_never_ingested() {
        let fx = fixture(None);
        let target = fx.notes.join("journal.txt");
        fs::write(&target, "* 2013\n").expect("write target");
        let note = write_note(&fx.notes, "a.txt", b"Alpha\nhttp://a", at(2014, 3, 5, 9, 0, 0));
        let runner = IngestionRunner::new(
            &fx.notes,
            &target,
            RunnerOptions {
                clock: utc_clock(),
                ..RunnerOptions::default()
            },
        );

        assert_eq!(runner.pending_notes().expect("pending"), vec![note.clone()]);
        let out = runner.run().expect("pass");
        assert_eq!(out.scanned, 1);
        assert_eq!(out.processed, 1);
        assert!(target.exists());
        assert!(!note.exists());

        let doc = DatetreeDocument::open(&target, 1).expect("reopen");
        assert_eq!(
            doc.day_entries(NaiveDate::from_ymd_opt(2014, 3, 5).expect("date")),
            vec!["Alpha".to_string()]
        );
        assert!(doc.day_entries(NaiveDate::from_ymd_opt(2013, 1, 1).expect("date")).is_empty());

        let again = runner.run().expect("second pass");
        assert_eq!(again.scanned, 0);
        assert!(target.exists());
    }

    #[test]
    fn missing_note_dir_is_created() {
        let fx = fixture(Some(""));
        fs::remove_dir_all(&fx.notes).expect("rm notes");
        let out = runner(&fx).run().expect("pass");
        assert!(fx.notes.is_dir());
        assert_eq!(out.scanned, 0);
        assert!(!out.persisted);
    }

    #[test]
    fn load_note_uses_file_stem_and_mtime() {
        let fx = fixture(Some(""));
        let path = write_note(
            &fx.notes,
            "shared-link.txt",
            b"http://example.com/only",
            at(2020, 2, 29, 23, 59, 59),
        );
        let entry = runner(&fx).load_note(&path).expect("load");
        assert_eq!(entry.title, "shared-link");
        assert_eq!(entry.timestamp_label(), "2020-02-29 23:59:59");
        assert!(path.exists());
    }
}
