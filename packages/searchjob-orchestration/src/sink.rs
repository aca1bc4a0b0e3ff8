//! Result sinks
//!
//! Rows are CSV records under the header
//! `repository,revisionSpecifier,resolvedRevision`. Each record is encoded in
//! memory first and written with one `write_all` under the sink's lock, so
//! concurrent producers never interleave or truncate each other's rows.

use parking_lot::Mutex;
use searchjob_storage::ResultRow;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

pub const CSV_HEADER: &str = "repository,revisionSpecifier,resolvedRevision";

/// Destination for result rows. Shared by every worker of a pool.
pub trait ResultSink: Send + Sync {
    fn append(&self, row: &ResultRow) -> Result<()>;
}

struct CsvState<W> {
    writer: W,
    rows: usize,
}

/// CSV sink over any writer.
pub struct CsvResultSink<W: Write + Send> {
    state: Mutex<CsvState<W>>,
}

impl<W: Write + Send> CsvResultSink<W> {
    /// Wrap `writer` and emit the header.
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(format!("{}\n", CSV_HEADER).as_bytes())?;
        writer.flush()?;
        Ok(Self::headerless(writer))
    }

    /// Wrap a writer that already holds the header (e.g. a reopened file).
    pub fn headerless(writer: W) -> Self {
        Self {
            state: Mutex::new(CsvState { writer, rows: 0 }),
        }
    }

    /// Rows appended through this sink.
    pub fn rows_written(&self) -> usize {
        self.state.lock().rows
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().writer
    }
}

impl<W: Write + Send> ResultSink for CsvResultSink<W> {
    fn append(&self, row: &ResultRow) -> Result<()> {
        let record = encode_row(row);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state
            .writer
            .write_all(record.as_bytes())
            .map_err(OrchestratorError::sink)?;
        state.writer.flush().map_err(OrchestratorError::sink)?;
        state.rows += 1;
        Ok(())
    }
}

/// One CSV artifact per job at `<dir>/<job_id>.csv`, created on first row.
pub struct JobCsvDirectorySink {
    dir: PathBuf,
    files: Mutex<HashMap<Uuid, Arc<CsvResultSink<File>>>>,
}

impl JobCsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.csv", job_id))
    }

    fn sink_for(&self, job_id: Uuid) -> Result<Arc<CsvResultSink<File>>> {
        let mut files = self.files.lock();
        if let Some(sink) = files.get(&job_id) {
            return Ok(Arc::clone(sink));
        }

        let sink = Arc::new(open_artifact(&self.path_for(job_id))?);
        files.insert(job_id, Arc::clone(&sink));
        Ok(sink)
    }
}

impl ResultSink for JobCsvDirectorySink {
    fn append(&self, row: &ResultRow) -> Result<()> {
        self.sink_for(row.job_id)?.append(row)
    }
}

/// Append to an existing artifact, writing the header only into a new file.
fn open_artifact(path: &Path) -> Result<CsvResultSink<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        CsvResultSink::new(file)
    } else {
        Ok(CsvResultSink::headerless(file))
    }
}

/// Encode one row as a `\n`-terminated record.
pub fn encode_row(row: &ResultRow) -> String {
    format!(
        "{},{},{}\n",
        escape_field(&row.repository),
        escape_field(&row.revision_specifier),
        escape_field(&row.resolved_revision)
    )
}

// RFC 4180: quote when needed, double embedded quotes
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(repo: &str, spec: &str, rev: &str) -> ResultRow {
        ResultRow {
            job_id: Uuid::nil(),
            repository: repo.to_string(),
            revision_specifier: spec.to_string(),
            resolved_revision: rev.to_string(),
        }
    }

    /// Minimal RFC 4180 record splitter for assertions.
    fn parse_records(text: &str) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match (quoted, c) {
                (true, '"') if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                (true, '"') => quoted = false,
                (true, c) => field.push(c),
                (false, '"') => quoted = true,
                (false, ',') => record.push(std::mem::take(&mut field)),
                (false, '\n') => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                (false, c) => field.push(c),
            }
        }
        records
    }

    #[test]
    fn test_header_then_rows() {
        let sink = CsvResultSink::new(Vec::new()).unwrap();
        sink.append(&row("repoa", "rev1", "c1")).unwrap();
        sink.append(&row("repob", "rev3", "c3")).unwrap();
        assert_eq!(sink.rows_written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "repository,revisionSpecifier,resolvedRevision\nrepoa,rev1,c1\nrepob,rev3,c3\n"
        );
    }

    #[test]
    fn test_fields_are_quoted_when_needed() {
        assert_eq!(
            encode_row(&row("a,b", "say \"hi\"", "x\ny")),
            "\"a,b\",\"say \"\"hi\"\"\",\"x\ny\"\n"
        );
    }

    #[test]
    fn test_concurrent_producers_write_whole_rows() {
        const PRODUCERS: usize = 8;
        const ROWS: usize = 250;

        let sink = CsvResultSink::new(Vec::new()).unwrap();
        std::thread::scope(|scope| {
            for p in 0..PRODUCERS {
                let sink = &sink;
                scope.spawn(move || {
                    for r in 0..ROWS {
                        let repo = format!("repo-{}", p);
                        let rev = format!("{:040}", r);
                        sink.append(&row(&repo, "*refs/heads/*", &rev)).unwrap();
                    }
                });
            }
        });

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + PRODUCERS * ROWS);
        assert_eq!(lines[0], CSV_HEADER);
        for line in &lines[1..] {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3, "torn row {:?}", line);
            assert!(fields[0].starts_with("repo-"));
            assert_eq!(fields[2].len(), 40);
        }
    }

    #[test]
    fn test_directory_sink_writes_one_artifact_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JobCsvDirectorySink::new(dir.path().join("artifacts")).unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        for (job, rev) in [(a, "c1"), (b, "c2"), (a, "c3")] {
            let mut r = row("repoa", "main", rev);
            r.job_id = job;
            sink.append(&r).unwrap();
        }

        let text = std::fs::read_to_string(sink.path_for(a)).unwrap();
        assert_eq!(text, format!("{}\nrepoa,main,c1\nrepoa,main,c3\n", CSV_HEADER));
        let text = std::fs::read_to_string(sink.path_for(b)).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_reopened_artifact_keeps_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let job = Uuid::new_v4();
        for rev in ["c1", "c2"] {
            let sink = JobCsvDirectorySink::new(dir.path()).unwrap();
            let mut r = row("repoa", "main", rev);
            r.job_id = job;
            sink.append(&r).unwrap();
        }

        let text = std::fs::read_to_string(dir.path().join(format!("{}.csv", job))).unwrap();
        assert_eq!(text.matches(CSV_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    proptest! {
        #[test]
        fn prop_encoded_row_is_one_record(
            repo in "[a-z0-9/,\"]{1,16}",
            spec in "[a-z0-9*!:\"\n]{1,16}",
            rev in "[0-9a-f]{1,40}",
        ) {
            let encoded = encode_row(&row(&repo, &spec, &rev));
            prop_assert!(encoded.ends_with('\n'));
            let records = parse_records(&encoded);
            prop_assert_eq!(records.len(), 1);
            prop_assert_eq!(&records[0], &vec![repo.clone(), spec.clone(), rev.clone()]);
        }
    }
}
