use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::retry::RetryPolicy;

pub const HEADER: [&str; 4] = ["License Plate", "Entry Time", "Exit Time", "Fee"];

/// One CSV row as it appears on disk.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(rename = "License Plate")]
    license_plate: String,
    #[serde(rename = "Entry Time")]
    entry_time: String,
    #[serde(rename = "Exit Time")]
    exit_time: Option<String>,
    #[serde(rename = "Fee")]
    fee: Option<f64>,
}

impl From<&Visit> for LedgerRow {
    fn from(v: &Visit) -> Self {
        Self {
            license_plate: v.license_plate.clone(),
            entry_time: format_timestamp(&v.entry_time),
            exit_time: v.exit_time.as_ref().map(format_timestamp),
            fee: Some(v.fee),
        }
    }
}

/// Empty cells and the usual null spellings all mean "still parked".
fn is_null(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nat") || cell.eq_ignore_ascii_case("nan")
}

fn invalid(line: u64, msg: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("ledger line {line}: {msg}"))
}

impl LedgerRow {
    fn into_visit(self, line: u64) -> io::Result<Visit> {
        let entry_time = parse_timestamp(&self.entry_time)
            .ok_or_else(|| invalid(line, format!("bad entry time {:?}", self.entry_time)))?;
        let exit_time = match self.exit_time {
            Some(ref s) if !is_null(s) => Some(
                parse_timestamp(s).ok_or_else(|| invalid(line, format!("bad exit time {s:?}")))?,
            ),
            _ => None,
        };
        let fee = self.fee.filter(|f| f.is_finite()).unwrap_or(0.0);
        Ok(Visit {
            license_plate: self.license_plate.trim().to_string(),
            entry_time,
            exit_time,
            fee: if exit_time.is_some() { fee } else { 0.0 },
        })
    }
}

/// Atomically replace `path` with `bytes`: write a sibling temp file, fsync,
/// then rename over the target. Parent directories are created as needed.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)
}

/// Encode the full table, header first, in ledger order.
pub fn encode(visits: &[Visit]) -> io::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(HEADER).map_err(io::Error::other)?;
    for v in visits {
        writer.serialize(LedgerRow::from(v)).map_err(io::Error::other)?;
    }
    writer
        .into_inner()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Decode a ledger table. Rows keep file order.
pub fn decode(bytes: &[u8]) -> io::Result<Vec<Visit>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut visits = Vec::new();
    for (idx, row) in reader.deserialize::<LedgerRow>().enumerate() {
        // Header is line 1
        let line = idx as u64 + 2;
        let row = row.map_err(|e| invalid(line, e))?;
        visits.push(row.into_visit(line)?);
    }
    Ok(visits)
}

/// The durable visit table. The file is the source of truth and is
/// rewritten in full on every mutation.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    retry: RetryPolicy,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            path: path.into(),
            retry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Read the ledger. `Ok(None)` when the file does not exist yet.
    pub fn load(&self) -> io::Result<Option<Vec<Visit>>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        decode(&bytes).map(Some)
    }

    /// Rewrite the whole table, retrying transient failures.
    pub fn save(&self, visits: &[Visit]) -> io::Result<()> {
        let bytes = encode(visits)?;
        let start = std::time::Instant::now();
        let result = self.retry.run(|_| replace_file(&self.path, &bytes));
        metrics::histogram!(crate::observability::LEDGER_WRITE_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        result
    }
}
