//! CSV export of the readings table
//!
//! The CSV goes to a temporary file next to the destination and is moved into
//! place only once fully written, so a failed export never leaves a partial
//! file behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reading::SensorReading;
use crate::store::Store;

/// Header row, in `store::COLUMNS` order
pub const HEADERS: [&str; 12] = [
    "ID",
    "Time",
    "Temp (C)",
    "Hum (%)",
    "Press (hPa)",
    "Gas (kOhm)",
    "Air Quality (%)",
    "Dist (mm)",
    "Lat",
    "Lon",
    "Alt (m)",
    "SD Status (1=OK)",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Database file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("The database is empty, no data yet")]
    Empty,

    #[error("Table structure mismatch: {0}")]
    SchemaMismatch(#[source] rusqlite::Error),

    #[error("Cannot write {}: the file is locked or not writable", .path.display())]
    OutputLocked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    /// Warnings end the export without a file but are not failures
    pub fn is_warning(&self) -> bool {
        matches!(self, ExportError::Empty)
    }

    /// What the user should do about it
    pub fn hint(&self) -> Option<String> {
        match self {
            ExportError::NotFound(_) => {
                Some("Run `sensorlog collect` first to collect some data before exporting.".to_string())
            }
            ExportError::SchemaMismatch(_) => {
                Some("Delete the old database file and collect new data.".to_string())
            }
            ExportError::OutputLocked { path, .. } => Some(format!(
                "Is '{}' open in Excel or another program? Close it, then run the export again.",
                path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            )),
            _ => None,
        }
    }
}

/// Trait for rows that know their CSV shape
pub trait CsvRecord {
    fn headers() -> Vec<&'static str>;
    fn to_csv(&self) -> Vec<String>;
}

impl CsvRecord for SensorReading {
    fn headers() -> Vec<&'static str> {
        HEADERS.to_vec()
    }

    fn to_csv(&self) -> Vec<String> {
        let e = &self.event;
        vec![
            self.id.to_string(),
            self.receive_time.clone(),
            format_real(e.temp),
            format_real(e.hum),
            format_real(e.press),
            format_real(e.gas),
            format_real(e.aq),
            e.dist.to_string(),
            format_real(e.lat),
            format_real(e.lon),
            format_real(e.alt),
            e.sd.to_string(),
        ]
    }
}

/// REAL columns always show a decimal point (`0.0`, not `0`), and
/// exponents carry a sign and two digits (`1e+20`, `1.5e-07`)
fn format_real(value: f64) -> String {
    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}

/// Export every stored reading in `db_path` to `csv_path`.
///
/// Returns the number of data rows written. Any existing file at `csv_path`
/// is replaced.
pub fn export(db_path: &Path, csv_path: &Path) -> Result<usize, ExportError> {
    if !db_path.exists() {
        return Err(ExportError::NotFound(db_path.to_path_buf()));
    }

    let store = Store::open_read_only(db_path)?;
    let readings = store.readings().map_err(classify_query_error)?;
    drop(store);

    if readings.is_empty() {
        return Err(ExportError::Empty);
    }

    log::debug!("Read {} rows from {}", readings.len(), db_path.display());

    write_csv(&readings, csv_path)?;

    log::info!("Exported {} rows to {}", readings.len(), csv_path.display());
    Ok(readings.len())
}

fn classify_query_error(err: rusqlite::Error) -> ExportError {
    // "no such table" / "no such column" both surface as a prepare failure
    let schema_problem = match &err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.contains("no such"),
        _ => false,
    };

    if schema_problem {
        ExportError::SchemaMismatch(err)
    } else {
        ExportError::Database(err)
    }
}

fn write_csv(readings: &[SensorReading], csv_path: &Path) -> Result<(), ExportError> {
    let target = resolve_destination(csv_path);
    let existing = match fs::metadata(&target) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(locked_or_io(csv_path, e)),
    };
    if let Some(meta) = &existing
        && meta.is_file()
        && meta.permissions().readonly()
    {
        return Err(ExportError::OutputLocked {
            path: csv_path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "destination is read-only"),
        });
    }

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| locked_or_io(csv_path, e))?;

    let mut tmp = temp_file_in(&dir).map_err(|e| locked_or_io(csv_path, e))?;
    {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(tmp.as_file_mut());
        wtr.write_record(SensorReading::headers())?;
        for reading in readings {
            wtr.write_record(reading.to_csv())?;
        }
        wtr.flush()?;
    }
    tmp.as_file_mut().flush()?;

    // A replaced file keeps its mode
    if let Some(meta) = existing.filter(|m| m.is_file()) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| locked_or_io(csv_path, e))?;
    }

    tmp.persist(&target).map_err(|e| locked_or_io(csv_path, e.error))?;
    Ok(())
}

/// Follow a symlinked destination so the link itself survives the rename
fn resolve_destination(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// New exports get the mode a plain create would: 0o666 less the umask
#[cfg(unix)]
fn temp_file_in(dir: &Path) -> io::Result<tempfile::NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn temp_file_in(dir: &Path) -> io::Result<tempfile::NamedTempFile> {
    tempfile::NamedTempFile::new_in(dir)
}

fn locked_or_io(path: &Path, err: io::Error) -> ExportError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        ExportError::OutputLocked {
            path: path.to_path_buf(),
            source: err,
        }
    } else {
        ExportError::Io(err)
    }
}
