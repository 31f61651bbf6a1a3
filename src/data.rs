//! CSV ingestion: two read-only in-memory tables loaded once at startup.
//!
//! Failure policy: a source that is missing, unreadable, or lacking the
//! expected columns leaves its table absent. Nothing here fails the caller;
//! everything is absorbed and logged, and downstream chart builders degrade
//! to empty payloads.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::logging::{log, obj, v_str, v_u64, Domain, Level};
use crate::state::Config;

pub const APPLICATION_FILE: &str = "application_data.csv";
pub const PREVIOUS_FILE: &str = "previous_application.csv";

pub const APPLICATION_COLUMNS: [&str; 6] = [
    "TARGET",
    "NAME_CONTRACT_TYPE",
    "CODE_GENDER",
    "AMT_INCOME_TOTAL",
    "AMT_CREDIT",
    "NAME_EDUCATION_TYPE",
];

pub const DECISION_COLUMN: &str = "DAYS_DECISION";

/// One loan application, projected to the columns the dashboard uses.
#[derive(Debug, Clone)]
pub struct ApplicationRow {
    /// Binary outcome: 0 = repaid, 1 = defaulted. None when the field was
    /// missing or non-numeric; consumers decide whether to drop or zero-fill.
    pub target: Option<i64>,
    pub contract_type: String,
    pub gender: String,
    /// Non-numeric values coerced to 0.0 at load.
    pub income_total: f64,
    /// Non-numeric values coerced to 0.0 at load.
    pub credit_amount: f64,
    pub education_type: String,
}

#[derive(Debug, Default)]
pub struct ApplicationTable {
    pub rows: Vec<ApplicationRow>,
}

/// Historical decisions, single column. Rows that failed numeric coercion
/// were dropped entirely rather than zero-filled.
#[derive(Debug, Default)]
pub struct PreviousTable {
    pub days_decision: Vec<f64>,
}

/// Provenance record for one loaded source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub bad_rows: u64,
    pub columns: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at_epoch: u64,
}

/// Both tables for the process lifetime. A table is `None` when its source
/// was absent or failed to load; an empty table means the file parsed but
/// carried no rows.
#[derive(Debug, Default)]
pub struct Tables {
    pub app: Option<ApplicationTable>,
    pub prev: Option<PreviousTable>,
    pub manifests: Vec<DatasetManifest>,
}

impl Tables {
    /// The one load-status signal: is the application table resident in
    /// memory. A file that exists on disk but failed to parse counts as
    /// not loaded.
    pub fn has_application_table(&self) -> bool {
        self.app.is_some()
    }
}

/// Load both sources from `config.data_dir`. Never fails: per-file errors
/// are logged and the corresponding table stays absent.
pub fn load(config: &Config) -> Tables {
    let mut tables = Tables::default();

    let app_path = config.data_path(APPLICATION_FILE);
    if app_path.exists() {
        match read_application(&app_path, config.row_cap) {
            Ok((table, manifest)) => {
                log(
                    Level::Info,
                    Domain::Data,
                    "load.application",
                    obj(&[
                        ("path", v_str(&app_path.display().to_string())),
                        ("rows", v_u64(table.rows.len() as u64)),
                        ("bad_rows", v_u64(manifest.bad_rows)),
                    ]),
                );
                tables.app = Some(table);
                tables.manifests.push(manifest);
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Data,
                    "load.application.failed",
                    obj(&[
                        ("path", v_str(&app_path.display().to_string())),
                        ("error", v_str(&format!("{err:#}"))),
                    ]),
                );
            }
        }
    } else {
        log(
            Level::Warn,
            Domain::Data,
            "load.application.missing",
            obj(&[("path", v_str(&app_path.display().to_string()))]),
        );
    }

    let prev_path = config.data_path(PREVIOUS_FILE);
    if prev_path.exists() {
        match read_previous(&prev_path, config.row_cap) {
            Ok((table, manifest)) => {
                log(
                    Level::Info,
                    Domain::Data,
                    "load.previous",
                    obj(&[
                        ("path", v_str(&prev_path.display().to_string())),
                        ("rows", v_u64(table.days_decision.len() as u64)),
                        ("dropped_rows", v_u64(manifest.bad_rows)),
                    ]),
                );
                tables.prev = Some(table);
                tables.manifests.push(manifest);
            }
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Data,
                    "load.previous.failed",
                    obj(&[
                        ("path", v_str(&prev_path.display().to_string())),
                        ("error", v_str(&format!("{err:#}"))),
                    ]),
                );
            }
        }
    } else {
        log(
            Level::Warn,
            Domain::Data,
            "load.previous.missing",
            obj(&[("path", v_str(&prev_path.display().to_string()))]),
        );
    }

    tables
}

/// Split one CSV line into fields, honoring double-quoted fields so that
/// category names containing commas survive intact. Doubled quotes inside
/// a quoted field unescape to one quote.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn parse_numeric(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Locate each wanted column in the header, by exact name.
fn column_indices(header: &[String], wanted: &[&str]) -> Result<Vec<usize>> {
    wanted
        .iter()
        .map(|name| {
            header
                .iter()
                .position(|h| h.trim() == *name)
                .ok_or_else(|| anyhow!("missing column {}", name))
        })
        .collect()
}

fn read_application(path: &Path, row_cap: usize) -> Result<(ApplicationTable, DatasetManifest)> {
    let hash = file_sha256(path)?;
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| anyhow!("empty file"))?
        .context("reading header")?;
    let header = split_csv_line(&header_line);
    let idx = column_indices(&header, &APPLICATION_COLUMNS)?;
    let max_idx = idx.iter().copied().max().unwrap_or(0);

    let mut rows = Vec::new();
    let mut bad_rows = 0u64;
    let mut data_lines = 0usize;
    let mut warnings = Vec::new();

    for line in lines {
        if data_lines >= row_cap {
            warnings.push(format!("truncated at {} rows", row_cap));
            break;
        }
        let line = line.context("reading data line")?;
        if line.trim().is_empty() {
            continue;
        }
        data_lines += 1;

        let fields = split_csv_line(&line);
        if fields.len() <= max_idx {
            bad_rows += 1;
            continue;
        }

        // Numeric fields zero-fill on coercion failure; target stays
        // optional so each chart can pick drop vs fill.
        rows.push(ApplicationRow {
            target: parse_numeric(&fields[idx[0]]).map(|v| v as i64),
            contract_type: fields[idx[1]].trim().to_string(),
            gender: fields[idx[2]].trim().to_string(),
            income_total: parse_numeric(&fields[idx[3]]).unwrap_or(0.0),
            credit_amount: parse_numeric(&fields[idx[4]]).unwrap_or(0.0),
            education_type: fields[idx[5]].trim().to_string(),
        });
    }

    let manifest = DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count: rows.len() as u64,
        bad_rows,
        columns: APPLICATION_COLUMNS.iter().map(|c| c.to_string()).collect(),
        warnings,
        generated_at_epoch: epoch_now(),
    };

    Ok((ApplicationTable { rows }, manifest))
}

fn read_previous(path: &Path, row_cap: usize) -> Result<(PreviousTable, DatasetManifest)> {
    let hash = file_sha256(path)?;
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| anyhow!("empty file"))?
        .context("reading header")?;
    let header = split_csv_line(&header_line);
    let idx = column_indices(&header, &[DECISION_COLUMN])?[0];

    let mut days_decision = Vec::new();
    let mut bad_rows = 0u64;
    let mut data_lines = 0usize;
    let mut warnings = Vec::new();

    for line in lines {
        if data_lines >= row_cap {
            warnings.push(format!("truncated at {} rows", row_cap));
            break;
        }
        let line = line.context("reading data line")?;
        if line.trim().is_empty() {
            continue;
        }
        data_lines += 1;

        let fields = split_csv_line(&line);
        // Non-numeric decision offsets drop the row entirely.
        match fields.get(idx).and_then(|f| parse_numeric(f)) {
            Some(v) => days_decision.push(v),
            None => bad_rows += 1,
        }
    }

    let manifest = DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count: days_decision.len() as u64,
        bad_rows,
        columns: vec![DECISION_COLUMN.to_string()],
        warnings,
        generated_at_epoch: epoch_now(),
    };

    Ok((PreviousTable { days_decision }, manifest))
}

/// Streaming SHA-256 of a source file, hex-encoded.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).context("reading for hash")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn epoch_now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
