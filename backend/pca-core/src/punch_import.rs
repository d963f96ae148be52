// src/punch_import.rs
//
// Turns raw punch-clock CSV exports into normalized PunchRecords.
// Device exports disagree on header spelling and date separators, so
// column resolution runs a fixed rule list and row parsing drops what
// it cannot salvage instead of failing the whole file.

use crate::attendance::{PunchKind, PunchRecord};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

// --- Error Types ---

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV is not readable: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Required column missing: {0}")]
    MissingColumn(&'static str),
    #[error("CSV contained no usable punch rows")]
    NoRows,
}

// --- Column Resolution ---

/// Resolved header indexes. `None` means the rule list matched nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub employee_id: Option<usize>,
    pub employee_name: Option<usize>,
    pub date: Option<usize>,
    pub time: Option<usize>,
    pub kind: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedColumns {
    employee_id: usize,
    employee_name: Option<usize>,
    date: usize,
    time: usize,
    kind: Option<usize>,
}

impl ColumnMap {
    /// Id, date and time are mandatory — without them no row could ever
    /// survive normalization. A missing kind column is tolerated; those
    /// rows carry `Unknown` and surface as open shifts.
    fn require(self) -> Result<ResolvedColumns, ImportError> {
        Ok(ResolvedColumns {
            employee_id: self
                .employee_id
                .ok_or(ImportError::MissingColumn("employee id"))?,
            employee_name: self.employee_name,
            date: self.date.ok_or(ImportError::MissingColumn("date"))?,
            time: self.time.ok_or(ImportError::MissingColumn("time"))?,
            kind: self.kind,
        })
    }
}

fn find_column(headers: &[String], is_match: impl Fn(&str) -> bool) -> Option<usize> {
    headers
        .iter()
        .position(|header| is_match(&header.trim().to_lowercase()))
}

/// Header resolution as a fixed, priority-ordered rule list. Each rule
/// takes the first header it matches, scanning left to right:
///
/// 1. employee id — contains both "employee" and "id"
/// 2. employee name — contains "first" and "name"; failing that, the
///    first header equal to "name"
/// 3. date — equals "date"
/// 4. time — equals "time"
/// 5. kind — contains "punch" or "state"
pub fn resolve_columns(headers: &[String]) -> ColumnMap {
    ColumnMap {
        employee_id: find_column(headers, |h| h.contains("employee") && h.contains("id")),
        employee_name: find_column(headers, |h| h.contains("first") && h.contains("name"))
            .or_else(|| find_column(headers, |h| h == "name")),
        date: find_column(headers, |h| h == "date"),
        time: find_column(headers, |h| h == "time"),
        kind: find_column(headers, |h| h.contains("punch") || h.contains("state")),
    }
}

// --- Row Normalization ---

/// Device exports write `DD-MM-YYYY`, some firmware `DD/MM/YYYY`.
pub fn parse_export_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// State text maps exactly; anything else is an unknown punch that
/// still occupies its slot in the day sequence.
pub fn punch_kind_from_state(raw: &str) -> PunchKind {
    match raw.trim() {
        "Check In" => PunchKind::CheckIn,
        "Check Out" => PunchKind::CheckOut,
        _ => PunchKind::Unknown,
    }
}

pub fn state_text(kind: PunchKind) -> &'static str {
    match kind {
        PunchKind::CheckIn => "Check In",
        PunchKind::CheckOut => "Check Out",
        PunchKind::Unknown => "Unknown",
    }
}

fn normalize_row(row: &csv::StringRecord, cols: &ResolvedColumns) -> Option<PunchRecord> {
    let employee_id = row.get(cols.employee_id)?.trim();
    if employee_id.is_empty() {
        return None;
    }
    let date = parse_export_date(row.get(cols.date)?.trim())?;
    let time = NaiveTime::parse_from_str(row.get(cols.time)?.trim(), "%H:%M").ok()?;

    let employee_name = cols
        .employee_name
        .and_then(|index| row.get(index))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let kind = cols
        .kind
        .and_then(|index| row.get(index))
        .map(punch_kind_from_state)
        .unwrap_or(PunchKind::Unknown);

    Some(PunchRecord {
        employee_id: employee_id.to_string(),
        employee_name,
        date,
        time,
        kind,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub punches: Vec<PunchRecord>,
    pub skipped_rows: u32,
}

/// Parses a raw CSV export. Malformed rows are dropped and counted;
/// only structural problems (unreadable file, missing required columns,
/// nothing salvageable at all) are errors.
pub fn parse_punch_csv(data: &[u8]) -> Result<ImportOutcome, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = resolve_columns(&headers).require()?;

    let mut punches = Vec::new();
    let mut skipped_rows = 0u32;
    for (row_number, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                debug!("Dropping unreadable CSV row {}: {}", row_number + 2, err);
                skipped_rows += 1;
                continue;
            }
        };
        match normalize_row(&row, &columns) {
            Some(punch) => punches.push(punch),
            None => {
                debug!("Dropping malformed punch row {}.", row_number + 2);
                skipped_rows += 1;
            }
        }
    }

    if punches.is_empty() {
        return Err(ImportError::NoRows);
    }
    info!(
        "Parsed punch CSV: {} rows kept, {} skipped.",
        punches.len(),
        skipped_rows
    );
    Ok(ImportOutcome {
        punches,
        skipped_rows,
    })
}

// --- Upload-time Checks & Filters ---

/// A day whose punch count is odd — someone forgot to badge. Flagged at
/// upload time so clerks can chase missing punches before payroll runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDay {
    pub employee_id: String,
    pub date: NaiveDate,
    pub punch_count: u32,
}

pub fn scan_open_days(punches: &[PunchRecord]) -> Vec<OpenDay> {
    let mut counts: BTreeMap<(&str, NaiveDate), u32> = BTreeMap::new();
    for punch in punches {
        *counts
            .entry((punch.employee_id.as_str(), punch.date))
            .or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| count % 2 == 1)
        .map(|((employee_id, date), punch_count)| OpenDay {
            employee_id: employee_id.to_string(),
            date,
            punch_count,
        })
        .collect()
}

/// Clerk-facing row filter: employee substring (id or name, case
/// insensitive) plus an optional date window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PunchFilter {
    pub employee: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl PunchFilter {
    pub fn is_empty(&self) -> bool {
        self.employee.is_none() && self.from.is_none() && self.to.is_none()
    }

    fn matches(&self, punch: &PunchRecord) -> bool {
        if let Some(query) = &self.employee {
            let query = query.to_lowercase();
            let id_hit = punch.employee_id.to_lowercase().contains(&query);
            let name_hit = punch
                .employee_name
                .as_deref()
                .map(|name| name.to_lowercase().contains(&query))
                .unwrap_or(false);
            if !id_hit && !name_hit {
                return false;
            }
        }
        if let Some(from) = self.from {
            if punch.date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if punch.date > to {
                return false;
            }
        }
        true
    }
}

pub fn filter_punches(punches: &[PunchRecord], filter: &PunchFilter) -> Vec<PunchRecord> {
    punches
        .iter()
        .filter(|punch| filter.matches(punch))
        .cloned()
        .collect()
}

// --- Cleaned Re-export ---

pub const CLEAN_EXPORT_HEADERS: [&str; 5] = ["Employee ID", "Name", "Date", "Time", "State"];

/// Renders normalized rows back to CSV with the canonical header set,
/// ready for archiving or re-import.
pub fn write_clean_csv(punches: &[PunchRecord]) -> Result<Vec<u8>, ImportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CLEAN_EXPORT_HEADERS)?;
    for punch in punches {
        let date = punch.date.format("%d-%m-%Y").to_string();
        let time = punch.time.format("%H:%M").to_string();
        writer.write_record([
            punch.employee_id.as_str(),
            punch.employee_name.as_deref().unwrap_or(""),
            date.as_str(),
            time.as_str(),
            state_text(punch.kind),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| ImportError::Io(err.into_error()))
}
