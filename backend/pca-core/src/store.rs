// src/store.rs
//
// JSON document store under a single data directory. Every document is
// wrapped in a small envelope with write metadata; collections are one
// file each, punch batches and saved reports one file per document.
//
//   <data_dir>/settings.json
//   <data_dir>/holidays.json
//   <data_dir>/adjustments.json
//   <data_dir>/logs/<id>.json
//   <data_dir>/reports/<id>.json

use crate::attendance::{
    Adjustment, AttendanceSettings, PeriodReport, PunchRecord, ReportPeriod,
};
use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_DATA_DIR: &str = "pca_data";

const LOGS_DIR: &str = "logs";
const REPORTS_DIR: &str = "reports";
const SETTINGS_FILE: &str = "settings.json";
const HOLIDAYS_FILE: &str = "holidays.json";
const ADJUSTMENTS_FILE: &str = "adjustments.json";
const DOCUMENT_ID_LEN: usize = 12;

// --- Error Types ---

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Store document is corrupt: {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
}

// --- Document Envelope ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentMetadata {
    saved_at_unix_secs: i64,
    document_type: String,
}

impl DocumentMetadata {
    fn new(document_type: &str) -> Self {
        DocumentMetadata {
            saved_at_unix_secs: Utc::now().timestamp(),
            document_type: document_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument<T> {
    metadata: DocumentMetadata,
    data: T,
}

// --- Stored Collections ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayDoc {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    pub name: String,
}

/// One uploaded punch export, already normalized. Reports always run
/// from these records, never from the raw file again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub id: String,
    pub name: String,
    pub period: ReportPeriod,
    pub row_count: u32,
    pub skipped_rows: u32,
    pub created_at: DateTime<Utc>,
    pub punches: Vec<PunchRecord>,
}

impl LogBatch {
    pub fn info(&self) -> LogBatchInfo {
        LogBatchInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            period: self.period,
            row_count: self.row_count,
            skipped_rows: self.skipped_rows,
            created_at: self.created_at,
        }
    }
}

/// Listing entry without the punch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatchInfo {
    pub id: String,
    pub name: String,
    pub period: ReportPeriod,
    pub row_count: u32,
    pub skipped_rows: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReport {
    pub id: String,
    pub title: String,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub report: PeriodReport,
}

impl SavedReport {
    pub fn info(&self) -> SavedReportInfo {
        SavedReportInfo {
            id: self.id.clone(),
            title: self.title.clone(),
            batch_id: self.batch_id.clone(),
            period: self.report.period,
            employee_count: self.report.summaries.len() as u32,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedReportInfo {
    pub id: String,
    pub title: String,
    pub batch_id: String,
    pub period: ReportPeriod,
    pub employee_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub log_batches: u32,
    pub reports: u32,
    pub holidays: u32,
    pub adjustments: u32,
}

// --- Store ---

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

fn generate_document_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct AttendanceStore {
    config: Arc<StoreConfig>,
    // Serializes read-modify-write cycles on the collection files.
    write_lock: Arc<Mutex<()>>,
}

impl AttendanceStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(config.data_dir.join(LOGS_DIR))?;
        fs::create_dir_all(config.data_dir.join(REPORTS_DIR))?;
        info!("Attendance store ready at {}.", config.data_dir.display());
        Ok(AttendanceStore {
            config: Arc::new(config),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    // --- Primitives ---

    fn read_document<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        match serde_json::from_str::<StoredDocument<T>>(&json) {
            Ok(document) => Ok(Some(document.data)),
            Err(source) => Err(StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn write_document<T: Serialize>(
        &self,
        path: &Path,
        document_type: &str,
        data: &T,
    ) -> Result<(), StoreError> {
        let document = StoredDocument {
            metadata: DocumentMetadata::new(document_type),
            data,
        };
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn settings_path(&self) -> PathBuf {
        self.config.data_dir.join(SETTINGS_FILE)
    }

    fn holidays_path(&self) -> PathBuf {
        self.config.data_dir.join(HOLIDAYS_FILE)
    }

    fn adjustments_path(&self) -> PathBuf {
        self.config.data_dir.join(ADJUSTMENTS_FILE)
    }

    /// Ids come from `generate_document_id`, so anything else in a path
    /// segment is someone probing the filesystem.
    fn document_path(
        &self,
        dir: &str,
        what: &'static str,
        id: &str,
    ) -> Result<PathBuf, StoreError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::NotFound {
                what,
                id: id.to_string(),
            });
        }
        Ok(self.config.data_dir.join(dir).join(format!("{id}.json")))
    }

    // --- Settings ---

    /// Missing document falls back to defaults; a corrupt one surfaces
    /// as an error instead of silently resetting pay rules.
    pub fn load_settings(&self) -> Result<AttendanceSettings, StoreError> {
        match self.read_document::<AttendanceSettings>(&self.settings_path())? {
            Some(settings) => Ok(settings),
            None => {
                info!("No stored settings document, using defaults.");
                Ok(AttendanceSettings::default())
            }
        }
    }

    pub fn save_settings(&self, settings: &AttendanceSettings) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        self.write_document(&self.settings_path(), "settings", settings)
    }

    // --- Holidays ---

    pub fn load_holidays(&self) -> Result<Vec<HolidayDoc>, StoreError> {
        Ok(self
            .read_document(&self.holidays_path())?
            .unwrap_or_default())
    }

    /// The date set the engine consumes, merged into settings at report
    /// time.
    pub fn holiday_dates(&self) -> Result<BTreeSet<NaiveDate>, StoreError> {
        Ok(self.load_holidays()?.into_iter().map(|doc| doc.date).collect())
    }

    pub fn add_holiday(&self, date: NaiveDate, name: &str) -> Result<HolidayDoc, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut holidays: Vec<HolidayDoc> = self
            .read_document(&self.holidays_path())?
            .unwrap_or_default();
        let holiday = HolidayDoc {
            id: generate_document_id(),
            date,
            name: name.trim().to_string(),
        };
        holidays.push(holiday.clone());
        holidays.sort_by_key(|doc| doc.date);
        self.write_document(&self.holidays_path(), "holidays", &holidays)?;
        Ok(holiday)
    }

    pub fn remove_holiday(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut holidays: Vec<HolidayDoc> = self
            .read_document(&self.holidays_path())?
            .unwrap_or_default();
        let before = holidays.len();
        holidays.retain(|doc| doc.id != id);
        if holidays.len() == before {
            return Err(StoreError::NotFound {
                what: "holiday",
                id: id.to_string(),
            });
        }
        self.write_document(&self.holidays_path(), "holidays", &holidays)
    }

    // --- Adjustments ---

    pub fn load_adjustments(&self) -> Result<Vec<Adjustment>, StoreError> {
        Ok(self
            .read_document(&self.adjustments_path())?
            .unwrap_or_default())
    }

    /// Stamps the id and creation time; whatever the caller put there
    /// is replaced.
    pub fn add_adjustment(&self, mut adjustment: Adjustment) -> Result<Adjustment, StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        adjustment.id = generate_document_id();
        adjustment.created_at = Utc::now();
        let mut adjustments: Vec<Adjustment> = self
            .read_document(&self.adjustments_path())?
            .unwrap_or_default();
        adjustments.push(adjustment.clone());
        self.write_document(&self.adjustments_path(), "adjustments", &adjustments)?;
        Ok(adjustment)
    }

    pub fn remove_adjustment(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut adjustments: Vec<Adjustment> = self
            .read_document(&self.adjustments_path())?
            .unwrap_or_default();
        let before = adjustments.len();
        adjustments.retain(|adjustment| adjustment.id != id);
        if adjustments.len() == before {
            return Err(StoreError::NotFound {
                what: "adjustment",
                id: id.to_string(),
            });
        }
        self.write_document(&self.adjustments_path(), "adjustments", &adjustments)
    }

    // --- Punch Batches ---

    pub fn save_log_batch(
        &self,
        name: &str,
        period: ReportPeriod,
        punches: Vec<PunchRecord>,
        skipped_rows: u32,
    ) -> Result<LogBatch, StoreError> {
        let batch = LogBatch {
            id: generate_document_id(),
            name: name.trim().to_string(),
            period,
            row_count: punches.len() as u32,
            skipped_rows,
            created_at: Utc::now(),
            punches,
        };
        let path = self.document_path(LOGS_DIR, "log batch", &batch.id)?;
        let _guard = self.write_lock.lock().unwrap();
        self.write_document(&path, "log_batch", &batch)?;
        Ok(batch)
    }

    pub fn load_log_batch(&self, id: &str) -> Result<LogBatch, StoreError> {
        let path = self.document_path(LOGS_DIR, "log batch", id)?;
        self.read_document(&path)?.ok_or_else(|| StoreError::NotFound {
            what: "log batch",
            id: id.to_string(),
        })
    }

    pub fn list_log_batches(&self) -> Result<Vec<LogBatchInfo>, StoreError> {
        let mut infos = Vec::new();
        for entry in fs::read_dir(self.config.data_dir.join(LOGS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match self.read_document::<LogBatch>(&path) {
                Ok(Some(batch)) => infos.push(batch.info()),
                Ok(None) => {}
                Err(err) => {
                    warn!("Skipping unreadable log batch {}: {}", path.display(), err)
                }
            }
        }
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    pub fn delete_log_batch(&self, id: &str) -> Result<(), StoreError> {
        let path = self.document_path(LOGS_DIR, "log batch", id)?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                what: "log batch",
                id: id.to_string(),
            });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    // --- Saved Reports ---

    pub fn save_report(
        &self,
        title: &str,
        batch_id: &str,
        report: PeriodReport,
    ) -> Result<SavedReport, StoreError> {
        let saved = SavedReport {
            id: generate_document_id(),
            title: title.trim().to_string(),
            batch_id: batch_id.to_string(),
            created_at: Utc::now(),
            report,
        };
        let path = self.document_path(REPORTS_DIR, "report", &saved.id)?;
        let _guard = self.write_lock.lock().unwrap();
        self.write_document(&path, "report", &saved)?;
        Ok(saved)
    }

    pub fn load_report(&self, id: &str) -> Result<SavedReport, StoreError> {
        let path = self.document_path(REPORTS_DIR, "report", id)?;
        self.read_document(&path)?.ok_or_else(|| StoreError::NotFound {
            what: "report",
            id: id.to_string(),
        })
    }

    pub fn list_reports(&self) -> Result<Vec<SavedReportInfo>, StoreError> {
        let mut infos = Vec::new();
        for entry in fs::read_dir(self.config.data_dir.join(REPORTS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match self.read_document::<SavedReport>(&path) {
                Ok(Some(report)) => infos.push(report.info()),
                Ok(None) => {}
                Err(err) => warn!("Skipping unreadable report {}: {}", path.display(), err),
            }
        }
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    pub fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        let path = self.document_path(REPORTS_DIR, "report", id)?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                what: "report",
                id: id.to_string(),
            });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    // --- Heartbeat ---

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            log_batches: self.list_log_batches()?.len() as u32,
            reports: self.list_reports()?.len() as u32,
            holidays: self.load_holidays()?.len() as u32,
            adjustments: self.load_adjustments()?.len() as u32,
        })
    }
}
