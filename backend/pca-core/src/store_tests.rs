// src/store_tests.rs

#[cfg(test)]
mod tests {
    use crate::attendance::{
        Adjustment, AdjustmentKind, AdjustmentScope, AttendanceSettings, PeriodReport, PunchKind,
        PunchRecord, ReportPeriod,
    };
    use crate::store::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal_macros::dec;
    use std::fs;
    use std::path::PathBuf;

    /// Store rooted in a per-test temp dir, removed on drop.
    struct TempStore {
        dir: PathBuf,
        store: AttendanceStore,
    }

    impl TempStore {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "pca-store-{}-{}",
                tag,
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            let store = AttendanceStore::new(StoreConfig {
                data_dir: dir.clone(),
            })
            .expect("store init");
            TempStore { dir, store }
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").expect("valid date in test")
    }

    fn punch(employee_id: &str, date: &str, time: &str, kind: PunchKind) -> PunchRecord {
        PunchRecord {
            employee_id: employee_id.to_string(),
            employee_name: None,
            date: d(date),
            time: NaiveTime::parse_from_str(time, "%H:%M").expect("valid time in test"),
            kind,
        }
    }

    fn january() -> ReportPeriod {
        ReportPeriod::new(d("2024-01-01"), d("2024-01-31")).expect("period")
    }

    // --- Settings ---

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let temp = TempStore::new("settings-default");
        let settings = temp.store.load_settings().expect("load");
        assert_eq!(settings, AttendanceSettings::default());
    }

    #[test]
    fn settings_round_trip() {
        let temp = TempStore::new("settings-roundtrip");
        let mut settings = AttendanceSettings {
            normal_shift_hours: dec!(8),
            transport_allowance: dec!(3.5),
            ..AttendanceSettings::default()
        };
        settings.holidays.insert(d("2024-12-25"));

        temp.store.save_settings(&settings).expect("save");
        let loaded = temp.store.load_settings().expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn corrupt_settings_document_is_an_explicit_error() {
        let temp = TempStore::new("settings-corrupt");
        fs::write(temp.dir.join("settings.json"), "{ not json").expect("write garbage");

        let err = temp.store.load_settings().expect_err("must fail");
        assert!(
            matches!(err, StoreError::Corrupt { .. }),
            "expected Corrupt, got {err:?}"
        );
    }

    // --- Holidays ---

    #[test]
    fn holidays_add_list_and_remove() {
        let temp = TempStore::new("holidays");
        let christmas = temp
            .store
            .add_holiday(d("2024-12-25"), "Christmas")
            .expect("add");
        temp.store
            .add_holiday(d("2024-01-01"), "  New Year  ")
            .expect("add");

        let holidays = temp.store.load_holidays().expect("list");
        assert_eq!(holidays.len(), 2);
        // Kept sorted by date, names trimmed.
        assert_eq!(holidays[0].name, "New Year");
        assert_eq!(holidays[1].id, christmas.id);

        let dates = temp.store.holiday_dates().expect("dates");
        assert!(dates.contains(&d("2024-12-25")));

        temp.store.remove_holiday(&christmas.id).expect("remove");
        assert_eq!(temp.store.load_holidays().expect("list").len(), 1);

        let err = temp.store.remove_holiday("nosuchid9999").expect_err("gone");
        assert!(matches!(err, StoreError::NotFound { what: "holiday", .. }));
    }

    // --- Adjustments ---

    #[test]
    fn add_adjustment_stamps_id_and_creation_time() {
        let temp = TempStore::new("adjustments");
        let draft = Adjustment {
            id: "caller-supplied".to_string(),
            scope: AdjustmentScope::Employee,
            employee_id: Some("E1".to_string()),
            date: None,
            kind: AdjustmentKind::AddHours,
            hours: dec!(5),
            reason: Some("missed badge".to_string()),
            created_at: Utc::now(),
        };

        let stored = temp.store.add_adjustment(draft).expect("add");
        assert_eq!(stored.id.len(), 12);
        assert!(stored.id.chars().all(|c| c.is_ascii_alphanumeric()));

        let all = temp.store.load_adjustments().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], stored);

        temp.store.remove_adjustment(&stored.id).expect("remove");
        assert!(temp.store.load_adjustments().expect("list").is_empty());
    }

    // --- Punch Batches ---

    #[test]
    fn log_batch_save_load_list_delete() {
        let temp = TempStore::new("batches");
        let punches = vec![
            punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "18:00", PunchKind::CheckOut),
        ];

        let batch = temp
            .store
            .save_log_batch("  january upload ", january(), punches.clone(), 3)
            .expect("save");
        assert_eq!(batch.name, "january upload");
        assert_eq!(batch.row_count, 2);
        assert_eq!(batch.skipped_rows, 3);

        let loaded = temp.store.load_log_batch(&batch.id).expect("load");
        assert_eq!(loaded.punches, punches);

        let infos = temp.store.list_log_batches().expect("list");
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0], batch.info());

        temp.store.delete_log_batch(&batch.id).expect("delete");
        let err = temp.store.load_log_batch(&batch.id).expect_err("gone");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn path_probing_ids_read_as_not_found() {
        let temp = TempStore::new("probing");
        for id in ["../settings", "..", "a/b", ""] {
            let err = temp.store.load_log_batch(id).expect_err("must fail");
            assert!(
                matches!(err, StoreError::NotFound { .. }),
                "expected NotFound for {id:?}, got {err:?}"
            );
        }
    }

    // --- Saved Reports ---

    #[test]
    fn report_save_list_and_load() {
        let temp = TempStore::new("reports");
        let report = PeriodReport {
            period: january(),
            summaries: Vec::new(),
        };

        let saved = temp
            .store
            .save_report("Attendance January", "batch123", report)
            .expect("save");

        let infos = temp.store.list_reports().expect("list");
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].title, "Attendance January");
        assert_eq!(infos[0].batch_id, "batch123");
        assert_eq!(infos[0].employee_count, 0);

        let loaded = temp.store.load_report(&saved.id).expect("load");
        assert_eq!(loaded, saved);

        temp.store.delete_report(&saved.id).expect("delete");
        assert!(temp.store.list_reports().expect("list").is_empty());
    }

    // --- Heartbeat ---

    #[test]
    fn stats_count_every_collection() {
        let temp = TempStore::new("stats");
        temp.store
            .add_holiday(d("2024-12-25"), "Christmas")
            .expect("holiday");
        temp.store
            .save_log_batch(
                "batch",
                january(),
                vec![punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn)],
                0,
            )
            .expect("batch");

        let stats = temp.store.stats().expect("stats");
        assert_eq!(stats.holidays, 1);
        assert_eq!(stats.log_batches, 1);
        assert_eq!(stats.reports, 0);
        assert_eq!(stats.adjustments, 0);
    }
}
