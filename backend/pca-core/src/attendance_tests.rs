// src/attendance_tests.rs

#[cfg(test)]
mod tests {
    use crate::attendance::*;
    use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    // --- Helpers ---

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").expect("valid date in test")
    }

    fn t(time_str: &str) -> NaiveTime {
        NaiveTime::parse_from_str(time_str, "%H:%M").expect("valid time in test")
    }

    fn ts(stamp: &str) -> DateTime<Utc> {
        stamp.parse().expect("valid timestamp in test")
    }

    fn punch(employee_id: &str, date: &str, time: &str, kind: PunchKind) -> PunchRecord {
        PunchRecord {
            employee_id: employee_id.to_string(),
            employee_name: None,
            date: d(date),
            time: t(time),
            kind,
        }
    }

    fn named_punch(
        employee_id: &str,
        name: &str,
        date: &str,
        time: &str,
        kind: PunchKind,
    ) -> PunchRecord {
        let mut p = punch(employee_id, date, time, kind);
        p.employee_name = Some(name.to_string());
        p
    }

    fn period(start: &str, end: &str) -> ReportPeriod {
        ReportPeriod::new(d(start), d(end)).expect("valid period in test")
    }

    fn adjustment(
        scope: AdjustmentScope,
        employee_id: Option<&str>,
        date: Option<&str>,
        kind: AdjustmentKind,
        hours: Decimal,
    ) -> Adjustment {
        Adjustment {
            id: String::new(),
            scope,
            employee_id: employee_id.map(str::to_string),
            date: date.map(d),
            kind,
            hours,
            reason: None,
            created_at: ts("2024-01-01T00:00:00Z"),
        }
    }

    /// In/out pair on a plain weekday (2024-01-02 was a Tuesday).
    fn plain_shift(employee_id: &str, start: &str, end: &str) -> Vec<PunchRecord> {
        vec![
            punch(employee_id, "2024-01-02", start, PunchKind::CheckIn),
            punch(employee_id, "2024-01-02", end, PunchKind::CheckOut),
        ]
    }

    fn summarize(
        punches: &[PunchRecord],
        settings: &AttendanceSettings,
        adjustments: &[Adjustment],
    ) -> PeriodReport {
        let period = detect_period(punches).expect("punches in test");
        summarize_period(punches, settings, adjustments, period).expect("report in test")
    }

    // --- Shift pairing ---

    #[test]
    fn adjacent_in_out_closes_one_interval() {
        let day = plain_shift("E1", "08:00", "18:00");
        let pairing = pair_day_punches(d("2024-01-02"), &day);

        assert_eq!(pairing.intervals.len(), 1);
        assert_eq!(pairing.open_punches, 0);
        assert_eq!(pairing.intervals[0].duration_hours(), dec!(10));
    }

    #[test]
    fn double_check_in_flags_first_and_pairs_rest() {
        let day = vec![
            punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "09:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "17:00", PunchKind::CheckOut),
        ];
        let pairing = pair_day_punches(d("2024-01-02"), &day);

        // The scan is non-greedy: the 08:00 check-in never reaches past
        // the adjacent punch, so only 09:00→17:00 closes.
        assert_eq!(pairing.open_punches, 1);
        assert_eq!(pairing.intervals.len(), 1);
        assert_eq!(pairing.intervals[0].duration_hours(), dec!(8));
    }

    #[test]
    fn leading_check_out_is_a_single_open_flag() {
        let day = vec![
            punch("E1", "2024-01-02", "06:00", PunchKind::CheckOut),
            punch("E1", "2024-01-02", "09:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "17:00", PunchKind::CheckOut),
        ];
        let pairing = pair_day_punches(d("2024-01-02"), &day);

        assert_eq!(pairing.open_punches, 1);
        assert_eq!(pairing.intervals.len(), 1);
    }

    #[test]
    fn unknown_punches_never_pair() {
        let day = vec![
            punch("E1", "2024-01-02", "08:00", PunchKind::Unknown),
            punch("E1", "2024-01-02", "17:00", PunchKind::Unknown),
        ];
        let pairing = pair_day_punches(d("2024-01-02"), &day);

        assert_eq!(pairing.open_punches, 2);
        assert!(pairing.intervals.is_empty());
    }

    #[test]
    fn equal_times_keep_arrival_order_and_pair() {
        // Device double-punch: in and out stamped the same minute. The
        // stable sort keeps arrival order, so they pair to a zero-length
        // interval instead of two open flags.
        let day = vec![
            punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "08:00", PunchKind::CheckOut),
        ];
        let pairing = pair_day_punches(d("2024-01-02"), &day);

        assert_eq!(pairing.open_punches, 0);
        assert_eq!(pairing.intervals.len(), 1);
        assert_eq!(pairing.intervals[0].duration_hours(), Decimal::ZERO);
    }

    #[test]
    fn checkout_before_checkin_rolls_to_next_day() {
        let interval = ShiftInterval::from_pair(d("2024-01-02"), t("22:00"), t("06:00"));
        assert_eq!(interval.duration_hours(), dec!(8));

        let same_day = ShiftInterval::from_pair(d("2024-01-02"), t("08:00"), t("18:00"));
        assert_eq!(same_day.duration_hours(), dec!(10));
    }

    // --- Hour classification ---

    #[test]
    fn overnight_shift_fills_the_whole_night_window() {
        let settings = AttendanceSettings::default();
        let interval = ShiftInterval::from_pair(d("2024-01-02"), t("22:00"), t("06:00"));
        let buckets = classify_interval(&interval, d("2024-01-02"), &settings);

        assert_eq!(buckets.night, dec!(8));
        assert_eq!(buckets.normal, dec!(8));
        assert_eq!(buckets.overtime, Decimal::ZERO);
    }

    #[test]
    fn evening_shift_overlaps_the_window_partially() {
        let settings = AttendanceSettings::default();
        let interval = ShiftInterval::from_pair(d("2024-01-02"), t("20:00"), t("23:30"));
        let buckets = classify_interval(&interval, d("2024-01-02"), &settings);

        assert_eq!(buckets.night, dec!(1.5));
    }

    #[test]
    fn day_shift_has_zero_night_hours() {
        let settings = AttendanceSettings::default();
        let interval = ShiftInterval::from_pair(d("2024-01-02"), t("08:00"), t("17:00"));
        let buckets = classify_interval(&interval, d("2024-01-02"), &settings);

        assert_eq!(buckets.night, Decimal::ZERO);
    }

    #[test]
    fn night_hours_never_exceed_duration_or_go_negative() {
        let settings = AttendanceSettings::default();
        let shifts = [
            ("06:00", "14:00"),
            ("14:00", "22:30"),
            ("21:00", "23:00"),
            ("22:00", "06:00"),
            ("23:00", "23:30"),
        ];
        for (start, end) in shifts {
            let interval = ShiftInterval::from_pair(d("2024-01-02"), t(start), t(end));
            let buckets = classify_interval(&interval, d("2024-01-02"), &settings);
            assert!(
                buckets.night >= Decimal::ZERO,
                "night went negative for {start}-{end}"
            );
            assert!(
                buckets.night <= interval.duration_hours(),
                "night exceeded duration for {start}-{end}"
            );
        }
    }

    #[test]
    fn night_window_within_one_day_does_not_roll() {
        let settings = AttendanceSettings {
            night_start: t("00:00"),
            night_end: t("05:00"),
            ..AttendanceSettings::default()
        };
        let interval = ShiftInterval::from_pair(d("2024-01-02"), t("03:00"), t("09:00"));
        let buckets = classify_interval(&interval, d("2024-01-02"), &settings);

        assert_eq!(buckets.night, dec!(2));
    }

    #[test]
    fn overtime_splits_at_the_normal_shift_threshold() {
        let settings = AttendanceSettings::default();

        let long = ShiftInterval::from_pair(d("2024-01-02"), t("06:00"), t("18:00"));
        let buckets = classify_interval(&long, d("2024-01-02"), &settings);
        assert_eq!(buckets.normal, dec!(10));
        assert_eq!(buckets.overtime, dec!(2));

        let short = ShiftInterval::from_pair(d("2024-01-02"), t("08:00"), t("14:00"));
        let buckets = classify_interval(&short, d("2024-01-02"), &settings);
        assert_eq!(buckets.normal, dec!(6));
        assert_eq!(buckets.overtime, Decimal::ZERO);
    }

    #[test]
    fn holiday_sunday_shift_lands_fully_in_both_buckets() {
        // 2024-01-07 was a Sunday.
        let mut settings = AttendanceSettings::default();
        settings.holidays.insert(d("2024-01-07"));

        let interval = ShiftInterval::from_pair(d("2024-01-07"), t("08:00"), t("18:00"));
        let buckets = classify_interval(&interval, d("2024-01-07"), &settings);

        assert_eq!(buckets.sunday, dec!(10));
        assert_eq!(buckets.holiday, dec!(10));
        assert_eq!(buckets.normal, dec!(10), "buckets overlap, they do not split");
    }

    // --- Full aggregation ---

    #[test]
    fn plain_ten_hour_shift_is_all_normal() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let report = summarize(&punches, &AttendanceSettings::default(), &[]);

        assert_eq!(report.summaries.len(), 1);
        let summary = &report.summaries[0];
        assert_eq!(summary.hours.normal, dec!(10));
        assert_eq!(summary.hours.overtime, Decimal::ZERO);
        assert_eq!(summary.hours.night, Decimal::ZERO);
        assert_eq!(summary.hours.holiday, Decimal::ZERO);
        assert_eq!(summary.hours.sunday, Decimal::ZERO);
        assert_eq!(summary.transport, Decimal::ZERO);
        assert_eq!(summary.attendance, Decimal::ZERO);
        assert_eq!(summary.open_shifts, 0);
    }

    #[test]
    fn lone_check_in_is_one_open_shift_with_zero_hours() {
        let punches = vec![punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn)];
        let report = summarize(&punches, &AttendanceSettings::default(), &[]);

        let summary = &report.summaries[0];
        assert_eq!(summary.open_shifts, 1);
        assert_eq!(summary.hours, HourBuckets::default());
        assert!(summary.days[&d("2024-01-02")].is_open());
    }

    #[test]
    fn rerunning_the_same_input_is_deterministic() {
        // Arrival order deliberately scrambled across employees and days.
        let punches = vec![
            punch("E2", "2024-01-03", "17:00", PunchKind::CheckOut),
            named_punch("E1", "Asha", "2024-01-02", "08:00", PunchKind::CheckIn),
            punch("E2", "2024-01-03", "09:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "18:00", PunchKind::CheckOut),
            punch("E1", "2024-01-03", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-03", "18:30", PunchKind::CheckOut),
        ];
        let settings = AttendanceSettings::default();

        let first = summarize(&punches, &settings, &[]);
        let second = summarize(&punches, &settings, &[]);
        assert_eq!(first, second);

        // Re-sorting an already-sorted day changes nothing either.
        let mut sorted = punches.clone();
        sorted.sort_by_key(|p| (p.employee_id.clone(), p.date, p.time));
        let third = summarize(&sorted, &settings, &[]);
        assert_eq!(first, third);

        assert_eq!(first.summaries.len(), 2);
        assert_eq!(first.summaries[0].employee_id, "E1");
        assert_eq!(first.summaries[0].display_name(), "Asha");
        assert_eq!(first.summaries[1].employee_id, "E2");
    }

    #[test]
    fn empty_input_is_an_explicit_error() {
        let result = summarize_period(
            &[],
            &AttendanceSettings::default(),
            &[],
            period("2024-01-01", "2024-01-31"),
        );
        assert_eq!(result, Err(ReportError::NoPunches));
    }

    #[test]
    fn inverted_period_is_rejected() {
        let result = ReportPeriod::new(d("2024-02-01"), d("2024-01-01"));
        assert!(matches!(result, Err(ReportError::InvalidPeriod { .. })));
    }

    #[test]
    fn detect_period_spans_min_to_max_date() {
        let punches = vec![
            punch("E1", "2024-01-15", "08:00", PunchKind::CheckIn),
            punch("E2", "2024-01-03", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-28", "18:00", PunchKind::CheckOut),
        ];
        let detected = detect_period(&punches).expect("non-empty");
        assert_eq!(detected, period("2024-01-03", "2024-01-28"));
        assert!(detect_period(&[]).is_none());
    }

    #[test]
    fn punches_outside_the_window_never_influence_totals() {
        let mut punches = plain_shift("E1", "08:00", "18:00");
        // Same employee a month later, plus another employee entirely
        // outside the window.
        punches.push(punch("E1", "2024-02-10", "08:00", PunchKind::CheckIn));
        punches.push(punch("E1", "2024-02-10", "18:00", PunchKind::CheckOut));
        punches.extend(plain_shift("E9", "08:00", "12:00").into_iter().map(|mut p| {
            p.date = d("2023-12-20");
            p
        }));

        let report = summarize_period(
            &punches,
            &AttendanceSettings::default(),
            &[],
            period("2024-01-01", "2024-01-31"),
        )
        .expect("report");

        assert_eq!(report.summaries.len(), 1, "out-of-window employee must not appear");
        assert_eq!(report.summaries[0].hours.normal, dec!(10));
        assert_eq!(report.summaries[0].days.len(), 1);
    }

    // --- Allowances ---

    fn allowance_settings(basis: AllowanceBasis) -> AttendanceSettings {
        AttendanceSettings {
            transport_allowance: dec!(3),
            attendance_allowance: dec!(2),
            allowance_basis: basis,
            ..AttendanceSettings::default()
        }
    }

    fn split_shift_day() -> Vec<PunchRecord> {
        vec![
            punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "12:00", PunchKind::CheckOut),
            punch("E1", "2024-01-02", "13:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "17:00", PunchKind::CheckOut),
        ]
    }

    #[test]
    fn per_day_allowance_accrues_once_for_a_split_shift() {
        let report = summarize(&split_shift_day(), &allowance_settings(AllowanceBasis::PerDay), &[]);
        let summary = &report.summaries[0];
        assert_eq!(summary.transport, dec!(3));
        assert_eq!(summary.attendance, dec!(2));
    }

    #[test]
    fn per_interval_allowance_accrues_per_closed_interval() {
        let report = summarize(
            &split_shift_day(),
            &allowance_settings(AllowanceBasis::PerInterval),
            &[],
        );
        let summary = &report.summaries[0];
        assert_eq!(summary.transport, dec!(6));
        assert_eq!(summary.attendance, dec!(4));
    }

    #[test]
    fn open_only_days_earn_no_allowance() {
        let punches = vec![punch("E1", "2024-01-02", "08:00", PunchKind::CheckIn)];
        let report = summarize(&punches, &allowance_settings(AllowanceBasis::PerDay), &[]);
        assert_eq!(report.summaries[0].transport, Decimal::ZERO);
        assert_eq!(report.summaries[0].attendance, Decimal::ZERO);
    }

    // --- Adjustments ---

    #[test]
    fn undated_global_add_reaches_every_employee() {
        let mut punches = plain_shift("E1", "08:00", "18:00");
        punches.extend(plain_shift("E2", "08:00", "14:00"));
        let adjustments = vec![adjustment(
            AdjustmentScope::Global,
            None,
            None,
            AdjustmentKind::AddHours,
            dec!(5),
        )];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(15));
        assert_eq!(report.summaries[1].hours.normal, dec!(11));
    }

    #[test]
    fn dated_adjustment_outside_the_period_changes_nothing() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let adjustments = vec![adjustment(
            AdjustmentScope::Employee,
            Some("E1"),
            Some("2024-03-15"),
            AdjustmentKind::SubtractHours,
            dec!(2),
        )];

        let report = summarize_period(
            &punches,
            &AttendanceSettings::default(),
            &adjustments,
            period("2024-01-01", "2024-01-31"),
        )
        .expect("report");
        assert_eq!(report.summaries[0].hours.normal, dec!(10));
    }

    #[test]
    fn dated_adjustment_inside_the_period_applies() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let adjustments = vec![adjustment(
            AdjustmentScope::Employee,
            Some("E1"),
            Some("2024-01-02"),
            AdjustmentKind::SubtractHours,
            dec!(2),
        )];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(8));
    }

    #[test]
    fn employee_adjustment_leaves_other_employees_alone() {
        let mut punches = plain_shift("E1", "08:00", "18:00");
        punches.extend(plain_shift("E2", "08:00", "18:00"));
        let adjustments = vec![adjustment(
            AdjustmentScope::Employee,
            Some("E2"),
            None,
            AdjustmentKind::AddHours,
            dec!(4),
        )];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(10));
        assert_eq!(report.summaries[1].hours.normal, dec!(14));
    }

    #[test]
    fn override_replaces_the_accumulated_total() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let adjustments = vec![adjustment(
            AdjustmentScope::Employee,
            Some("E1"),
            None,
            AdjustmentKind::OverrideHours,
            dec!(40),
        )];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(40));
    }

    #[test]
    fn deltas_apply_on_top_of_an_override() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let adjustments = vec![
            adjustment(
                AdjustmentScope::Employee,
                Some("E1"),
                None,
                AdjustmentKind::OverrideHours,
                dec!(40),
            ),
            adjustment(
                AdjustmentScope::Global,
                None,
                None,
                AdjustmentKind::AddHours,
                dec!(5),
            ),
        ];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(45));
    }

    #[test]
    fn latest_override_wins() {
        let punches = plain_shift("E1", "08:00", "18:00");
        let mut early = adjustment(
            AdjustmentScope::Employee,
            Some("E1"),
            None,
            AdjustmentKind::OverrideHours,
            dec!(40),
        );
        early.created_at = ts("2024-01-01T08:00:00Z");
        let mut late = adjustment(
            AdjustmentScope::Employee,
            Some("E1"),
            None,
            AdjustmentKind::OverrideHours,
            dec!(35),
        );
        late.created_at = ts("2024-01-05T08:00:00Z");

        // Store order should not matter, only the creation timestamp.
        let report = summarize(
            &punches,
            &AttendanceSettings::default(),
            &[late.clone(), early.clone()],
        );
        assert_eq!(report.summaries[0].hours.normal, dec!(35));

        let report = summarize(&punches, &AttendanceSettings::default(), &[early, late]);
        assert_eq!(report.summaries[0].hours.normal, dec!(35));
    }

    #[test]
    fn subtraction_below_zero_is_reported_not_clamped() {
        let punches = plain_shift("E1", "08:00", "09:00");
        let adjustments = vec![adjustment(
            AdjustmentScope::Global,
            None,
            None,
            AdjustmentKind::SubtractHours,
            dec!(5),
        )];

        let report = summarize(&punches, &AttendanceSettings::default(), &adjustments);
        assert_eq!(report.summaries[0].hours.normal, dec!(-4));
    }

    // --- Day detail ---

    #[test]
    fn day_detail_keeps_ordered_punches_and_worked_hours() {
        let punches = vec![
            punch("E1", "2024-01-02", "17:00", PunchKind::CheckOut),
            punch("E1", "2024-01-02", "09:00", PunchKind::CheckIn),
            punch("E1", "2024-01-02", "19:00", PunchKind::CheckIn),
        ];
        let report = summarize(&punches, &AttendanceSettings::default(), &[]);

        let day = &report.summaries[0].days[&d("2024-01-02")];
        let times: Vec<NaiveTime> = day.punches.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![t("09:00"), t("17:00"), t("19:00")]);
        assert_eq!(day.worked_hours, dec!(8));
        assert_eq!(day.open_punches, 1);
    }
}
