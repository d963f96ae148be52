// src/attendance.rs
//
// The canonical attendance engine: punch records in, payroll hour
// summaries out. Everything here is pure — persistence and transport
// live elsewhere.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("No punch records to summarize")]
    NoPunches,
    #[error("Invalid report period: start {start} is after end {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },
}

// --- Core Data Structures ---

pub type EmployeeId = String;

const SECONDS_PER_HOUR: Decimal = dec!(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PunchKind {
    CheckIn,
    CheckOut,
    Unknown,
}

/// One normalized row from a punch-clock export. Malformed rows never
/// make it this far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchRecord {
    pub employee_id: EmployeeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub kind: PunchKind,
}

/// A closed shift between a matched check-in and check-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ShiftInterval {
    /// Builds the interval for a matched pair on `date`. A checkout
    /// earlier than its check-in rolls to the next calendar day, so a
    /// 22:00 → 06:00 pair is eight hours rather than minus sixteen.
    pub fn from_pair(date: NaiveDate, check_in: NaiveTime, check_out: NaiveTime) -> Self {
        let start = date.and_time(check_in);
        let end = if check_out >= check_in {
            date.and_time(check_out)
        } else {
            (date + Duration::days(1)).and_time(check_out)
        };
        ShiftInterval { start, end }
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    pub fn duration_hours(&self) -> Decimal {
        Decimal::from(self.duration_seconds()) / SECONDS_PER_HOUR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceBasis {
    /// Once per day that produced at least one closed interval.
    #[default]
    PerDay,
    /// Once per closed interval, as the legacy reports did it.
    PerInterval,
}

/// Pay-rule configuration. Missing fields in a stored document fall
/// back to these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceSettings {
    pub normal_shift_hours: Decimal,
    pub night_start: NaiveTime,
    pub night_end: NaiveTime,
    pub transport_allowance: Decimal,
    pub attendance_allowance: Decimal,
    pub allowance_basis: AllowanceBasis,
    /// ISO dates. Populated from the holiday store before a report run.
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        AttendanceSettings {
            normal_shift_hours: dec!(10),
            night_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            night_end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            transport_allowance: Decimal::ZERO,
            attendance_allowance: Decimal::ZERO,
            allowance_basis: AllowanceBasis::default(),
            holidays: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdjustmentScope {
    Employee,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdjustmentKind {
    AddHours,
    SubtractHours,
    OverrideHours,
}

/// A manual payroll correction entered by a clerk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    #[serde(default)]
    pub id: String,
    pub scope: AdjustmentScope,
    /// Required when scope is Employee; ignored for Global.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    /// Absent means the adjustment covers the whole report period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub kind: AdjustmentKind,
    pub hours: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Hour buckets are independent projections of the same intervals, so
/// they overlap: a holiday Sunday shift counts fully in both `holiday`
/// and `sunday` on top of its normal/overtime split. Summing them does
/// not give worked time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HourBuckets {
    pub normal: Decimal,
    pub overtime: Decimal,
    pub night: Decimal,
    pub holiday: Decimal,
    pub sunday: Decimal,
}

impl HourBuckets {
    fn accumulate(&mut self, other: &HourBuckets) {
        self.normal += other.normal;
        self.overtime += other.overtime;
        self.night += other.night;
        self.holiday += other.holiday;
        self.sunday += other.sunday;
    }

    /// Display values. Per-day detail keeps full precision.
    pub fn rounded(&self) -> HourBuckets {
        HourBuckets {
            normal: self.normal.round_dp(2),
            overtime: self.overtime.round_dp(2),
            night: self.night.round_dp(2),
            holiday: self.holiday.round_dp(2),
            sunday: self.sunday.round_dp(2),
        }
    }
}

/// One day in an employee's drill-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayDetail {
    /// The day's punches in processing order (ascending by time).
    pub punches: Vec<PunchRecord>,
    /// Sum of closed interval durations, full precision.
    pub worked_hours: Decimal,
    pub open_punches: u32,
}

impl DayDetail {
    pub fn is_open(&self) -> bool {
        self.open_punches > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSummary {
    pub employee_id: EmployeeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(flatten)]
    pub hours: HourBuckets,
    pub transport: Decimal,
    pub attendance: Decimal,
    pub open_shifts: u32,
    pub days: BTreeMap<NaiveDate, DayDetail>,
}

impl EmployeeSummary {
    fn new(employee_id: EmployeeId) -> Self {
        EmployeeSummary {
            employee_id,
            employee_name: None,
            hours: HourBuckets::default(),
            transport: Decimal::ZERO,
            attendance: Decimal::ZERO,
            open_shifts: 0,
            days: BTreeMap::new(),
        }
    }

    /// Name for report rows, falling back to the id when the export
    /// never carried one.
    pub fn display_name(&self) -> &str {
        self.employee_name.as_deref().unwrap_or(&self.employee_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReportError> {
        if start > end {
            return Err(ReportError::InvalidPeriod { start, end });
        }
        Ok(ReportPeriod { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn label(&self) -> String {
        format!("{} → {}", self.start, self.end)
    }
}

/// The aggregated result of one report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub period: ReportPeriod,
    pub summaries: Vec<EmployeeSummary>,
}

impl PeriodReport {
    pub fn summary_for(&self, employee_id: &str) -> Option<&EmployeeSummary> {
        self.summaries.iter().find(|s| s.employee_id == employee_id)
    }
}

// --- Shift Pairing ---

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayPairing {
    pub intervals: Vec<ShiftInterval>,
    pub open_punches: u32,
}

/// Pairs one day's punches into closed shift intervals.
///
/// Punches are sorted ascending by time (stable, so equal times keep
/// arrival order) and scanned left to right: a check-in immediately
/// followed by a check-out closes one interval; any other punch — a
/// check-in with no adjacent check-out, a leading check-out, an unknown
/// state — counts as exactly one open-shift flag. The scan never looks
/// past the adjacent punch for a match, so `[In 08:00, In 09:00,
/// Out 17:00]` yields one open flag plus one 09:00→17:00 interval.
pub fn pair_day_punches(date: NaiveDate, punches: &[PunchRecord]) -> DayPairing {
    let mut ordered: Vec<&PunchRecord> = punches.iter().collect();
    ordered.sort_by_key(|p| p.time);

    let mut pairing = DayPairing::default();
    let mut i = 0;
    while i < ordered.len() {
        let closes = ordered[i].kind == PunchKind::CheckIn
            && matches!(ordered.get(i + 1), Some(next) if next.kind == PunchKind::CheckOut);
        if closes {
            pairing
                .intervals
                .push(ShiftInterval::from_pair(date, ordered[i].time, ordered[i + 1].time));
            i += 2;
        } else {
            pairing.open_punches += 1;
            i += 1;
        }
    }
    pairing
}

// --- Hour Classification ---

/// Night window anchored on `date`. The end rolls to the next day when
/// the configured window crosses midnight (22:00–06:00 by default).
fn night_window(date: NaiveDate, settings: &AttendanceSettings) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(settings.night_start);
    let end = if settings.night_end <= settings.night_start {
        (date + Duration::days(1)).and_time(settings.night_end)
    } else {
        date.and_time(settings.night_end)
    };
    (start, end)
}

/// Projects one closed interval on `date` into the hour buckets. Each
/// projection looks at the whole interval independently of the others.
pub fn classify_interval(
    interval: &ShiftInterval,
    date: NaiveDate,
    settings: &AttendanceSettings,
) -> HourBuckets {
    let duration = interval.duration_hours();
    let mut buckets = HourBuckets::default();

    if date.weekday() == Weekday::Sun {
        buckets.sunday += duration;
    }
    if settings.holidays.contains(&date) {
        buckets.holiday += duration;
    }

    // Overlap with the night window, clamped at zero for shifts that
    // never touch it.
    let (win_start, win_end) = night_window(date, settings);
    let overlap_start = interval.start.max(win_start);
    let overlap_end = interval.end.min(win_end);
    let overlap_seconds = (overlap_end - overlap_start).num_seconds().max(0);
    buckets.night += Decimal::from(overlap_seconds) / SECONDS_PER_HOUR;

    if duration > settings.normal_shift_hours {
        buckets.normal += settings.normal_shift_hours;
        buckets.overtime += duration - settings.normal_shift_hours;
    } else {
        buckets.normal += duration;
    }

    buckets
}

// --- Adjustments ---

/// Applies every adjustment relevant to `employee_id` over `period` to
/// the accumulated normal-hours total and returns the result.
///
/// Add and subtract build a net delta. An override replaces the
/// accumulated total before the delta lands; among several matching
/// overrides the latest `created_at` wins. Dated adjustments apply only
/// inside the period, undated ones always.
fn apply_adjustments(
    normal: Decimal,
    employee_id: &str,
    adjustments: &[Adjustment],
    period: &ReportPeriod,
) -> Decimal {
    let mut delta = Decimal::ZERO;
    let mut override_value: Option<(DateTime<Utc>, Decimal)> = None;

    for adj in adjustments {
        let relevant = match adj.scope {
            AdjustmentScope::Global => true,
            AdjustmentScope::Employee => adj.employee_id.as_deref() == Some(employee_id),
        };
        if !relevant {
            continue;
        }
        if let Some(date) = adj.date {
            if !period.contains(date) {
                continue;
            }
        }
        match adj.kind {
            AdjustmentKind::AddHours => delta += adj.hours,
            AdjustmentKind::SubtractHours => delta -= adj.hours,
            AdjustmentKind::OverrideHours => {
                let newer = override_value
                    .map(|(at, _)| adj.created_at >= at)
                    .unwrap_or(true);
                if newer {
                    override_value = Some((adj.created_at, adj.hours));
                }
            }
        }
    }

    let base = override_value.map(|(_, hours)| hours).unwrap_or(normal);
    base + delta
}

// --- Period Aggregation ---

/// Smallest period covering every punch date, for when the caller gave
/// no explicit range.
pub fn detect_period(punches: &[PunchRecord]) -> Option<ReportPeriod> {
    let start = punches.iter().map(|p| p.date).min()?;
    let end = punches.iter().map(|p| p.date).max()?;
    Some(ReportPeriod { start, end })
}

/// The one aggregation entry point: normalized punches plus current
/// settings and adjustments in, per-employee summaries out.
///
/// Deterministic for identical inputs — grouping runs over ordered maps
/// and the day sort is stable, so rerunning (or re-sorting an already
/// sorted day) changes nothing.
pub fn summarize_period(
    punches: &[PunchRecord],
    settings: &AttendanceSettings,
    adjustments: &[Adjustment],
    period: ReportPeriod,
) -> Result<PeriodReport, ReportError> {
    if punches.is_empty() {
        return Err(ReportError::NoPunches);
    }

    // 1. One uniform window filter before any grouping; punches outside
    //    the period never influence totals.
    let in_window = punches.iter().filter(|p| period.contains(p.date));

    // 2. Group by employee and day.
    let mut groups: BTreeMap<(EmployeeId, NaiveDate), Vec<&PunchRecord>> = BTreeMap::new();
    for punch in in_window {
        groups
            .entry((punch.employee_id.clone(), punch.date))
            .or_default()
            .push(punch);
    }

    // 3. Pair and classify each day, accumulating per employee.
    let mut summaries: BTreeMap<EmployeeId, EmployeeSummary> = BTreeMap::new();
    for ((employee_id, date), day_punches) in groups {
        let owned: Vec<PunchRecord> = day_punches.into_iter().cloned().collect();
        let pairing = pair_day_punches(date, &owned);

        let summary = summaries
            .entry(employee_id.clone())
            .or_insert_with(|| EmployeeSummary::new(employee_id));
        if summary.employee_name.is_none() {
            summary.employee_name = owned.iter().find_map(|p| p.employee_name.clone());
        }

        let mut worked = Decimal::ZERO;
        for interval in &pairing.intervals {
            summary
                .hours
                .accumulate(&classify_interval(interval, date, settings));
            worked += interval.duration_hours();
        }
        summary.open_shifts += pairing.open_punches;

        let accruals = match settings.allowance_basis {
            AllowanceBasis::PerDay => u32::from(!pairing.intervals.is_empty()),
            AllowanceBasis::PerInterval => pairing.intervals.len() as u32,
        };
        summary.transport += Decimal::from(accruals) * settings.transport_allowance;
        summary.attendance += Decimal::from(accruals) * settings.attendance_allowance;

        let mut ordered = owned;
        ordered.sort_by_key(|p| p.time);
        summary.days.insert(
            date,
            DayDetail {
                punches: ordered,
                worked_hours: worked,
                open_punches: pairing.open_punches,
            },
        );
    }

    // 4. Manual corrections per employee over the window.
    for summary in summaries.values_mut() {
        summary.hours.normal =
            apply_adjustments(summary.hours.normal, &summary.employee_id, adjustments, &period);
    }

    // 5. Stable output order with display rounding; day detail keeps
    //    full precision.
    let summaries: Vec<EmployeeSummary> = summaries
        .into_values()
        .map(|mut s| {
            s.hours = s.hours.rounded();
            s.transport = s.transport.round_dp(2);
            s.attendance = s.attendance.round_dp(2);
            s
        })
        .collect();

    debug!(
        "Aggregated {} employee summaries for period {}.",
        summaries.len(),
        period.label()
    );

    Ok(PeriodReport { period, summaries })
}
