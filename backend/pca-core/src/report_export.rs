// src/report_export.rs
//
// CSV renderings of a finished report. Three shapes: the clerk-facing
// summary, the payroll-import subset, and the per-employee drill-down.
// Column sets and prelude rows are fixed — payroll software imports
// these files by position.

use crate::attendance::{DayDetail, EmployeeSummary, PeriodReport, ReportPeriod};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub const SUMMARY_HEADERS: [&str; 10] = [
    "Employee ID",
    "Name",
    "Normal",
    "Overtime",
    "Holiday",
    "Sunday",
    "Night",
    "Transport",
    "Attendance",
    "Open Shifts",
];

pub const PAYROLL_HEADERS: [&str; 9] = [
    "EMP ID",
    "Full Name",
    "PAY TYPE",
    "NORMAL",
    "OVERTIME",
    "HOLIDAY",
    "NIGHT",
    "T/L ALLOW",
    "ATTEND ALLOW",
];

pub const DRILLDOWN_HEADERS: [&str; 5] = ["Employee", "Date", "Punches", "Hours", "Status"];

fn hours(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn flexible_writer() -> csv::Writer<Vec<u8>> {
    // Prelude rows are shorter than the table rows, so the equal-length
    // check has to go.
    csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))
}

/// The clerk-facing summary: title, period and a spacer above the
/// table, one row per employee in report order.
pub fn summary_csv(report: &PeriodReport) -> Result<Vec<u8>, ExportError> {
    let mut writer = flexible_writer();
    writer.write_record(["Attendance Summary Report"])?;
    writer.write_record([format!("Period: {}", report.period.label())])?;
    writer.write_record([""])?;
    writer.write_record(SUMMARY_HEADERS)?;

    for summary in &report.summaries {
        writer.write_record(vec![
            summary.employee_id.clone(),
            summary.display_name().to_string(),
            hours(summary.hours.normal),
            hours(summary.hours.overtime),
            hours(summary.hours.holiday),
            hours(summary.hours.sunday),
            hours(summary.hours.night),
            hours(summary.transport),
            hours(summary.attendance),
            summary.open_shifts.to_string(),
        ])?;
    }
    finish(writer)
}

/// The subset the payroll system imports. `PAY TYPE` is fixed to
/// `Monthly` and Sunday hours are deliberately absent — payroll derives
/// Sunday premiums itself.
pub fn payroll_csv(report: &PeriodReport) -> Result<Vec<u8>, ExportError> {
    let mut writer = flexible_writer();
    writer.write_record(["Payroll Attendance Report"])?;
    writer.write_record([format!(
        "Period: {} -> {}",
        report.period.start, report.period.end
    )])?;
    writer.write_record([""])?;
    writer.write_record(PAYROLL_HEADERS)?;

    for summary in &report.summaries {
        writer.write_record(vec![
            summary.employee_id.clone(),
            summary.display_name().to_string(),
            "Monthly".to_string(),
            hours(summary.hours.normal),
            hours(summary.hours.overtime),
            hours(summary.hours.holiday),
            hours(summary.hours.night),
            hours(summary.transport),
            hours(summary.attendance),
        ])?;
    }
    finish(writer)
}

fn day_hours_cell(day: &DayDetail) -> String {
    if day.worked_hours > Decimal::ZERO || !day.is_open() {
        hours(day.worked_hours)
    } else {
        "-".to_string()
    }
}

fn day_status_cell(day: &DayDetail) -> &'static str {
    if day.is_open() {
        "Open Shift"
    } else {
        "OK"
    }
}

/// One employee's day-by-day breakdown with a trailing TOTAL row. Dates
/// render in the device's day-first format, punch times joined with a
/// comma the way the attendance clerks read them off the device.
pub fn drilldown_csv(
    report: &PeriodReport,
    summary: &EmployeeSummary,
) -> Result<Vec<u8>, ExportError> {
    let employee_cell = format!("{} ({})", summary.display_name(), summary.employee_id);

    let mut writer = flexible_writer();
    writer.write_record(["Breakdown Report"])?;
    writer.write_record([format!(
        "Period: {} -> {}",
        report.period.start, report.period.end
    )])?;
    writer.write_record([""])?;
    writer.write_record(DRILLDOWN_HEADERS)?;

    let mut total = Decimal::ZERO;
    for (date, day) in &summary.days {
        let punches = day
            .punches
            .iter()
            .map(|p| p.time.format("%H:%M").to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writer.write_record(vec![
            employee_cell.clone(),
            date.format("%d-%m-%Y").to_string(),
            punches,
            day_hours_cell(day),
            day_status_cell(day).to_string(),
        ])?;
        total += day.worked_hours;
    }
    writer.write_record(vec![
        employee_cell,
        "TOTAL".to_string(),
        String::new(),
        hours(total),
        String::new(),
    ])?;
    finish(writer)
}

// --- Filenames ---

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename pattern"));

/// Collapses anything outside `[A-Za-z0-9._-]` to a single underscore.
/// Employee names come straight from device exports and end up in
/// Content-Disposition headers.
pub fn sanitize_filename(raw: &str) -> String {
    UNSAFE_FILENAME_CHARS
        .replace_all(raw.trim(), "_")
        .trim_matches('_')
        .to_string()
}

fn range_label(period: &ReportPeriod) -> String {
    format!("{}_to_{}", period.start, period.end)
}

pub fn summary_filename(period: &ReportPeriod) -> String {
    format!("attendance_summary_{}.csv", range_label(period))
}

pub fn payroll_filename(period: &ReportPeriod) -> String {
    format!("payroll_report_{}.csv", range_label(period))
}

pub fn drilldown_filename(summary: &EmployeeSummary, period: &ReportPeriod) -> String {
    format!(
        "Breakdown-{}_{}_{}.csv",
        sanitize_filename(summary.display_name()),
        sanitize_filename(&summary.employee_id),
        range_label(period)
    )
}
