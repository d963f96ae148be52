// src/main.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    service: String,
    version: String,
    store: StoreStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreStats {
    log_batches: u32,
    reports: u32,
    holidays: u32,
    adjustments: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    normal_shift_hours: String,
    transport_allowance: String,
    attendance_allowance: String,
    allowance_basis: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Period {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogBatchInfo {
    id: String,
    name: String,
    period: Period,
    row_count: u32,
    skipped_rows: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Holiday {
    id: String,
    date: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Adjustment {
    id: String,
    kind: String,
    hours: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportInfo {
    id: String,
    title: String,
    batch_id: String,
    period: Period,
    employee_count: u32,
}

// A small device export: Asha works a long Friday shift and a short
// Saturday night shift, Ben works a plain Friday and forgets to badge
// out on Sunday.
const SAMPLE_EXPORT: &str = "\
Employee ID,First Name,Date,Time,Punch State
E100,Asha,05-01-2024,08:00,Check In
E100,Asha,05-01-2024,19:30,Check Out
E100,Asha,06-01-2024,22:00,Check In
E100,Asha,06-01-2024,23:45,Check Out
E200,Ben,05-01-2024,09:00,Check In
E200,Ben,05-01-2024,17:00,Check Out
E200,Ben,07-01-2024,08:00,Check In
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = "http://localhost:3000";
    let client = Client::new();

    // Test 1: Status check
    println!("\n🔍 Testing status endpoint...");
    let status = client
        .get(format!("{}/status", base_url))
        .send()
        .await?
        .json::<StatusResponse>()
        .await?;
    println!(
        "Service: {} v{} (batches: {}, reports: {}, holidays: {}, adjustments: {})",
        status.service,
        status.version,
        status.store.log_batches,
        status.store.reports,
        status.store.holidays,
        status.store.adjustments
    );

    // Test 2: Settings round-trip
    println!("\n🔍 Testing settings round-trip...");
    let current = client
        .get(format!("{}/api/settings", base_url))
        .send()
        .await?
        .json::<Settings>()
        .await?;
    println!("Current settings: {:?}", current);

    let updated = client
        .put(format!("{}/api/settings", base_url))
        .json(&json!({
            "normalShiftHours": "10",
            "transportAllowance": "1.5",
            "attendanceAllowance": "1.0",
            "allowanceBasis": "per_day",
        }))
        .send()
        .await?
        .json::<Settings>()
        .await?;
    println!(
        "Updated settings: shift {}h, transport {}, attendance {}, basis {}",
        updated.normal_shift_hours,
        updated.transport_allowance,
        updated.attendance_allowance,
        updated.allowance_basis
    );

    // Test 3: Holiday and adjustment setup
    println!("\n🔍 Creating a holiday and an adjustment...");
    let holiday = client
        .post(format!("{}/api/holidays", base_url))
        .json(&json!({ "date": "2024-01-06", "name": "Epiphany" }))
        .send()
        .await?
        .json::<Holiday>()
        .await?;
    println!("Holiday {} on {} ({})", holiday.name, holiday.date, holiday.id);

    let adjustment = client
        .post(format!("{}/api/adjustments", base_url))
        .json(&json!({
            "scope": "employee",
            "employeeId": "E100",
            "kind": "addHours",
            "hours": "2",
            "reason": "badge reader offline",
        }))
        .send()
        .await?
        .json::<Adjustment>()
        .await?;
    println!(
        "Adjustment {}: {} {}h",
        adjustment.id, adjustment.kind, adjustment.hours
    );

    // Test 4: Upload a punch log batch
    println!("\n🔍 Uploading a punch export...");
    let upload_response = client
        .post(format!("{}/api/logs/upload", base_url))
        .query(&[("name", "smoke test export")])
        .body(SAMPLE_EXPORT)
        .send()
        .await?;
    if !upload_response.status().is_success() {
        println!("Upload failed: {}", upload_response.text().await?);
        return Ok(());
    }
    let batch = upload_response.json::<LogBatchInfo>().await?;
    println!(
        "Batch {} '{}': {} rows ({} skipped), period {} to {}",
        batch.id, batch.name, batch.row_count, batch.skipped_rows, batch.period.start, batch.period.end
    );

    // Test 5: Filtered batch detail
    println!("\n🔍 Fetching batch detail filtered to Asha...");
    let detail = client
        .get(format!("{}/api/logs/{}", base_url, batch.id))
        .query(&[("employee", "asha")])
        .send()
        .await?
        .text()
        .await?;
    println!("Detail payload: {}", detail);

    // Test 6: Generate a report
    println!("\n🔍 Generating a period report...");
    let report_response = client
        .post(format!("{}/api/reports", base_url))
        .json(&json!({ "batchId": batch.id, "title": "Smoke report" }))
        .send()
        .await?;
    if !report_response.status().is_success() {
        println!("Report generation failed: {}", report_response.text().await?);
        return Ok(());
    }
    let report = report_response.json::<ReportInfo>().await?;
    println!(
        "Report {} '{}' over {} to {} covers {} employees (batch {})",
        report.id,
        report.title,
        report.period.start,
        report.period.end,
        report.employee_count,
        report.batch_id
    );

    // Test 7: CSV exports
    println!("\n🔍 Fetching CSV exports...");
    for (label, path) in [
        ("Summary", format!("/api/reports/{}/export/summary", report.id)),
        ("Payroll", format!("/api/reports/{}/export/payroll", report.id)),
        ("Drilldown", format!("/api/reports/{}/drilldown/E100", report.id)),
    ] {
        let response = client
            .get(format!("{}{}", base_url, path))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        println!("\n{} export ({}):", label, status);
        for line in body.lines().take(6) {
            println!("  {}", line);
        }
    }

    // Cleanup so repeated runs start from the same totals
    println!("\n🔍 Cleaning up smoke-test documents...");
    for path in [
        format!("/api/adjustments/{}", adjustment.id),
        format!("/api/holidays/{}", holiday.id),
        format!("/api/reports/{}", report.id),
        format!("/api/logs/{}", batch.id),
    ] {
        let status = client
            .delete(format!("{}{}", base_url, path))
            .send()
            .await?
            .status();
        println!("DELETE {} -> {}", path, status);
    }

    println!("\n✅ Testing complete!");

    Ok(())
}
