use crate::core::aggregate;
use crate::domain::model::{Identifier, Outcome, QueryResult};
use crate::domain::ports::Storage;
use crate::utils::error::{QueryError, Result};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// 依輸入順序把存放快照渲染成報表壓縮檔：彙總表、明細表加上原始 JSON。
/// 回傳寫入 Storage 的檔名。
pub async fn export_report<S: Storage>(
    storage: &S,
    ordered: &[Identifier],
    snapshot: &HashMap<Identifier, QueryResult>,
    started_at: DateTime<Local>,
) -> Result<String> {
    let summary_sheet = render_summary_sheet(ordered, snapshot)?;
    let detail_sheet = render_detail_sheet(ordered, snapshot)?;

    let zip_data = {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        zip.start_file::<_, ()>("summary.csv", FileOptions::default())?;
        zip.write_all(&summary_sheet)?;

        zip.start_file::<_, ()>("details.csv", FileOptions::default())?;
        zip.write_all(&detail_sheet)?;

        zip.start_file::<_, ()>("results.json", FileOptions::default())?;
        let json_data = serde_json::to_string_pretty(snapshot)?;
        zip.write_all(json_data.as_bytes())?;

        let cursor = zip.finish()?;
        cursor.into_inner()
    };

    let filename = format!("warranty_report_{}.zip", started_at.format("%Y%m%d_%H%M%S"));
    tracing::debug!("Writing report archive ({} bytes)", zip_data.len());
    storage.write_file(&filename, &zip_data).await?;

    Ok(filename)
}

/// 每個序列號在報表中的狀態欄
fn serial_state(result: Option<&QueryResult>) -> &'static str {
    match result {
        Some(result) if result.is_success() => "succeeded",
        Some(_) => "failed",
        None => "not_queried",
    }
}

fn render_summary_sheet(
    ordered: &[Identifier],
    snapshot: &HashMap<Identifier, QueryResult>,
) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let succeeded = ordered
        .iter()
        .filter(|id| snapshot.get(*id).is_some_and(|r| r.is_success()))
        .count();

    let mut in_warranty = 0usize;
    let mut out_of_warranty = 0usize;
    let mut rows: Vec<[String; 5]> = Vec::new();

    for identifier in ordered {
        let result = snapshot.get(identifier);
        let window = result
            .and_then(|r| r.outcome.payload())
            .and_then(aggregate::latest_coverage);

        match window {
            Some(window) => {
                let state = if window.remaining_days > 0 {
                    in_warranty += 1;
                    "in_warranty"
                } else {
                    out_of_warranty += 1;
                    "out_of_warranty"
                };
                rows.push([
                    identifier.to_string(),
                    window.start.to_string(),
                    window.end.to_string(),
                    window.remaining_days.to_string(),
                    state.to_string(),
                ]);
            }
            None => rows.push([
                identifier.to_string(),
                String::new(),
                String::new(),
                String::new(),
                serial_state(result).to_string(),
            ]),
        }
    }

    writer.write_record([
        "total_queried",
        "succeeded",
        "failed",
        "in_warranty",
        "out_of_warranty",
    ])?;
    writer.write_record([
        ordered.len().to_string(),
        succeeded.to_string(),
        (ordered.len() - succeeded).to_string(),
        in_warranty.to_string(),
        out_of_warranty.to_string(),
    ])?;

    writer.write_record([
        "serial",
        "warranty_start",
        "warranty_end",
        "remaining_days",
        "state",
    ])?;
    for row in rows {
        writer.write_record(row)?;
    }

    finish_sheet(writer)
}

fn render_detail_sheet(
    ordered: &[Identifier],
    snapshot: &HashMap<Identifier, QueryResult>,
) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record([
        "serial",
        "query_status",
        "valid_services",
        "expired_services",
        "total_services",
        "service_type",
        "service_name",
        "start_date",
        "end_date",
        "remaining_days",
        "state",
    ])?;

    for identifier in ordered {
        match snapshot.get(identifier) {
            Some(result) => match &result.outcome {
                Outcome::Success { payload, counts } => {
                    write_service_rows(&mut writer, identifier, payload, counts)?;
                }
                Outcome::Failure { reason } => {
                    writer.write_record([
                        identifier.as_str(),
                        "failed",
                        "0",
                        "0",
                        "0",
                        "",
                        reason.as_str(),
                        "",
                        "",
                        "",
                        "",
                    ])?;
                }
            },
            None => {
                writer.write_record([
                    identifier.as_str(),
                    "not_queried",
                    "0",
                    "0",
                    "0",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                ])?;
            }
        }
    }

    finish_sheet(writer)
}

/// 一個序列號一組列：第一列帶統計，後續列只有服務明細
fn write_service_rows(
    writer: &mut csv::Writer<Vec<u8>>,
    identifier: &Identifier,
    payload: &serde_json::Value,
    counts: &crate::domain::model::ServiceCounts,
) -> Result<()> {
    let entries: Vec<_> = aggregate::service_entries(payload).collect();

    if entries.is_empty() {
        writer.write_record([
            identifier.as_str(),
            "succeeded",
            "0",
            "0",
            "0",
            "",
            "no service records",
            "",
            "",
            "",
            "",
        ])?;
        return Ok(());
    }

    for (row_index, (group, entry)) in entries.iter().enumerate() {
        let remaining = aggregate::days_remaining(entry);
        let state = if remaining > 0 {
            "in_warranty"
        } else {
            "out_of_warranty"
        };

        let (serial, status, valid, expired, total) = if row_index == 0 {
            (
                identifier.to_string(),
                "succeeded".to_string(),
                counts.valid_services.to_string(),
                counts.expired_services.to_string(),
                counts.total_services.to_string(),
            )
        } else {
            Default::default()
        };

        writer.write_record([
            serial,
            status,
            valid,
            expired,
            total,
            group.to_string(),
            text_field(entry, "ServiceProductName"),
            text_field(entry, "StartDate"),
            text_field(entry, "EndDate"),
            remaining.to_string(),
            state.to_string(),
        ])?;
    }

    Ok(())
}

fn text_field(entry: &serde_json::Value, field: &str) -> String {
    entry
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn finish_sheet(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| QueryError::ProcessingError {
            message: format!("CSV buffer flush failed: {}", e),
        })
}
