use crate::domain::model::ServiceCounts;
use chrono::NaiveDate;
use serde_json::Value;

/// 服務明細在 payload 中的固定分組標籤
pub const SERVICE_GROUPS: [&str; 3] = ["warranty", "onsite", "other"];

/// 掃過 payload 裡所有分組的服務明細項目
pub fn service_entries<'a>(payload: &'a Value) -> impl Iterator<Item = (&'static str, &'a Value)> {
    SERVICE_GROUPS.into_iter().flat_map(move |group| {
        payload
            .pointer("/data/detailinfo")
            .and_then(|detail| detail.get(group))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(move |entry| (group, entry))
    })
}

/// 剩餘天數：正值在保，非正值過保。服務端有時回字串，一併處理。
pub fn days_remaining(entry: &Value) -> i64 {
    match entry.get("DateDifference") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// 把成功 payload 統計成服務數量彙總
pub fn service_counts(payload: &Value) -> ServiceCounts {
    let mut counts = ServiceCounts::default();
    for (_, entry) in service_entries(payload) {
        if days_remaining(entry) > 0 {
            counts.valid_services += 1;
        } else {
            counts.expired_services += 1;
        }
    }
    counts.total_services = counts.valid_services + counts.expired_services;
    counts
}

/// 結束日最晚的那組維保期間，供匯出彙總表使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub remaining_days: i64,
}

/// 找出結束日最晚的維保期間；日期解析不了的項目跳過
pub fn latest_coverage(payload: &Value) -> Option<CoverageWindow> {
    let mut best: Option<CoverageWindow> = None;

    for (_, entry) in service_entries(payload) {
        let start = match parse_date(entry, "StartDate") {
            Some(date) => date,
            None => continue,
        };
        let end = match parse_date(entry, "EndDate") {
            Some(date) => date,
            None => continue,
        };

        if best.as_ref().map_or(true, |window| end > window.end) {
            best = Some(CoverageWindow {
                start,
                end,
                remaining_days: days_remaining(entry),
            });
        }
    }

    best
}

fn parse_date(entry: &Value, field: &str) -> Option<NaiveDate> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}
