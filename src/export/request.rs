use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Raw-row cap assumed by the estimates when the request has no max_rows.
const RAW_ROW_CAP_DEFAULT: u64 = 10_000;
const MAX_ROWS_LIMIT: i64 = 100_000;

/// Span assumed for row/size estimates when the request has no date range.
const ESTIMATE_DEFAULT_SPAN_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportGranularity {
    Summary,
    Detailed,
    Raw,
}

impl ExportGranularity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(ExportGranularity::Summary),
            "detailed" => Some(ExportGranularity::Detailed),
            "raw" => Some(ExportGranularity::Raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportGranularity::Summary => "summary",
            ExportGranularity::Detailed => "detailed",
            ExportGranularity::Raw => "raw",
        }
    }

    /// Breakdown tables (countries, devices, daily series) ship with
    /// `detailed` and `raw` but not `summary`.
    pub fn includes_breakdowns(&self) -> bool {
        !matches!(self, ExportGranularity::Summary)
    }
}

/// Optional filters supplied with an export request. Dates are `YYYY-MM-DD`
/// strings on the wire and are parsed during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<i64>,
}

impl ExportFilters {
    pub fn start(&self) -> Option<NaiveDate> {
        self.start_date.as_deref().and_then(parse_date)
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }

    pub fn has_date_range(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some()
    }
}

/// Export request as it arrives on the wire. Format and granularity stay
/// strings here so validation can report bad values instead of failing
/// deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub poll_id: String,
    pub format: String,
    #[serde(default = "default_granularity")]
    pub granularity: String,
    #[serde(default)]
    pub filters: ExportFilters,
}

fn default_granularity() -> String {
    "summary".to_string()
}

impl ExportRequest {
    /// Validate and convert into a typed plan. Returns every blocking error
    /// at once rather than stopping at the first.
    pub fn validate(self, user_id: Option<String>) -> Result<ExportPlan, Vec<String>> {
        let errors = blocking_errors(&self, user_id.as_deref());
        if !errors.is_empty() {
            return Err(errors);
        }
        // parse() cannot fail once blocking_errors is empty
        let format = ExportFormat::parse(&self.format).ok_or_else(|| vec![unknown_format(&self.format)])?;
        let granularity = ExportGranularity::parse(&self.granularity)
            .ok_or_else(|| vec![unknown_granularity(&self.granularity)])?;
        Ok(ExportPlan {
            poll_id: self.poll_id,
            format,
            granularity,
            filters: self.filters,
            user_id,
        })
    }
}

/// A validated export request with its enums resolved.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub poll_id: String,
    pub format: ExportFormat,
    pub granularity: ExportGranularity,
    pub filters: ExportFilters,
    pub user_id: Option<String>,
}

/// Validation outcome returned to clients before they commit to an export.
/// Row and byte figures are heuristics from the date span and granularity,
/// for preview only; nothing enforces them.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub estimated_rows: u64,
    pub estimated_size_bytes: u64,
}

pub fn validate_export_request(
    request: &ExportRequest,
    user_id: Option<&str>,
) -> ValidationReport {
    let errors = blocking_errors(request, user_id);

    let mut warnings = Vec::new();
    let start = request.filters.start();
    let end = request.filters.end();
    if let (Some(s), Some(e)) = (start, end) {
        if e.signed_duration_since(s).num_days() > 365 {
            warnings.push("large date range: export spans more than a year".to_string());
        }
    }
    if let Some(e) = end {
        if e > Utc::now().date_naive() {
            warnings.push("end date is in the future".to_string());
        }
    }

    let estimated_rows = estimate_rows(request, start, end);
    let estimated_size_bytes = estimated_rows * bytes_per_row(&request.format);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        estimated_rows,
        estimated_size_bytes,
    }
}

fn blocking_errors(request: &ExportRequest, user_id: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();

    if !valid_poll_id(&request.poll_id) {
        errors.push(
            "poll id must be 1-50 characters of letters, digits, hyphen or underscore".to_string(),
        );
    }
    if ExportFormat::parse(&request.format).is_none() {
        errors.push(unknown_format(&request.format));
    }
    let granularity = ExportGranularity::parse(&request.granularity);
    if granularity.is_none() {
        errors.push(unknown_granularity(&request.granularity));
    }

    let start = match request.filters.start_date.as_deref() {
        Some(s) => match parse_date(s) {
            Some(d) => Some(d),
            None => {
                errors.push(format!("invalid start date: {} (expected YYYY-MM-DD)", s));
                None
            }
        },
        None => None,
    };
    let end = match request.filters.end_date.as_deref() {
        Some(s) => match parse_date(s) {
            Some(d) => Some(d),
            None => {
                errors.push(format!("invalid end date: {} (expected YYYY-MM-DD)", s));
                None
            }
        },
        None => None,
    };
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            errors.push("start date is after end date".to_string());
        }
    }

    if let Some(n) = request.filters.max_rows {
        if !(1..=MAX_ROWS_LIMIT).contains(&n) {
            errors.push(format!("max_rows must be between 1 and {}", MAX_ROWS_LIMIT));
        }
    }

    if granularity == Some(ExportGranularity::Raw) && user_id.is_none() {
        errors.push("raw exports require a user id".to_string());
    }

    errors
}

fn unknown_format(s: &str) -> String {
    format!("unknown export format: {} (expected csv, json or xlsx)", s)
}

fn unknown_granularity(s: &str) -> String {
    format!(
        "unknown export granularity: {} (expected summary, detailed or raw)",
        s
    )
}

fn valid_poll_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 50
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn estimate_rows(
    request: &ExportRequest,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> u64 {
    let span_days = match (start, end) {
        (Some(s), Some(e)) if e >= s => e.signed_duration_since(s).num_days() as u64 + 1,
        _ => ESTIMATE_DEFAULT_SPAN_DAYS,
    };
    match ExportGranularity::parse(&request.granularity) {
        Some(ExportGranularity::Detailed) => 40 + span_days * 25,
        Some(ExportGranularity::Raw) => {
            let cap = request
                .filters
                .max_rows
                .map(|n| n.max(0) as u64)
                .unwrap_or(RAW_ROW_CAP_DEFAULT);
            (span_days * 200).min(cap)
        }
        // summary exports are a fixed block of metric lines
        _ => 40,
    }
}

fn bytes_per_row(format: &str) -> u64 {
    match ExportFormat::parse(format) {
        Some(ExportFormat::Json) => 220,
        Some(ExportFormat::Xlsx) => 130,
        _ => 80,
    }
}
