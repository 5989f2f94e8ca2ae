//! Normalization pipeline from raw JSON payloads to canonical [`Table`]s.
//!
//! Providers describe their payloads with static [`ColumnMap`] and
//! [`DTypeMap`] tables and hand the decoded JSON to this module:
//!
//! ```text
//! JSON ──detect──▶ RawPayload ──rows──▶ Table ──map/cast──▶ normalize_ohlc / normalize_intraday
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

use crate::domain::dates::{epoch_to_vn, parse_date};
use crate::table::{Cell, Column, DType, Table, TableAttrs};
use crate::{Interval, TransformError};

/// `(upstream key, canonical column)` pairs.
pub type ColumnMap = &'static [(&'static str, &'static str)];

/// `(canonical column, dtype)` pairs.
pub type DTypeMap = &'static [(&'static str, DType)];

/// `(requested interval, bucket rule)` pairs for intervals a provider does not serve natively.
pub type ResampleMap = &'static [(Interval, ResampleRule)];

pub const OHLC_COLUMNS: [&str; 6] = ["time", "open", "high", "low", "close", "volume"];

pub const OHLC_DTYPES: DTypeMap = &[
    ("time", DType::Datetime),
    ("open", DType::Float),
    ("high", DType::Float),
    ("low", DType::Float),
    ("close", DType::Float),
    ("volume", DType::Int),
];

const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];

// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// Shape of one decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Array of objects, one per record.
    Rows(Vec<Map<String, Value>>),
    /// Object of equal-length arrays, one per column.
    Columnar(Map<String, Value>),
}

impl RawPayload {
    pub fn detect(value: Value) -> Result<Self, TransformError> {
        match value {
            Value::Array(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(map) => rows.push(map),
                        other => {
                            return Err(TransformError::UnsupportedShape(format!(
                                "array element is {}, expected object",
                                json_kind(&other)
                            )))
                        }
                    }
                }
                Ok(Self::Rows(rows))
            }
            Value::Object(map) => {
                if !map.is_empty() && map.values().all(Value::is_array) {
                    Ok(Self::Columnar(map))
                } else {
                    Ok(Self::Rows(vec![map]))
                }
            }
            other => Err(TransformError::UnsupportedShape(format!(
                "top-level {}, expected object or array",
                json_kind(&other)
            ))),
        }
    }

    /// Pivot into records. Columnar arrays must all have the same length.
    pub fn into_rows(self) -> Result<Vec<Map<String, Value>>, TransformError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Columnar(columns) => {
                let mut arrays = Vec::with_capacity(columns.len());
                for (name, value) in columns {
                    match value {
                        Value::Array(values) => arrays.push((name, values)),
                        other => {
                            return Err(TransformError::UnsupportedShape(format!(
                                "column '{name}' is {}, expected array",
                                json_kind(&other)
                            )))
                        }
                    }
                }

                let expected = arrays.first().map_or(0, |(_, values)| values.len());
                if let Some((name, values)) = arrays.iter().find(|(_, values)| values.len() != expected) {
                    return Err(TransformError::RaggedColumns {
                        column: name.clone(),
                        expected,
                        found: values.len(),
                    });
                }

                let mut rows: Vec<Map<String, Value>> = (0..expected).map(|_| Map::new()).collect();
                for (name, values) in arrays {
                    for (row, value) in rows.iter_mut().zip(values) {
                        row.insert(name.clone(), value);
                    }
                }
                Ok(rows)
            }
        }
    }

    pub fn into_table(self) -> Result<Table, TransformError> {
        Ok(Table::from_json_rows(&self.into_rows()?))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Keep only mapped upstream columns, renamed, in column-map order.
pub fn map_columns(table: &Table, map: ColumnMap) -> Table {
    let upstream: Vec<&str> = map.iter().map(|(from, _)| *from).collect();
    let mut selected = table.select(&upstream);
    selected.rename(map);
    selected
}

/// Cast columns per `dtypes`. A column with any uncastable cell is left untouched.
pub fn cast_columns(table: &mut Table, dtypes: DTypeMap) {
    for (name, dtype) in dtypes {
        let Some(cells) = table.column(name) else {
            continue;
        };
        let cast: Option<Vec<Cell>> = cells.into_iter().map(|cell| cast_cell(cell, *dtype)).collect();
        if let Some(cast) = cast {
            table.set_column(name, *dtype, cast);
        }
    }
}

/// Convert one cell. `None` means the value cannot be represented as `dtype`.
pub fn cast_cell(cell: &Cell, dtype: DType) -> Option<Cell> {
    if cell.is_null() {
        return Some(Cell::Null);
    }
    match dtype {
        DType::Str => Some(match cell {
            Cell::Str(text) => Cell::Str(text.clone()),
            other => Cell::Str(other.to_string()),
        }),
        DType::Float => match cell {
            Cell::Int(value) => Some(Cell::Float(*value as f64)),
            Cell::Float(value) => Some(Cell::Float(*value)),
            Cell::Str(text) => parse_number(text).map(Cell::Float),
            _ => None,
        },
        DType::Int => match cell {
            Cell::Int(value) => Some(Cell::Int(*value)),
            Cell::Float(value) if value.fract() == 0.0 => Some(Cell::Int(*value as i64)),
            Cell::Str(text) => match parse_number(text) {
                Some(value) if value.fract() == 0.0 => Some(Cell::Int(value as i64)),
                _ => None,
            },
            Cell::Bool(flag) => Some(Cell::Int(i64::from(*flag))),
            _ => None,
        },
        DType::Bool => match cell {
            Cell::Bool(flag) => Some(Cell::Bool(*flag)),
            Cell::Int(0) => Some(Cell::Bool(false)),
            Cell::Int(1) => Some(Cell::Bool(true)),
            Cell::Str(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Cell::Bool(true)),
                "false" => Some(Cell::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        DType::Datetime => match cell {
            Cell::Datetime(value) => Some(Cell::Datetime(*value)),
            Cell::Date(value) => Some(Cell::Datetime(PrimitiveDateTime::new(*value, Time::MIDNIGHT))),
            Cell::Int(value) => epoch_cell(*value as f64),
            Cell::Float(value) => epoch_cell(*value),
            Cell::Str(text) => parse_datetime(text).map(Cell::Datetime),
            Cell::Bool(_) | Cell::Null => None,
        },
        DType::Date => match cell {
            Cell::Date(value) => Some(Cell::Date(*value)),
            Cell::Datetime(value) => Some(Cell::Date(value.date())),
            Cell::Int(value) => epoch_cell(*value as f64).and_then(|cell| cell.as_date().map(Cell::Date)),
            Cell::Float(value) => epoch_cell(*value).and_then(|cell| cell.as_date().map(Cell::Date)),
            Cell::Str(text) => parse_datetime(text).map(|value| Cell::Date(value.date())),
            Cell::Bool(_) | Cell::Null => None,
        },
    }
}

fn epoch_cell(value: f64) -> Option<Cell> {
    let seconds = if value.abs() > EPOCH_MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    epoch_to_vn(seconds.trunc() as i64).map(Cell::Datetime)
}

fn parse_number(text: &str) -> Option<f64> {
    clean_numeric_string(text).parse::<f64>().ok()
}

/// Parse a timestamp string as local wall time. Offsets, when present, are dropped.
pub fn parse_datetime(text: &str) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(PrimitiveDateTime::new(value.date(), value.time()));
    }
    let formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];
    for format in formats {
        if let Ok(value) = PrimitiveDateTime::parse(text, format) {
            return Some(value);
        }
    }
    // Fractional seconds without an offset, e.g. 2024-01-02T00:00:00.000
    if let Some((head, _)) = text.split_once('.') {
        if let Ok(value) = PrimitiveDateTime::parse(head, formats[1]) {
            return Some(value);
        }
    }
    parse_date(text)
        .ok()
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
}

/// Strip thousands separators and non-breaking spaces.
pub fn clean_numeric_string(text: &str) -> String {
    text.replace(['\u{00A0}', ','], "").trim().to_owned()
}

/// `organName` -> `organ_name`, `ICBName` -> `icb_name`.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (index, ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && index > 0 {
            let prev = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_is_lower) {
                out.push('_');
            }
        }
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// Lift nested objects into `parent_child` keys. Arrays are kept as values.
pub fn flatten_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}_{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&name), inner),
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

/// Canonical trade side for upstream match-type codes.
pub fn map_match_type(value: &str) -> &str {
    match value {
        "b" | "B" | "BU" => "Buy",
        "s" | "S" | "SD" => "Sell",
        other => other,
    }
}

/// Drop every column whose name starts with one of `prefixes` or equals one of `exact`.
pub fn drop_columns_matching(table: &mut Table, prefixes: &[&str], exact: &[&str]) {
    table.drop_columns_where(|name| {
        exact.contains(&name) || prefixes.iter().any(|prefix| name.starts_with(prefix))
    });
}

/// Fail with [`TransformError::MissingColumns`] unless every name is present.
pub fn require_columns(table: &Table, required: &[&str]) -> Result<(), TransformError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !table.has_column(name))
        .map(|name| (*name).to_owned())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(TransformError::MissingColumns {
        missing,
        available: table.column_names().into_iter().map(str::to_owned).collect(),
    })
}

/// Bucket rule used to aggregate finer OHLC rows into a coarser interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleRule {
    /// Fixed-width intraday buckets, labelled by bucket start.
    Minutes(i64),
    /// Weeks ending Sunday, labelled by the Sunday.
    Week,
    /// Calendar months, labelled by the last day of the month.
    Month,
}

impl ResampleRule {
    pub fn lookup(map: ResampleMap, interval: Interval) -> Option<Self> {
        map.iter()
            .find(|(candidate, _)| *candidate == interval)
            .map(|(_, rule)| *rule)
    }

    fn bucket(self, at: PrimitiveDateTime) -> PrimitiveDateTime {
        match self {
            Self::Minutes(width) => {
                let minute_of_day = i64::from(at.hour()) * 60 + i64::from(at.minute());
                let start = minute_of_day - minute_of_day.rem_euclid(width.max(1));
                PrimitiveDateTime::new(at.date(), Time::MIDNIGHT) + Duration::minutes(start)
            }
            Self::Week => {
                let date = at.date();
                let ahead = 6 - i64::from(date.weekday().number_days_from_monday());
                PrimitiveDateTime::new(date + Duration::days(ahead), Time::MIDNIGHT)
            }
            Self::Month => PrimitiveDateTime::new(month_end(at.date()), Time::MIDNIGHT),
        }
    }
}

fn month_end(date: Date) -> Date {
    let (year, month) = (date.year(), date.month());
    let days = month.length(year);
    Date::from_calendar_date(year, month, days).unwrap_or(date)
}

#[derive(Debug)]
struct Bucket {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: i64,
}

/// Aggregate OHLC rows into `rule` buckets. Buckets without rows are not emitted.
pub fn resample_ohlc(table: &Table, rule: ResampleRule) -> Result<Table, TransformError> {
    require_columns(table, &OHLC_COLUMNS)?;
    let mut sorted = table.select(&OHLC_COLUMNS);
    sorted.sort_by_column("time");

    let mut buckets: BTreeMap<PrimitiveDateTime, Bucket> = BTreeMap::new();
    for row in sorted.rows() {
        let Some(at) = row[0].as_datetime() else {
            continue;
        };
        let (open, high, low, close) = (row[1].as_f64(), row[2].as_f64(), row[3].as_f64(), row[4].as_f64());
        let volume = row[5].as_i64().or_else(|| row[5].as_f64().map(|v| v.round() as i64)).unwrap_or(0);

        let bucket = buckets.entry(rule.bucket(at)).or_insert(Bucket {
            open: None,
            high: None,
            low: None,
            close: None,
            volume: 0,
        });
        if bucket.open.is_none() {
            bucket.open = open;
        }
        bucket.high = max_opt(bucket.high, high);
        bucket.low = min_opt(bucket.low, low);
        if close.is_some() {
            bucket.close = close;
        }
        bucket.volume += volume;
    }

    let float = |value: Option<f64>| value.map_or(Cell::Null, Cell::Float);
    let rows = buckets
        .into_iter()
        .map(|(at, bucket)| {
            vec![
                Cell::Datetime(at),
                float(bucket.open),
                float(bucket.high),
                float(bucket.low),
                float(bucket.close),
                Cell::Int(bucket.volume),
            ]
        })
        .collect();

    Ok(Table::new(ohlc_schema(), rows).with_attrs(table.attrs().clone()))
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn ohlc_schema() -> Vec<Column> {
    OHLC_DTYPES
        .iter()
        .map(|(name, dtype)| Column::new(*name, *dtype))
        .collect()
}

/// Round half away from zero to `digits` decimals.
pub fn round_to(value: f64, digits: u8) -> f64 {
    let factor = 10f64.powi(i32::from(digits));
    (value * factor).round() / factor
}

/// Options for [`normalize_ohlc`].
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcOptions {
    /// Divide prices by this value (VND x 1000 quotes).
    pub price_divisor: Option<f64>,
    pub floating: u8,
    pub resample: Option<ResampleRule>,
    pub attrs: TableAttrs,
}

impl Default for OhlcOptions {
    fn default() -> Self {
        Self {
            price_divisor: None,
            floating: 2,
            resample: None,
            attrs: TableAttrs::default(),
        }
    }
}

/// Turn a renamed OHLC table into the canonical `time, open, high, low, close, volume` shape.
pub fn normalize_ohlc(table: Table, options: &OhlcOptions) -> Result<Table, TransformError> {
    if table.is_empty() {
        return Err(TransformError::Empty);
    }
    require_columns(&table, &OHLC_COLUMNS)?;

    let mut table = table.select(&OHLC_COLUMNS);
    cast_columns(&mut table, OHLC_DTYPES);
    if table.dtype("time") != Some(DType::Datetime) {
        return Err(TransformError::InvalidColumn {
            column: String::from("time"),
            operation: "datetime conversion",
        });
    }

    for name in PRICE_COLUMNS {
        let divisor = options.price_divisor.unwrap_or(1.0);
        let floating = options.floating;
        table.map_column(name, DType::Float, |cell| match cell.as_f64() {
            Some(value) => Cell::Float(round_to(value / divisor, floating)),
            None => Cell::Null,
        });
    }

    // Fractional volumes are truncated so the column is always Int.
    table.map_column("volume", DType::Int, |cell| match cast_cell(cell, DType::Float).and_then(|c| c.as_f64()) {
        Some(value) if value.is_finite() => Cell::Int(value.trunc() as i64),
        _ => Cell::Null,
    });

    if let Some(rule) = options.resample {
        table = resample_ohlc(&table, rule)?;
    } else {
        table.sort_by_column("time");
    }

    if table.is_empty() {
        return Err(TransformError::Empty);
    }
    Ok(table.with_attrs(options.attrs.clone()))
}

/// Options for [`normalize_intraday`].
#[derive(Debug, Clone, PartialEq)]
pub struct IntradayOptions {
    pub price_divisor: Option<f64>,
    /// Date for time-only timestamps such as `14:45:00`.
    pub session_date: Date,
    /// Upstream marker for auction trades, relabelled ATO/ATC for stocks.
    pub auction_marker: Option<&'static str>,
    pub attrs: TableAttrs,
}

/// Normalize a tick table: `time, price, volume, match_type` plus any extra mapped columns.
pub fn normalize_intraday(table: Table, map: ColumnMap, options: &IntradayOptions) -> Result<Table, TransformError> {
    if table.is_empty() {
        return Err(TransformError::Empty);
    }
    let mut table = map_columns(&table, map);
    if table.width() == 0 {
        return Err(TransformError::MissingColumns {
            missing: map.iter().map(|(from, _)| (*from).to_owned()).collect(),
            available: Vec::new(),
        });
    }

    let divisor = options.price_divisor.unwrap_or(1.0);
    table.map_column("price", DType::Float, |cell| {
        match cast_cell(cell, DType::Float).and_then(|cast| cast.as_f64()) {
            Some(value) => Cell::Float(value / divisor),
            None => Cell::Null,
        }
    });
    table.map_column("volume", DType::Int, |cell| {
        let value = cast_cell(cell, DType::Float)
            .and_then(|cast| cast.as_f64())
            .unwrap_or(0.0);
        Cell::Int(value.round() as i64)
    });

    let session_date = options.session_date;
    table.map_column("time", DType::Datetime, |cell| match cell {
        Cell::Str(text) if is_time_of_day(text) => {
            parse_time_of_day(text).map_or(Cell::Null, |at| Cell::Datetime(PrimitiveDateTime::new(session_date, at)))
        }
        other => cast_cell(other, DType::Datetime).unwrap_or(Cell::Null),
    });
    table.sort_by_column("time");

    table.map_column("match_type", DType::Str, |cell| match cell {
        Cell::Str(text) => Cell::Str(map_match_type(text).to_owned()),
        Cell::Null => Cell::Null,
        other => Cell::Str(other.to_string()),
    });
    if let (Some(marker), Some(crate::AssetType::Stock)) = (options.auction_marker, options.attrs.category) {
        label_auction_trades(&mut table, marker);
    }

    if table.is_empty() {
        return Err(TransformError::Empty);
    }
    Ok(table.with_attrs(options.attrs.clone()))
}

fn is_time_of_day(text: &str) -> bool {
    text.len() <= 8 && text.contains(':')
}

fn parse_time_of_day(text: &str) -> Option<Time> {
    Time::parse(text.trim(), format_description!("[hour]:[minute]:[second]")).ok()
}

/// Relabel unmarked trades around the opening (09:13-09:17) and closing
/// (14:43-14:47) auctions as `ATO` and `ATC`, one of each per day.
pub fn label_auction_trades(table: &mut Table, marker: &str) {
    let (Some(time_index), Some(type_index)) = (table.column_index("time"), table.column_index("match_type")) else {
        return;
    };

    let mut opening: BTreeMap<Date, (PrimitiveDateTime, usize)> = BTreeMap::new();
    let mut closing: BTreeMap<Date, (PrimitiveDateTime, usize)> = BTreeMap::new();
    for (index, row) in table.rows().iter().enumerate() {
        if row[type_index].as_str() != Some(marker) {
            continue;
        }
        let Some(at) = row[time_index].as_datetime() else {
            continue;
        };
        let (hour, minute) = (at.hour(), at.minute());
        if hour == 9 && (13..=17).contains(&minute) {
            let entry = opening.entry(at.date()).or_insert((at, index));
            if at < entry.0 {
                *entry = (at, index);
            }
        } else if hour == 14 && (43..=47).contains(&minute) {
            let entry = closing.entry(at.date()).or_insert((at, index));
            if at > entry.0 {
                *entry = (at, index);
            }
        }
    }

    let mut labels: Vec<(usize, &str)> = opening.values().map(|(_, index)| (*index, "ATO")).collect();
    labels.extend(closing.values().map(|(_, index)| (*index, "ATC")));
    if labels.is_empty() {
        return;
    }
    let mut cells: Vec<Cell> = table
        .column("match_type")
        .map(|cells| cells.into_iter().cloned().collect())
        .unwrap_or_default();
    for (index, label) in labels {
        if let Some(cell) = cells.get_mut(index) {
            *cell = Cell::Str(label.to_owned());
        }
    }
    table.set_column("match_type", DType::Str, cells);
}

/// Build a table from a JSON body in one step: detect, pivot, rename, cast.
pub fn json_to_table(value: Value, map: Option<ColumnMap>, dtypes: DTypeMap) -> Result<Table, TransformError> {
    let table = RawPayload::detect(value)?.into_table()?;
    let mut table = match map {
        Some(map) => map_columns(&table, map),
        None => table,
    };
    cast_columns(&mut table, dtypes);
    Ok(table)
}

/// Snake-case every column name (keep-all mode for listing and company payloads).
pub fn snake_case_columns(table: &mut Table) {
    table.rename_with(camel_to_snake);
}
