//! Canonical record table returned by every provider operation.
//!
//! A [`Table`] is an ordered list of named, typed columns plus rows of
//! [`Cell`] values. Metadata such as the symbol and source travels in
//! [`TableAttrs`] rather than as columns.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use time::{Date, PrimitiveDateTime};

use crate::domain::dates::format_date;
use crate::{AssetType, Interval};

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Datetime,
    Date,
    Float,
    Int,
    Bool,
    Str,
}

impl DType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Str => "str",
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Datetime(PrimitiveDateTime),
    Date(Date),
}

impl Cell {
    /// Convert a JSON scalar. Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Self::Int(int),
                None => number.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(text) => Self::Str(text.clone()),
            Value::Array(_) | Value::Object(_) => Self::Str(value.to_string()),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Natural dtype of this cell, `None` for nulls.
    pub const fn dtype(&self) -> Option<DType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DType::Bool),
            Self::Int(_) => Some(DType::Int),
            Self::Float(_) => Some(DType::Float),
            Self::Str(_) => Some(DType::Str),
            Self::Datetime(_) => Some(DType::Datetime),
            Self::Date(_) => Some(DType::Date),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_datetime(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Datetime(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            Self::Datetime(value) => Some(value.date()),
            _ => None,
        }
    }

    /// JSON rendering used by record serialization.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Int(value) => Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Str(value) => Value::String(value.clone()),
            Self::Datetime(value) => Value::String(format_datetime(*value)),
            Self::Date(value) => Value::String(format_date(*value)),
        }
    }

    /// Ordering for sorts. Nulls sort last; values of unrelated kinds compare equal.
    pub fn cmp_loose(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Datetime(a), Self::Datetime(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str(""),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Datetime(value) => f.write_str(&format_datetime(*value)),
            Self::Date(value) => f.write_str(&format_date(*value)),
        }
    }
}

fn format_datetime(value: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(value.date()),
        value.hour(),
        value.minute(),
        value.second()
    )
}

/// Infer one dtype for a column. Int widens to Float; any other mix falls back to Str.
pub fn infer_dtype<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> DType {
    let mut seen: Option<DType> = None;
    for cell in cells {
        let Some(dtype) = cell.dtype() else {
            continue;
        };
        seen = Some(match (seen, dtype) {
            (None, dtype) => dtype,
            (Some(current), next) if current == next => current,
            (Some(DType::Int), DType::Float) | (Some(DType::Float), DType::Int) => DType::Float,
            _ => return DType::Str,
        });
    }
    seen.unwrap_or(DType::Str)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Side-channel metadata attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableAttrs {
    pub symbol: Option<String>,
    pub source: Option<String>,
    pub interval: Option<Interval>,
    pub category: Option<AssetType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
    attrs: TableAttrs,
}

impl Table {
    /// Build from columns and rows; short rows are padded with nulls and long rows truncated.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();
        Self {
            columns,
            rows,
            attrs: TableAttrs::default(),
        }
    }

    /// Build from JSON objects. Columns follow first appearance; missing keys become nulls.
    pub fn from_json_rows(records: &[Map<String, Value>]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for record in records {
            for key in record.keys() {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), names.len());
                    names.push(key.clone());
                }
            }
        }

        let rows: Vec<Vec<Cell>> = records
            .iter()
            .map(|record| {
                let mut row = vec![Cell::Null; names.len()];
                for (key, value) in record {
                    if let Some(index) = positions.get(key) {
                        row[*index] = Cell::from_json(value);
                    }
                }
                row
            })
            .collect();

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let dtype = infer_dtype(rows.iter().map(|row| &row[index]));
                Column::new(name, dtype)
            })
            .collect();

        Self {
            columns,
            rows,
            attrs: TableAttrs::default(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.column_index(name).map(|index| self.columns[index].dtype)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|values| &values[index])
    }

    pub fn attrs(&self) -> &TableAttrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut TableAttrs {
        &mut self.attrs
    }

    pub fn with_attrs(mut self, attrs: TableAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Rename columns per `(from, to)` pairs. Unknown names are ignored.
    pub fn rename(&mut self, mapping: &[(&str, &str)]) {
        for column in &mut self.columns {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| *from == column.name) {
                column.name = (*to).to_owned();
            }
        }
    }

    /// Apply `f` to every column name.
    pub fn rename_with(&mut self, mut f: impl FnMut(&str) -> String) {
        for column in &mut self.columns {
            column.name = f(&column.name);
        }
    }

    /// Keep the named columns in the given order. Absent names are skipped.
    pub fn select(&self, names: &[&str]) -> Self {
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        self.project(&indices)
    }

    fn project(&self, indices: &[usize]) -> Self {
        let columns = indices.iter().map(|index| self.columns[*index].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|index| row[*index].clone()).collect())
            .collect();
        Self {
            columns,
            rows,
            attrs: self.attrs.clone(),
        }
    }

    /// Remove every column whose name satisfies `predicate`.
    pub fn drop_columns_where(&mut self, predicate: impl Fn(&str) -> bool) {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !predicate(&column.name))
            .map(|(index, _)| index)
            .collect();
        if keep.len() != self.columns.len() {
            *self = self.project(&keep);
        }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        self.drop_columns_where(|name| names.contains(&name));
    }

    /// Move the named columns to the front, in order, keeping the rest behind them.
    pub fn reorder_first(&mut self, names: &[&str]) {
        let mut order: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        for index in 0..self.columns.len() {
            if !order.contains(&index) {
                order.push(index);
            }
        }
        *self = self.project(&order);
    }

    /// Replace a column's cells and dtype, or append a new column.
    pub fn set_column(&mut self, name: &str, dtype: DType, cells: Vec<Cell>) {
        let mut cells = cells;
        cells.resize(self.rows.len(), Cell::Null);
        match self.column_index(name) {
            Some(index) => {
                self.columns[index].dtype = dtype;
                for (row, cell) in self.rows.iter_mut().zip(cells) {
                    row[index] = cell;
                }
            }
            None => {
                self.columns.push(Column::new(name, dtype));
                for (row, cell) in self.rows.iter_mut().zip(cells) {
                    row.push(cell);
                }
            }
        }
    }

    /// Rewrite every cell of a column in place.
    pub fn map_column(&mut self, name: &str, dtype: DType, mut f: impl FnMut(&Cell) -> Cell) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.columns[index].dtype = dtype;
        for row in &mut self.rows {
            row[index] = f(&row[index]);
        }
        true
    }

    /// Keep rows where the named column satisfies `predicate`. A missing column keeps every row.
    pub fn retain_where(&mut self, name: &str, mut predicate: impl FnMut(&Cell) -> bool) {
        if let Some(index) = self.column_index(name) {
            self.rows.retain(|row| predicate(&row[index]));
        }
    }

    /// Keep rows whose named columns are all non-null.
    pub fn drop_nulls(&mut self, names: &[&str]) {
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        self.rows
            .retain(|row| indices.iter().all(|index| !row[*index].is_null()));
    }

    /// Stable ascending sort on one column.
    pub fn sort_by_column(&mut self, name: &str) {
        if let Some(index) = self.column_index(name) {
            self.rows.sort_by(|a, b| a[index].cmp_loose(&b[index]));
        }
    }

    /// Descending sort; nulls still sort last.
    pub fn sort_by_column_desc(&mut self, name: &str) {
        if let Some(index) = self.column_index(name) {
            self.rows.sort_by(|a, b| match (&a[index], &b[index]) {
                (Cell::Null, _) | (_, Cell::Null) => a[index].cmp_loose(&b[index]),
                (x, y) => y.cmp_loose(x),
            });
        }
    }

    /// Keep the last `n` rows.
    pub fn tail(&mut self, n: usize) {
        if self.rows.len() > n {
            let skip = self.rows.len() - n;
            self.rows.drain(..skip);
        }
    }

    /// Stack tables vertically. Columns are the union in first-seen order;
    /// attributes come from the first table.
    pub fn concat(tables: Vec<Table>) -> Self {
        let mut columns: Vec<Column> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                match columns.iter_mut().find(|existing| existing.name == column.name) {
                    Some(existing) if existing.dtype != column.dtype => {
                        existing.dtype = widen(existing.dtype, column.dtype);
                    }
                    Some(_) => {}
                    None => columns.push(column.clone()),
                }
            }
        }

        let attrs = tables
            .first()
            .map(|table| table.attrs.clone())
            .unwrap_or_default();
        let mut rows = Vec::new();
        for table in tables {
            let mapping: Vec<Option<usize>> = columns
                .iter()
                .map(|column| table.column_index(&column.name))
                .collect();
            for row in table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|index| index.map_or(Cell::Null, |index| row[index].clone()))
                        .collect(),
                );
            }
        }

        Self {
            columns,
            rows,
            attrs,
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.name.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }
}

fn widen(a: DType, b: DType) -> DType {
    match (a, b) {
        (DType::Int, DType::Float) | (DType::Float, DType::Int) => DType::Float,
        _ => DType::Str,
    }
}

impl Serialize for Table {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for record in self.to_records() {
            seq.serialize_element(&record)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn records(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .expect("array")
            .iter()
            .map(|item| item.as_object().expect("object").clone())
            .collect()
    }

    #[test]
    fn builds_from_rows_with_inferred_dtypes() {
        let table = Table::from_json_rows(&records(json!([
            {"symbol": "ACB", "price": 10, "flag": true},
            {"symbol": "VNM", "price": 10.5, "extra": "x"}
        ])));

        assert_eq!(table.column_names(), vec!["symbol", "price", "flag", "extra"]);
        assert_eq!(table.dtype("price"), Some(DType::Float));
        assert_eq!(table.dtype("flag"), Some(DType::Bool));
        assert_eq!(table.cell(0, "extra"), Some(&Cell::Null));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn select_skips_missing_and_keeps_order() {
        let table = Table::from_json_rows(&records(json!([{"a": 1, "b": 2, "c": 3}])));
        let selected = table.select(&["c", "missing", "a"]);
        assert_eq!(selected.column_names(), vec!["c", "a"]);
    }

    #[test]
    fn reorder_and_drop_columns() {
        let mut table = Table::from_json_rows(&records(json!([{"a": 1, "en_b": 2, "c": 3}])));
        table.drop_columns_where(|name| name.starts_with("en_"));
        table.reorder_first(&["c"]);
        assert_eq!(table.column_names(), vec!["c", "a"]);
    }

    #[test]
    fn concat_unions_columns_and_widens_numbers() {
        let first = Table::from_json_rows(&records(json!([{"a": 1}])));
        let second = Table::from_json_rows(&records(json!([{"a": 1.5, "b": "x"}])));
        let joined = Table::concat(vec![first, second]);

        assert_eq!(joined.column_names(), vec!["a", "b"]);
        assert_eq!(joined.dtype("a"), Some(DType::Float));
        assert_eq!(joined.cell(0, "b"), Some(&Cell::Null));
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn tail_and_sort() {
        let mut table = Table::from_json_rows(&records(json!([{"v": 3}, {"v": 1}, {"v": 2}])));
        table.sort_by_column("v");
        table.tail(2);
        let values: Vec<i64> = table
            .column("v")
            .expect("column")
            .iter()
            .filter_map(|cell| cell.as_i64())
            .collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn descending_sort_keeps_nulls_last() {
        let mut table = Table::from_json_rows(&records(json!([{"v": 1}, {"v": null}, {"v": 5}, {"v": 3}])));
        table.sort_by_column_desc("v");
        let values: Vec<Option<i64>> = table
            .column("v")
            .expect("column")
            .iter()
            .map(|cell| cell.as_i64())
            .collect();
        assert_eq!(values, vec![Some(5), Some(3), Some(1), None]);
    }

    #[test]
    fn serializes_as_records() {
        let table = Table::new(
            vec![Column::new("time", DType::Datetime), Column::new("close", DType::Float)],
            vec![vec![
                Cell::Datetime(datetime!(2024-01-02 09:15:00)),
                Cell::Float(25.3),
            ]],
        );
        let encoded = serde_json::to_value(&table).expect("serialize");
        assert_eq!(encoded, json!([{"time": "2024-01-02 09:15:00", "close": 25.3}]));
    }
}
