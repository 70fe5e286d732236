use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;

/// A normalized cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Missing
        }
    }

    pub fn from_opt(n: Option<f64>) -> Self {
        n.map(Value::number).unwrap_or(Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Display form used for keys (class names, ids) regardless of cell type.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Number(n) => Some(crate::grid::format_number(*n)),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Ordered, named columns over row-major values.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Table {
            columns,
            index,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Rows shorter than the header are padded with `Missing`.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn push_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or(Value::Missing));
        }
    }

    pub fn value(&self, row: usize, name: &str) -> &Value {
        static MISSING: Value = Value::Missing;
        self.column_index(name)
            .and_then(|c| self.rows.get(row).and_then(|r| r.get(c)))
            .unwrap_or(&MISSING)
    }

    pub fn number(&self, row: usize, name: &str) -> Option<f64> {
        self.value(row, name).as_f64()
    }

    pub fn text(&self, row: usize, name: &str) -> Option<String> {
        self.value(row, name).key_text()
    }

    /// `None` when the column does not exist; per-row `None` when the cell is missing.
    pub fn numbers(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let c = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[c].as_f64()).collect())
    }

    pub fn rename_columns<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(c)).collect();
        self.index = renamed
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        self.columns = renamed;
    }

    /// New table with the given columns in the given order. Unknown names are skipped.
    pub fn select(&self, names: &[String]) -> Table {
        let picks: Vec<(String, usize)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (n.clone(), i)))
            .collect();
        let mut out = Table::new(picks.iter().map(|(n, _)| n.clone()).collect());
        for row in &self.rows {
            out.rows
                .push(picks.iter().map(|(_, i)| row[*i].clone()).collect());
        }
        out
    }

    pub fn row_json(&self, row: usize) -> serde_json::Map<String, serde_json::Value> {
        let mut obj = serde_json::Map::new();
        if let Some(r) = self.rows.get(row) {
            for (name, v) in self.columns.iter().zip(r) {
                obj.insert(
                    name.clone(),
                    serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
                );
            }
        }
        obj
    }
}

/// Arithmetic mean over the present values, `None` when there are none.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0;
    let mut count: usize = 0;
    for v in values.into_iter().flatten() {
        sum += v;
        count += 1;
    }
    if count > 0 {
        Some(sum / count as f64)
    } else {
        None
    }
}
