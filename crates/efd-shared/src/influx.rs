//! Decoding of InfluxDB 1.x `/query` responses.
//!
//! Body shape:
//! `{"results":[{"statement_id":0,"series":[{"name":..,"columns":[..],"values":[[..]]}]}]}`
//! A statement without `series` matched no rows.

use crate::error::EfdError;
use crate::sample::{FieldValue, StreamFields};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl QueryResponse {
    pub fn from_json(body: &str) -> Result<Self, EfdError> {
        let response: QueryResponse = serde_json::from_str(body)?;
        if let Some(err) = &response.error {
            return Err(EfdError::Query(err.clone()));
        }
        if let Some(err) = response.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(EfdError::Query(err.clone()));
        }
        Ok(response)
    }

    /// First series of the first statement, or an empty table
    pub fn into_table(self) -> ResultTable {
        self.results
            .into_iter()
            .next()
            .and_then(|r| r.series.into_iter().next())
            .map(ResultTable::from)
            .unwrap_or_default()
    }
}

/// Column-addressable rows of one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl From<Series> for ResultTable {
    fn from(series: Series) -> Self {
        Self {
            name: series.name,
            columns: series.columns,
            rows: series.values,
        }
    }
}

impl ResultTable {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: String::new(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Numeric value of `column` in the last row.
    /// `Ok(None)` when the table is empty or the cell is null; any other
    /// non-numeric cell is an error so it can never reach a log line.
    pub fn last_row_value(&self, column: &str) -> Result<Option<FieldValue>, EfdError> {
        let Some(row) = self.rows.last() else {
            return Ok(None);
        };
        let idx = self
            .column_index(column)
            .ok_or_else(|| EfdError::MissingColumn(column.to_string()))?;

        match row.get(idx) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(match n.as_i64() {
                Some(i) => Some(FieldValue::Integer(i)),
                None => n.as_f64().map(FieldValue::Float),
            }),
            Some(other) => Err(EfdError::NonNumeric {
                column: column.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl StreamFields {
    /// Last row's four fields in log order; all missing for an empty table.
    pub fn from_table(table: &ResultTable) -> Result<Self, EfdError> {
        if table.is_empty() {
            return Ok(Self::missing());
        }
        let [snd, seq, kafka, rcv] = Self::columns();
        Ok(Self {
            sender_timestamp: table.last_row_value(snd)?.map(into_stamp),
            sequence_number: table.last_row_value(seq)?,
            broker_timestamp: table.last_row_value(kafka)?.map(into_stamp),
            receipt_timestamp: table.last_row_value(rcv)?.map(into_stamp),
        })
    }
}

/// Stamp columns are float seconds; InfluxDB drops the `.0` of whole values.
fn into_stamp(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Integer(i) => FieldValue::Float(i as f64),
        other => other,
    }
}
