//! Samples captured by one polling iteration.
//!
//! A field is either present (`Some(FieldValue)`) or missing (`None`).
//! Missing fields only become the text `nan` when a log line is rendered,
//! so a genuine NaN coming out of the EFD stays distinguishable in memory.

use std::fmt;

/// EFD column holding the sender (CSC) timestamp
pub const SND_STAMP_COLUMN: &str = "private_sndStamp";

/// EFD column holding the message sequence number
pub const SEQ_NUM_COLUMN: &str = "private_seqNum";

/// EFD column holding the Kafka broker timestamp
pub const KAFKA_STAMP_COLUMN: &str = "private_kafkaStamp";

/// EFD column holding the receipt timestamp
pub const RCV_STAMP_COLUMN: &str = "private_rcvStamp";

/// Text written for a missing field
pub const MISSING_TEXT: &str = "nan";

/// Separator between fields of a log line
pub const FIELD_SEPARATOR: &str = ", ";

/// A single value read from an EFD column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

/// Format a float so it always reads as a float: `1.0` rather than `1`,
/// `nan`/`inf` for non-finite values, `1e+20` style exponents.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let repr = format!("{:?}", v);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

/// Render an optional field, using `nan` for missing.
pub fn render_field(field: &Option<FieldValue>) -> String {
    match field {
        Some(v) => v.to_string(),
        None => MISSING_TEXT.to_string(),
    }
}

/// The four stream fields in their fixed log order:
/// sender timestamp, sequence number, broker timestamp, receipt timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFields {
    pub sender_timestamp: Option<FieldValue>,
    pub sequence_number: Option<FieldValue>,
    pub broker_timestamp: Option<FieldValue>,
    pub receipt_timestamp: Option<FieldValue>,
}

impl StreamFields {
    /// All four fields missing (query returned no rows)
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn new(
        sender_timestamp: FieldValue,
        sequence_number: FieldValue,
        broker_timestamp: FieldValue,
        receipt_timestamp: FieldValue,
    ) -> Self {
        Self {
            sender_timestamp: Some(sender_timestamp),
            sequence_number: Some(sequence_number),
            broker_timestamp: Some(broker_timestamp),
            receipt_timestamp: Some(receipt_timestamp),
        }
    }

    /// EFD column names in log order
    pub fn columns() -> [&'static str; 4] {
        [
            SND_STAMP_COLUMN,
            SEQ_NUM_COLUMN,
            KAFKA_STAMP_COLUMN,
            RCV_STAMP_COLUMN,
        ]
    }

    pub fn is_missing(&self) -> bool {
        self.as_array().iter().all(|f| f.is_none())
    }

    pub fn as_array(&self) -> [&Option<FieldValue>; 4] {
        [
            &self.sender_timestamp,
            &self.sequence_number,
            &self.broker_timestamp,
            &self.receipt_timestamp,
        ]
    }

    /// Fields joined with ", ", missing ones as `nan`
    pub fn render(&self) -> String {
        self.as_array()
            .iter()
            .map(|f| render_field(f))
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR)
    }
}

/// One polling iteration: when the query went out, when it came back,
/// and what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch, captured before issuing the query
    pub query_issued_at: f64,
    /// Seconds since the Unix epoch, captured after the response arrived
    pub query_completed_at: f64,
    pub fields: StreamFields,
}

impl Sample {
    pub fn new(query_issued_at: f64, query_completed_at: f64, fields: StreamFields) -> Self {
        Self {
            query_issued_at,
            query_completed_at,
            fields,
        }
    }

    /// Round-trip query latency in seconds
    pub fn latency(&self) -> f64 {
        self.query_completed_at - self.query_issued_at
    }

    /// `issued, completed, snd, seq, kafka, rcv` (no trailing newline)
    pub fn to_log_line(&self) -> String {
        format!(
            "{}{}{}{}{}",
            format_float(self.query_issued_at),
            FIELD_SEPARATOR,
            format_float(self.query_completed_at),
            FIELD_SEPARATOR,
            self.fields.render()
        )
    }
}
