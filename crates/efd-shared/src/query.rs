//! InfluxQL query for the latest sample of one EFD topic.

use crate::error::EfdError;
use crate::sample::StreamFields;
use std::fmt;
use std::str::FromStr;

/// Trailing window the query looks back over
pub const DEFAULT_QUERY_WINDOW: &str = "2m";

/// Database holding the SAL topics
pub const DEFAULT_DATABASE: &str = "efd";

pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// M1M3 force actuator telemetry topic
pub const DEFAULT_TOPIC: &str = "lsst.sal.MTM1M3.forceActuatorData";

/// InfluxQL duration units
const UNITS: &[&str] = &["ns", "u", "µ", "ms", "s", "m", "h", "d", "w"];

/// An InfluxQL duration literal such as `2m` or `90s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    amount: u64,
    unit: &'static str,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            amount: 2,
            unit: "m",
        }
    }
}

impl FromStr for QueryWindow {
    type Err = EfdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| EfdError::InvalidWindow(s.to_string()))?;
        let (digits, unit) = s.split_at(split);

        let amount: u64 = digits
            .parse()
            .map_err(|_| EfdError::InvalidWindow(s.to_string()))?;
        if amount == 0 {
            return Err(EfdError::InvalidWindow(s.to_string()));
        }

        let unit = UNITS
            .iter()
            .copied()
            .find(|u| *u == unit)
            .ok_or_else(|| EfdError::InvalidWindow(s.to_string()))?;

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

/// Query for every row of one topic inside a trailing window.
/// The caller keeps only the last row.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSampleQuery {
    pub database: String,
    pub retention_policy: String,
    pub topic: String,
    pub window: QueryWindow,
    /// Columns to select, in SELECT order
    pub columns: Vec<String>,
}

impl Default for LatestSampleQuery {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            window: QueryWindow::default(),
            columns: select_order().iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Columns in the order the EFD query has always selected them
fn select_order() -> [&'static str; 4] {
    let [snd, seq, kafka, rcv] = StreamFields::columns();
    [seq, rcv, snd, kafka]
}

impl LatestSampleQuery {
    pub fn to_influxql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "SELECT {} FROM {}.{}.{} WHERE time > now() - {}",
            columns,
            quote_ident(&self.database),
            quote_ident(&self.retention_policy),
            quote_ident(&self.topic),
            self.window
        )
    }
}

/// Double-quote an InfluxQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}
