//! Typed trend report rows and measurement extraction.
//!
//! A trend report groups per-run measurements into three row families
//! (transactions, monitors, regular counters). Callers ask for one
//! `(DataType, PctType, Measurement)` slice and get back an ordered list of
//! `name -> value` pairs. The set of measurements each row family carries is
//! fixed here; asking for one it does not carry is an error rather than a
//! silent gap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Row family of a trend report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Transaction,
    Monitor,
    Regular,
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "transaction" | "transactions" => Ok(DataType::Transaction),
            "monitor" | "monitors" => Ok(DataType::Monitor),
            "regular" => Ok(DataType::Regular),
            _ => Err(format!("unknown data type '{}'", s)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Transaction => "Transaction",
            DataType::Monitor => "Monitor",
            DataType::Regular => "Regular",
        };
        f.write_str(name)
    }
}

/// Measurement category tag carried by each row (`PCT_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PctType {
    /// Transaction response time
    #[serde(rename = "TRT")]
    Trt,
    /// Transactions per second
    #[serde(rename = "TPS")]
    Tps,
    /// Transaction summary
    #[serde(rename = "TRS")]
    Trs,
    /// User defined data points
    #[serde(rename = "UDP")]
    Udp,
    /// Running virtual users
    #[serde(rename = "VU")]
    Vu,
    /// Web resources
    #[serde(rename = "WEB")]
    Web,
}

impl PctType {
    pub fn as_str(self) -> &'static str {
        match self {
            PctType::Trt => "TRT",
            PctType::Tps => "TPS",
            PctType::Trs => "TRS",
            PctType::Udp => "UDP",
            PctType::Vu => "VU",
            PctType::Web => "WEB",
        }
    }
}

impl fmt::Display for PctType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PctType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "trt" => Ok(PctType::Trt),
            "tps" => Ok(PctType::Tps),
            "trs" => Ok(PctType::Trs),
            "udp" => Ok(PctType::Udp),
            "vu" => Ok(PctType::Vu),
            "web" => Ok(PctType::Web),
            _ => Err(format!("unknown measurement type '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measurement {
    Minimum,
    Maximum,
    Average,
    Median,
    StdDeviation,
    Count,
    Sum,
    Percentile25,
    Percentile75,
    Percentile90,
    Percentile95,
    Percentile99,
}

impl Measurement {
    /// Column name used by the service
    pub fn as_str(self) -> &'static str {
        match self {
            Measurement::Minimum => "PCT_MINIMUM",
            Measurement::Maximum => "PCT_MAXIMUM",
            Measurement::Average => "PCT_AVERAGE",
            Measurement::Median => "PCT_MEDIAN",
            Measurement::StdDeviation => "PCT_STDDEVIATION",
            Measurement::Count => "PCT_COUNT1",
            Measurement::Sum => "PCT_SUM1",
            Measurement::Percentile25 => "PCT_PERCENTILE_25",
            Measurement::Percentile75 => "PCT_PERCENTILE_75",
            Measurement::Percentile90 => "PCT_PERCENTILE_90",
            Measurement::Percentile95 => "PCT_PERCENTILE_95",
            Measurement::Percentile99 => "PCT_PERCENTILE_99",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measurement {
    type Err = String;

    /// Accepts `average`, `PCT_AVERAGE`, `p90`, `percentile-90` and similar forms
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        let key = normalized.strip_prefix("pct").unwrap_or(&normalized);
        match key {
            "minimum" | "min" => Ok(Measurement::Minimum),
            "maximum" | "max" => Ok(Measurement::Maximum),
            "average" | "avg" => Ok(Measurement::Average),
            "median" => Ok(Measurement::Median),
            "stddeviation" | "stddev" => Ok(Measurement::StdDeviation),
            "count" | "count1" => Ok(Measurement::Count),
            "sum" | "sum1" => Ok(Measurement::Sum),
            "percentile25" | "p25" => Ok(Measurement::Percentile25),
            "percentile75" | "p75" => Ok(Measurement::Percentile75),
            "percentile90" | "p90" => Ok(Measurement::Percentile90),
            "percentile95" | "p95" => Ok(Measurement::Percentile95),
            "percentile99" | "p99" => Ok(Measurement::Percentile99),
            _ => Err(format!("unknown measurement '{}'", s)),
        }
    }
}

/// Requested measurement is not carried by the row family
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{data_type} rows do not carry {measurement}")]
pub struct UnmappedMeasurement {
    pub data_type: DataType,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionDataRow {
    #[serde(rename = "PCT_TYPE")]
    pub pct_type: String,
    #[serde(rename = "PCT_NAME")]
    pub pct_name: String,
    #[serde(rename = "PCT_MINIMUM", default)]
    pub minimum: Option<f64>,
    #[serde(rename = "PCT_MAXIMUM", default)]
    pub maximum: Option<f64>,
    #[serde(rename = "PCT_AVERAGE", default)]
    pub average: Option<f64>,
    #[serde(rename = "PCT_MEDIAN", default)]
    pub median: Option<f64>,
    #[serde(rename = "PCT_STDDEVIATION", default)]
    pub std_deviation: Option<f64>,
    #[serde(rename = "PCT_COUNT1", default)]
    pub count: Option<f64>,
    #[serde(rename = "PCT_SUM1", default)]
    pub sum: Option<f64>,
    #[serde(rename = "PCT_PERCENTILE_25", default)]
    pub percentile_25: Option<f64>,
    #[serde(rename = "PCT_PERCENTILE_75", default)]
    pub percentile_75: Option<f64>,
    #[serde(rename = "PCT_PERCENTILE_90", default)]
    pub percentile_90: Option<f64>,
    #[serde(rename = "PCT_PERCENTILE_95", default)]
    pub percentile_95: Option<f64>,
    #[serde(rename = "PCT_PERCENTILE_99", default)]
    pub percentile_99: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitorDataRow {
    #[serde(rename = "PCT_TYPE")]
    pub pct_type: String,
    #[serde(rename = "PCT_NAME")]
    pub pct_name: String,
    #[serde(rename = "PCT_MINIMUM", default)]
    pub minimum: Option<f64>,
    #[serde(rename = "PCT_MAXIMUM", default)]
    pub maximum: Option<f64>,
    #[serde(rename = "PCT_AVERAGE", default)]
    pub average: Option<f64>,
    #[serde(rename = "PCT_MEDIAN", default)]
    pub median: Option<f64>,
    #[serde(rename = "PCT_STDDEVIATION", default)]
    pub std_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegularDataRow {
    #[serde(rename = "PCT_TYPE")]
    pub pct_type: String,
    #[serde(rename = "PCT_NAME")]
    pub pct_name: String,
    #[serde(rename = "PCT_MINIMUM", default)]
    pub minimum: Option<f64>,
    #[serde(rename = "PCT_MAXIMUM", default)]
    pub maximum: Option<f64>,
    #[serde(rename = "PCT_AVERAGE", default)]
    pub average: Option<f64>,
    #[serde(rename = "PCT_MEDIAN", default)]
    pub median: Option<f64>,
    #[serde(rename = "PCT_STDDEVIATION", default)]
    pub std_deviation: Option<f64>,
    #[serde(rename = "PCT_COUNT1", default)]
    pub count: Option<f64>,
    #[serde(rename = "PCT_SUM1", default)]
    pub sum: Option<f64>,
}

/// Trend data for one run, as returned by the service
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendReportData {
    #[serde(rename = "TransactionRows", default)]
    pub transactions: Vec<TransactionDataRow>,
    #[serde(rename = "MonitorRows", default)]
    pub monitors: Vec<MonitorDataRow>,
    #[serde(rename = "RegularRows", default)]
    pub regular: Vec<RegularDataRow>,
}

type Accessor<R> = fn(&R) -> Option<f64>;

fn transaction_accessor(measurement: Measurement) -> Option<Accessor<TransactionDataRow>> {
    let accessor: Accessor<TransactionDataRow> = match measurement {
        Measurement::Minimum => |r| r.minimum,
        Measurement::Maximum => |r| r.maximum,
        Measurement::Average => |r| r.average,
        Measurement::Median => |r| r.median,
        Measurement::StdDeviation => |r| r.std_deviation,
        Measurement::Count => |r| r.count,
        Measurement::Sum => |r| r.sum,
        Measurement::Percentile25 => |r| r.percentile_25,
        Measurement::Percentile75 => |r| r.percentile_75,
        Measurement::Percentile90 => |r| r.percentile_90,
        Measurement::Percentile95 => |r| r.percentile_95,
        Measurement::Percentile99 => |r| r.percentile_99,
    };
    Some(accessor)
}

fn monitor_accessor(measurement: Measurement) -> Option<Accessor<MonitorDataRow>> {
    let accessor: Accessor<MonitorDataRow> = match measurement {
        Measurement::Minimum => |r| r.minimum,
        Measurement::Maximum => |r| r.maximum,
        Measurement::Average => |r| r.average,
        Measurement::Median => |r| r.median,
        Measurement::StdDeviation => |r| r.std_deviation,
        _ => return None,
    };
    Some(accessor)
}

fn regular_accessor(measurement: Measurement) -> Option<Accessor<RegularDataRow>> {
    let accessor: Accessor<RegularDataRow> = match measurement {
        Measurement::Minimum => |r| r.minimum,
        Measurement::Maximum => |r| r.maximum,
        Measurement::Average => |r| r.average,
        Measurement::Median => |r| r.median,
        Measurement::StdDeviation => |r| r.std_deviation,
        Measurement::Count => |r| r.count,
        Measurement::Sum => |r| r.sum,
        _ => return None,
    };
    Some(accessor)
}

/// Ordered `name -> value` pairs extracted from a trend report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TrendMeasurements {
    entries: Vec<(String, String)>,
}

impl TrendMeasurements {
    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Value of the first entry named `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn collect_rows<R>(
    out: &mut TrendMeasurements,
    rows: &[R],
    pct_type: PctType,
    accessor: Accessor<R>,
    tag: fn(&R) -> (&str, &str),
) {
    for row in rows {
        let (row_type, name) = tag(row);
        if row_type == pct_type.as_str() {
            let value = accessor(row).map(|v| v.to_string()).unwrap_or_default();
            out.push(name, value);
        }
    }
}

/// Extract one measurement column for every row of a given family and type.
///
/// The first two entries identify the slice: `RunId` (`_<id>_`) and
/// `Trend Measurement Type` (`<measurement>_<pct type>`).
pub fn extract_measurements(
    data: &TrendReportData,
    run_id: u32,
    data_type: DataType,
    pct_type: PctType,
    measurement: Measurement,
) -> Result<TrendMeasurements, UnmappedMeasurement> {
    let unmapped = UnmappedMeasurement {
        data_type,
        measurement,
    };

    let mut out = TrendMeasurements::default();
    out.push("RunId", format!("_{}_", run_id));
    out.push(
        "Trend Measurement Type",
        format!("{}_{}", measurement, pct_type),
    );

    match data_type {
        DataType::Transaction => {
            let accessor = transaction_accessor(measurement).ok_or(unmapped)?;
            collect_rows(&mut out, &data.transactions, pct_type, accessor, |r| {
                (r.pct_type.as_str(), r.pct_name.as_str())
            });
        }
        DataType::Monitor => {
            let accessor = monitor_accessor(measurement).ok_or(unmapped)?;
            collect_rows(&mut out, &data.monitors, pct_type, accessor, |r| {
                (r.pct_type.as_str(), r.pct_name.as_str())
            });
        }
        DataType::Regular => {
            let accessor = regular_accessor(measurement).ok_or(unmapped)?;
            collect_rows(&mut out, &data.regular, pct_type, accessor, |r| {
                (r.pct_type.as_str(), r.pct_name.as_str())
            });
        }
    }

    Ok(out)
}
