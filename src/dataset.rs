use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayD};

use crate::error::{Error, Result};

/// A scalar metadata value attached to a measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl MetaValue {
    /// Numeric view of the value; `None` for booleans and text.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            MetaValue::Float(x) => Some(x),
            MetaValue::Int(x) => Some(x as f64),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            MetaValue::Float(_) => "float",
            MetaValue::Int(_) => "int",
            MetaValue::Bool(_) => "bool",
            MetaValue::Text(_) => "str",
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetaValue::Float(x) => write!(f, "{:e}", x),
            MetaValue::Int(x) => write!(f, "{}", x),
            MetaValue::Bool(x) => write!(f, "{}", x),
            MetaValue::Text(x) => write!(f, "{}", x),
        }
    }
}

/// The kinds of binned measurement the tools know how to average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Power1d,
    Power2d,
    Corr1d,
    Corr2d,
}

impl ResultKind {
    pub const NAMES: [&'static str; 4] = [
        "Corr1dDataSet",
        "Corr2dDataSet",
        "Power1dDataSet",
        "Power2dDataSet",
    ];

    pub fn ndim(self) -> usize {
        match self {
            ResultKind::Power1d | ResultKind::Corr1d => 1,
            ResultKind::Power2d | ResultKind::Corr2d => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultKind::Power1d => "Power1dDataSet",
            ResultKind::Power2d => "Power2dDataSet",
            ResultKind::Corr1d => "Corr1dDataSet",
            ResultKind::Corr2d => "Corr2dDataSet",
        }
    }

    pub fn power(ndim: usize) -> ResultKind {
        if ndim == 2 {
            ResultKind::Power2d
        } else {
            ResultKind::Power1d
        }
    }
}

impl FromStr for ResultKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<ResultKind> {
        match s {
            "Power1dDataSet" => Ok(ResultKind::Power1d),
            "Power2dDataSet" => Ok(ResultKind::Power2d),
            "Corr1dDataSet" => Ok(ResultKind::Corr1d),
            "Corr2dDataSet" => Ok(ResultKind::Corr2d),
            _ => Err(Error::validation(format!(
                "`class` must be one of {:?}, got `{}`",
                ResultKind::NAMES,
                s
            ))),
        }
    }
}

/// A binned measurement: named columns of identical shape, optional bin
/// edges per dimension, and scalar metadata.
#[derive(Debug, Clone)]
pub struct MeasurementResult {
    shape: Vec<usize>,
    columns: Vec<(String, ArrayD<f64>)>,
    edges: Vec<Array1<f64>>,
    pub attrs: BTreeMap<String, MetaValue>,
}

impl MeasurementResult {
    pub fn new(
        columns: Vec<(String, ArrayD<f64>)>,
        attrs: BTreeMap<String, MetaValue>,
    ) -> Result<MeasurementResult> {
        let shape = match columns.first() {
            Some((_, data)) => data.shape().to_vec(),
            None => return Err(Error::validation("a result needs at least one column")),
        };
        for (i, (name, data)) in columns.iter().enumerate() {
            if data.shape() != &shape[..] {
                return Err(Error::validation(format!(
                    "column `{}` has shape {:?}, expected {:?}",
                    name,
                    data.shape(),
                    shape
                )));
            }
            if columns[..i].iter().any(|(n, _)| n == name) {
                return Err(Error::validation(format!("duplicate column `{}`", name)));
            }
        }
        Ok(MeasurementResult {
            shape,
            columns,
            edges: Vec::new(),
            attrs,
        })
    }

    /// Attach bin edges, one vector per dimension with `n+1` entries.
    pub fn with_edges(mut self, edges: Vec<Array1<f64>>) -> Result<MeasurementResult> {
        if edges.len() != self.shape.len() {
            return Err(Error::validation(format!(
                "expected {} edge arrays, got {}",
                self.shape.len(),
                edges.len()
            )));
        }
        for (dim, (e, &n)) in edges.iter().zip(self.shape.iter()).enumerate() {
            if e.len() != n + 1 {
                return Err(Error::validation(format!(
                    "edges of dimension {} have {} entries, expected {}",
                    dim,
                    e.len(),
                    n + 1
                )));
            }
        }
        self.edges = edges;
        Ok(self)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn edges(&self) -> &[Array1<f64>] {
        &self.edges
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> &[(String, ArrayD<f64>)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in sorted order, for order-insensitive comparison.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        names
    }
}
