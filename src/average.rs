use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use ndarray::{ArrayD, IxDyn};

use crate::dataset::{MeasurementResult, MetaValue};
use crate::error::{Error, Result};

pub const MODES: &str = "modes";

#[derive(Debug, Clone)]
pub struct AverageOptions {
    /// column used as the averaging weight; `None` weights every result equally
    pub weights: Option<String>,
    /// columns accumulated by summation instead of averaged
    pub sum_only: BTreeSet<String>,
}

impl Default for AverageOptions {
    fn default() -> AverageOptions {
        AverageOptions {
            weights: Some(MODES.to_string()),
            sum_only: std::iter::once(MODES.to_string()).collect(),
        }
    }
}

impl AverageOptions {
    pub fn unweighted() -> AverageOptions {
        AverageOptions {
            weights: None,
            sum_only: BTreeSet::new(),
        }
    }
}

fn check_compatible(results: &[MeasurementResult], options: &AverageOptions) -> Result<()> {
    let first = results
        .first()
        .ok_or_else(|| Error::validation("no results to average"))?;
    let names = first.sorted_names();
    for (i, r) in results.iter().enumerate().skip(1) {
        if r.sorted_names() != names {
            return Err(Error::validation(format!(
                "mismatched columns: result {} has {:?}, expected {:?}",
                i,
                r.sorted_names(),
                names
            )));
        }
        if r.shape() != first.shape() {
            return Err(Error::validation(format!(
                "mismatched shapes: result {} has {:?}, expected {:?}",
                i,
                r.shape(),
                first.shape()
            )));
        }
    }
    if let Some(w) = &options.weights {
        if !first.has_column(w) {
            return Err(Error::validation(format!(
                "unknown weight column `{}`; no such column",
                w
            )));
        }
    }
    Ok(())
}

fn sum_column(cols: &[&ArrayD<f64>]) -> ArrayD<f64> {
    let mut acc = ArrayD::<f64>::zeros(cols[0].raw_dim());
    for &c in cols {
        acc += c;
    }
    acc
}

/// Weighted mean over the results that define each position. Returns the
/// averaged array and the number of masked positions.
fn weighted_mean(cols: &[&ArrayD<f64>], weights: &[ArrayD<f64>]) -> Result<(ArrayD<f64>, usize)> {
    let shape = cols[0].shape().to_vec();
    let n = cols[0].len();
    let mut num = vec![0.0; n];
    let mut den = vec![0.0; n];
    let mut defined = vec![false; n];

    for (c, w) in cols.iter().zip(weights.iter()) {
        for (p, (&v, &wt)) in c.iter().zip(w.iter()).enumerate() {
            if v.is_nan() || wt.is_nan() {
                continue;
            }
            defined[p] = true;
            num[p] += v * wt;
            den[p] += wt;
        }
    }

    let mut masked = 0;
    let data: Vec<f64> = (0..n)
        .map(|p| {
            if !defined[p] {
                masked += 1;
                f64::NAN
            } else if den[p] == 0.0 {
                f64::NAN
            } else {
                num[p] / den[p]
            }
        })
        .collect();
    let result = ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| Error::validation(e.to_string()))?;
    Ok((result, masked))
}

fn reduce_attrs(results: &[MeasurementResult]) -> BTreeMap<String, MetaValue> {
    let mut attrs = BTreeMap::new();
    for key in results[0].attrs.keys() {
        let values: Option<Vec<f64>> = results
            .iter()
            .map(|r| r.attrs.get(key).and_then(MetaValue::as_f64))
            .collect();
        match values {
            Some(v) => {
                let mean = v.iter().sum::<f64>() / v.len() as f64;
                attrs.insert(key.clone(), MetaValue::Float(mean));
            }
            None => debug!("dropping metadata `{}`: missing or non-numeric", key),
        }
    }
    attrs
}

/// Column-wise weighted mean of same-shaped results.
///
/// Columns listed in `sum_only` are summed. Every other column is averaged
/// with the weight column over the results that define each position;
/// positions where no result is defined, or where the weights sum to zero,
/// come out as NaN. Numeric metadata present on every result is averaged,
/// anything else is dropped.
pub fn average(results: &[MeasurementResult], options: &AverageOptions) -> Result<MeasurementResult> {
    check_compatible(results, options)?;
    let first = &results[0];

    let weights: Vec<ArrayD<f64>> = match &options.weights {
        None => results
            .iter()
            .map(|_| ArrayD::ones(IxDyn(first.shape())))
            .collect(),
        Some(w) => results
            .iter()
            .map(|r| r.column(w).cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::validation(format!("unknown weight column `{}`", w)))?,
    };

    let mut columns = Vec::with_capacity(first.columns().len());
    for name in first.names() {
        let cols = results
            .iter()
            .map(|r| r.column(name))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::validation(format!("mismatched columns: missing `{}`", name)))?;
        let data = if options.sum_only.contains(name) {
            sum_column(&cols)
        } else {
            let (data, masked) = weighted_mean(&cols, &weights)?;
            if masked > 0 {
                debug!("column `{}`: {} bins undefined in every input", name, masked);
            }
            data
        };
        columns.push((name.to_string(), data));
    }

    let averaged = MeasurementResult::new(columns, reduce_attrs(results))?;
    if first.edges().is_empty() {
        Ok(averaged)
    } else {
        averaged.with_edges(first.edges().to_vec())
    }
}
