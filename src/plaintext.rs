//! Plain-text measurement files.
//!
//! A 1-D file starts with a comment line naming the columns, followed by
//! one whitespace-separated row per bin. A 2-D file has an extra leading
//! comment line holding the shape (`# Nk Nmu`) and stores its rows in
//! row-major order. Either may end with `# edges <n>` sections (one per
//! dimension, `n` values on the following lines) and a `# metadata <n>`
//! section of `# key value type` lines.
//!
//! Text metadata is stored as whitespace-separated tokens, so runs of
//! whitespace inside a value read back as single spaces. An empty text
//! value is written as `""`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use ndarray::{Array1, ArrayD, IxDyn};

use crate::dataset::{MeasurementResult, MetaValue};
use crate::error::{Error, Result};

struct Lines<'a> {
    inner: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Lines<'a> {
        Lines {
            inner: text.lines().enumerate().peekable(),
        }
    }

    fn skip_blank(&mut self) {
        while let Some((_, l)) = self.inner.peek() {
            if l.trim().is_empty() {
                self.inner.next();
            } else {
                break;
            }
        }
    }

    /// Next non-blank line as `(line number, trimmed text)`.
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        self.skip_blank();
        self.inner.next().map(|(i, l)| (i + 1, l.trim()))
    }

    fn peek_line(&mut self) -> Option<&'a str> {
        self.skip_blank();
        self.inner.peek().map(|&(_, l)| l.trim())
    }

    fn last_line(&mut self) -> usize {
        self.inner.peek().map(|&(i, _)| i + 1).unwrap_or(0)
    }
}

fn comment(line: &str) -> Option<&str> {
    line.strip_prefix('#').map(str::trim)
}

fn parse_f64(tok: &str, line: usize) -> Result<f64> {
    tok.parse::<f64>()
        .map_err(|_| Error::parse(line, format!("cannot parse `{}` as a number", tok)))
}

const EMPTY_TEXT: &str = "\"\"";

fn parse_meta(line: usize, body: &str) -> Result<(String, MetaValue)> {
    let toks: Vec<&str> = body.split_whitespace().collect();
    if toks.len() < 3 {
        return Err(Error::parse(line, "metadata needs `key value type`"));
    }
    let key = toks[0].to_string();
    let ty = toks[toks.len() - 1];
    let raw = toks[1..toks.len() - 1].join(" ");
    let value = match ty {
        "float" => MetaValue::Float(parse_f64(&raw, line)?),
        "int" => MetaValue::Int(
            raw.parse()
                .map_err(|_| Error::parse(line, format!("cannot parse `{}` as an integer", raw)))?,
        ),
        "bool" => match raw.to_lowercase().as_str() {
            "true" => MetaValue::Bool(true),
            "false" => MetaValue::Bool(false),
            _ => return Err(Error::parse(line, format!("cannot parse `{}` as a bool", raw))),
        },
        "str" if raw == EMPTY_TEXT => MetaValue::Text(String::new()),
        "str" => MetaValue::Text(raw),
        _ => return Err(Error::parse(line, format!("unknown metadata type `{}`", ty))),
    };
    Ok((key, value))
}

fn parse_count(line: usize, tok: Option<&str>) -> Result<usize> {
    tok.and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::parse(line, "expected a count"))
}

/// Parse the text of a 1-D (`ndim == 1`) or 2-D (`ndim == 2`) file.
pub fn parse_plaintext(text: &str, ndim: usize) -> Result<MeasurementResult> {
    let mut lines = Lines::new(text);

    let shape: Option<Vec<usize>> = if ndim == 2 {
        let (n, l) = lines
            .next_line()
            .ok_or_else(|| Error::parse(1, "empty file"))?;
        let body = comment(l).ok_or_else(|| Error::parse(n, "expected `# Nk Nmu` header"))?;
        let dims = body
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::parse(n, format!("bad shape header `{}`", body)))?;
        if dims.len() != 2 {
            return Err(Error::parse(n, format!("bad shape header `{}`", body)));
        }
        Some(dims)
    } else if ndim == 1 {
        None
    } else {
        return Err(Error::validation(format!("unsupported dimensionality {}", ndim)));
    };

    let (n, l) = lines
        .next_line()
        .ok_or_else(|| Error::parse(1, "missing column header"))?;
    let names: Vec<String> = comment(l)
        .ok_or_else(|| Error::parse(n, "expected a `# name ...` column header"))?
        .split_whitespace()
        .map(String::from)
        .collect();
    if names.is_empty() {
        return Err(Error::parse(n, "no column names"));
    }

    let mut rows: Vec<Vec<f64>> = Vec::new();
    while let Some(l) = lines.peek_line() {
        if l.starts_with('#') {
            break;
        }
        if let Some((n, l)) = lines.next_line() {
            let row = l
                .split_whitespace()
                .map(|t| parse_f64(t, n))
                .collect::<Result<Vec<_>>>()?;
            if row.len() != names.len() {
                return Err(Error::parse(
                    n,
                    format!("expected {} values, found {}", names.len(), row.len()),
                ));
            }
            rows.push(row);
        }
    }

    let shape = shape.unwrap_or_else(|| vec![rows.len()]);
    if shape.iter().product::<usize>() != rows.len() {
        return Err(Error::parse(
            lines.last_line(),
            format!("shape {:?} does not match {} data rows", shape, rows.len()),
        ));
    }

    let mut edges = Vec::new();
    let mut attrs = BTreeMap::new();
    while let Some((n, l)) = lines.next_line() {
        let body = comment(l).ok_or_else(|| Error::parse(n, "unexpected data after trailer"))?;
        let mut toks = body.split_whitespace();
        match toks.next() {
            Some("edges") => {
                let count = parse_count(n, toks.next())?;
                let mut e = Vec::with_capacity(count);
                for _ in 0..count {
                    let (m, v) = lines
                        .next_line()
                        .ok_or_else(|| Error::parse(n, "truncated edges section"))?;
                    e.push(parse_f64(v, m)?);
                }
                edges.push(Array1::from(e));
            }
            Some("metadata") => {
                let count = parse_count(n, toks.next())?;
                for _ in 0..count {
                    let (m, v) = lines
                        .next_line()
                        .ok_or_else(|| Error::parse(n, "truncated metadata section"))?;
                    let body = comment(v).ok_or_else(|| Error::parse(m, "expected `# key value type`"))?;
                    let (key, value) = parse_meta(m, body)?;
                    attrs.insert(key, value);
                }
            }
            _ => return Err(Error::parse(n, format!("unknown section `{}`", body))),
        }
    }

    let columns = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let data: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            ArrayD::from_shape_vec(IxDyn(&shape), data)
                .map(|a| (name.clone(), a))
                .map_err(|e| Error::validation(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let result = MeasurementResult::new(columns, attrs)?;
    if edges.is_empty() {
        Ok(result)
    } else {
        result.with_edges(edges)
    }
}

pub fn read_plaintext<P: AsRef<Path>>(path: P, ndim: usize) -> Result<MeasurementResult> {
    let path = path.as_ref();
    fs::read_to_string(path)
        .map_err(Error::from)
        .and_then(|text| parse_plaintext(&text, ndim))
        .map_err(|e| Error::Read {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
}

pub fn format_plaintext(result: &MeasurementResult) -> String {
    let mut out = String::new();
    if result.ndim() == 2 {
        let _ = writeln!(out, "# {} {}", result.shape()[0], result.shape()[1]);
    }
    let names: Vec<&str> = result.names().collect();
    let _ = writeln!(out, "# {}", names.join(" "));

    let cols: Vec<&ArrayD<f64>> = result.columns().iter().map(|(_, c)| c).collect();
    let mut iters: Vec<_> = cols.iter().map(|c| c.iter()).collect();
    let nrows = cols.first().map(|c| c.len()).unwrap_or(0);
    for _ in 0..nrows {
        let row: Vec<String> = iters
            .iter_mut()
            .filter_map(|it| it.next())
            .map(|v| format!("{:e}", v))
            .collect();
        let _ = writeln!(out, "{}", row.join(" "));
    }

    for e in result.edges() {
        let _ = writeln!(out, "# edges {}", e.len());
        for v in e.iter() {
            let _ = writeln!(out, "{:e}", v);
        }
    }

    if !result.attrs.is_empty() {
        let _ = writeln!(out, "# metadata {}", result.attrs.len());
        for (k, v) in result.attrs.iter() {
            match v {
                MetaValue::Text(t) if t.trim().is_empty() => {
                    let _ = writeln!(out, "# {} {} str", k, EMPTY_TEXT);
                }
                _ => {
                    let _ = writeln!(out, "# {} {} {}", k, v, v.type_name());
                }
            }
        }
    }
    out
}

pub fn write_plaintext<P: AsRef<Path>>(result: &MeasurementResult, path: P) -> Result<()> {
    fs::write(path, format_plaintext(result))?;
    Ok(())
}
