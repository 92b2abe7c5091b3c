//! Partial `{name[:spec]}` substitution for parameter-file templates.
//!
//! Fields whose name has a value are replaced; every other field is kept
//! verbatim so a later pass (or the consuming program) can fill it in.
//! `{{` and `}}` collapse to single braces.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TemplateValue::Bool(x) => write!(f, "{}", x),
            TemplateValue::Int(x) => write!(f, "{}", x),
            TemplateValue::Float(x) => write!(f, "{}", x),
            TemplateValue::Str(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for TemplateValue {
    fn from(x: i64) -> TemplateValue {
        TemplateValue::Int(x)
    }
}

impl From<f64> for TemplateValue {
    fn from(x: f64) -> TemplateValue {
        TemplateValue::Float(x)
    }
}

pub type Values = BTreeMap<String, TemplateValue>;

enum Piece<'a> {
    Literal(&'a str),
    Field { name: &'a str, spec: Option<&'a str>, raw: &'a str },
}

fn pieces(template: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let bytes = template.as_bytes();
    let mut lit_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if i + 1 < bytes.len() && bytes[i + 1] == bytes[i] => {
                out.push(Piece::Literal(&template[lit_start..i + 1]));
                i += 2;
                lit_start = i;
            }
            b'{' => match template[i + 1..].find('}') {
                Some(len) => {
                    out.push(Piece::Literal(&template[lit_start..i]));
                    let inner = &template[i + 1..i + 1 + len];
                    let (name, spec) = match inner.find(':') {
                        Some(c) => (&inner[..c], Some(&inner[c + 1..])),
                        None => (inner, None),
                    };
                    out.push(Piece::Field {
                        name,
                        spec,
                        raw: &template[i..i + len + 2],
                    });
                    i += len + 2;
                    lit_start = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    out.push(Piece::Literal(&template[lit_start..]));
    out
}

fn apply_spec(value: &TemplateValue, spec: &str) -> String {
    let number = match *value {
        TemplateValue::Int(x) => Some(x as f64),
        TemplateValue::Float(x) => Some(x),
        _ => None,
    };
    match (number, spec) {
        (_, "") => value.to_string(),
        (Some(x), "d") => format!("{}", x.round() as i64),
        (Some(x), s) if s.starts_with('.') => {
            let prec = &s[1..];
            if let Some(p) = prec.strip_suffix('f').and_then(|p| p.parse::<usize>().ok()) {
                format!("{:.*}", p, x)
            } else if let Some(p) = prec.strip_suffix('e').and_then(|p| p.parse::<usize>().ok()) {
                format!("{:.*e}", p, x)
            } else {
                value.to_string()
            }
        }
        _ => value.to_string(),
    }
}

/// Substitute the fields named in `values`, leaving the others untouched.
pub fn format_partial(template: &str, values: &Values) -> String {
    let mut out = String::with_capacity(template.len());
    for p in pieces(template) {
        match p {
            Piece::Literal(s) => out.push_str(s),
            Piece::Field { name, spec, raw } => match values.get(name) {
                Some(v) => out.push_str(&apply_spec(v, spec.unwrap_or(""))),
                None => out.push_str(raw),
            },
        }
    }
    out
}

/// Names of all replacement fields in the template, in order of appearance.
pub fn field_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for p in pieces(template) {
        if let Piece::Field { name, .. } = p {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(kv: &[(&str, TemplateValue)]) -> Values {
        kv.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_partial_substitution() {
        let t = "path: data/box{box}_{sample}.dat\nkmax: {kmax:.2f}";
        let v = values(&[("box", 3i64.into()), ("kmax", 0.4f64.into())]);
        assert_eq!(
            format_partial(t, &v),
            "path: data/box3_{sample}.dat\nkmax: 0.40"
        );
    }

    #[test]
    fn test_escapes_and_specs() {
        let v = values(&[("x", 1234.5f64.into()), ("n", 7i64.into())]);
        assert_eq!(format_partial("{{x}} {x}", &v), "{x} 1234.5");
        assert_eq!(format_partial("{x:.1e}", &v), "1.2e3");
        assert_eq!(format_partial("{n:d}/{n:.3f}", &v), "7/7.000");
        assert_eq!(format_partial("{x:>10}", &v), "1234.5");
        assert_eq!(format_partial("open { brace", &v), "open { brace");
    }

    #[test]
    fn test_malformed_specs_fall_back() {
        let v = values(&[("x", 2.5f64.into())]);
        assert_eq!(format_partial("{x:.é}", &v), "2.5");
        assert_eq!(format_partial("{x:.}", &v), "2.5");
        assert_eq!(format_partial("{x:.f}", &v), "2.5");
        assert_eq!(format_partial("{x:.2é}", &v), "2.5");
        assert_eq!(format_partial("{x:.3f}", &v), "2.500");
    }

    #[test]
    fn test_field_names() {
        let t = "{a} {b:.3f} {a} {{c}}";
        assert_eq!(field_names(t), vec!["a".to_string(), "b".to_string()]);
    }
}
