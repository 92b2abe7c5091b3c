use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::average::{average, AverageOptions};
use crate::dataset::{MeasurementResult, ResultKind};
use crate::error::{Error, Result};
use crate::plaintext::{read_plaintext, write_plaintext};

pub const TOKEN: &str = "%s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OneD,
    TwoD,
}

impl Mode {
    pub fn ndim(self) -> usize {
        match self {
            Mode::OneD => 1,
            Mode::TwoD => 2,
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Mode> {
        match s.to_lowercase().as_str() {
            "1d" => Ok(Mode::OneD),
            "2d" => Ok(Mode::TwoD),
            _ => Err(Error::validation(format!("mode must be `1d` or `2d`, got `{}`", s))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AverageRequest {
    pub mode: Mode,
    pub pattern: String,
    pub output: String,
    pub batch: Vec<String>,
    pub options: AverageOptions,
    pub kind: ResultKind,
}

impl AverageRequest {
    pub fn new(mode: Mode, pattern: &str, output: &str) -> AverageRequest {
        AverageRequest {
            mode,
            pattern: pattern.to_string(),
            output: output.to_string(),
            batch: Vec::new(),
            options: AverageOptions::default(),
            kind: ResultKind::power(mode.ndim()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind.ndim() != self.mode.ndim() {
            return Err(Error::validation(format!(
                "class `{}` holds {}-D results but mode is {}d",
                self.kind.name(),
                self.kind.ndim(),
                self.mode.ndim()
            )));
        }
        Ok(())
    }
}

/// Replace every `%s` in `template` by `token`.
pub fn substitute_token(template: &str, token: &str) -> String {
    template.replace(TOKEN, token)
}

/// Files matching a glob pattern, sorted. An empty match is an error.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(p) => paths.push(p),
            Err(e) => return Err(Error::Io(e.into_error())),
        }
    }
    if paths.is_empty() {
        return Err(Error::PatternEmpty(pattern.to_string()));
    }
    paths.sort();
    Ok(paths)
}

pub fn read_results(paths: &[PathBuf], mode: Mode) -> Result<Vec<MeasurementResult>> {
    paths
        .par_iter()
        .map(|p| read_plaintext(p, mode.ndim()))
        .collect()
}

fn average_one(req: &AverageRequest, pattern: &str, output: &Path) -> Result<()> {
    let paths = expand_pattern(pattern)?;
    info!("averaging {} files...", paths.len());
    let results = read_results(&paths, req.mode)?;
    let avg = average(&results, &req.options)?;
    write_plaintext(&avg, output)?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Average every batch of files described by `req` and write one output
/// per batch token. Returns the written paths.
pub fn average_from_files(req: &AverageRequest) -> Result<Vec<PathBuf>> {
    req.validate()?;
    if req.batch.is_empty() {
        let output = PathBuf::from(&req.output);
        average_one(req, &req.pattern, &output)?;
        return Ok(vec![output]);
    }

    let mut written = Vec::with_capacity(req.batch.len());
    for token in req.batch.iter() {
        info!("processing batch string {}...", token);
        let pattern = substitute_token(&req.pattern, token);
        let output = PathBuf::from(substitute_token(&req.output, token));
        average_one(req, &pattern, &output)?;
        written.push(output);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_1d(dir: &Path, name: &str, power: f64, modes: f64) {
        let text = format!(
            "# k power modes\n0.1 {} {}\n0.2 {} {}\n# metadata 1\n# volume 8.0 float\n",
            power, modes, power * 2.0, modes
        );
        fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn test_substitute_token() {
        assert_eq!(substitute_token("pk_%s/box_%s.dat", "07"), "pk_07/box_07.dat");
        assert_eq!(substitute_token("pk.dat", "07"), "pk.dat");
    }

    #[test]
    fn test_mode_and_kind() {
        assert_eq!("2D".parse::<Mode>().unwrap(), Mode::TwoD);
        assert!("3d".parse::<Mode>().is_err());
        let mut req = AverageRequest::new(Mode::OneD, "x", "y");
        assert!(req.validate().is_ok());
        req.kind = ResultKind::Corr2d;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.dat", dir.path().display());
        match expand_pattern(&pattern) {
            Err(Error::PatternEmpty(p)) => assert_eq!(p, pattern),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batches() {
        let dir = tempfile::tempdir().unwrap();
        for tag in &["a", "b"] {
            write_1d(dir.path(), &format!("pk_{}_1.dat", tag), 1.0, 2.0);
            write_1d(dir.path(), &format!("pk_{}_2.dat", tag), 4.0, 6.0);
        }
        let mut req = AverageRequest::new(
            Mode::OneD,
            &format!("{}/pk_%s_*.dat", dir.path().display()),
            &format!("{}/mean_%s.dat", dir.path().display()),
        );
        req.batch = vec!["a".to_string(), "b".to_string()];
        let written = average_from_files(&req).unwrap();
        assert_eq!(written.len(), 2);

        let avg = read_plaintext(&written[1], 1).unwrap();
        let power = avg.column("power").unwrap();
        assert!((power[[0]] - 3.25).abs() < 1e-12);
        assert!((power[[1]] - 6.5).abs() < 1e-12);
        assert!((avg.column("modes").unwrap()[[0]] - 8.0).abs() < 1e-12);
        assert_eq!(avg.attrs.len(), 1);
    }

    #[test]
    fn test_read_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.dat"), "# k power\n1.0 oops\n").unwrap();
        let req = AverageRequest::new(
            Mode::OneD,
            &format!("{}/*.dat", dir.path().display()),
            &format!("{}/out.txt", dir.path().display()),
        );
        let err = average_from_files(&req).unwrap_err();
        assert!(err.to_string().contains("bad.dat"));
    }
}
