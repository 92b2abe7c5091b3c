//! Run an external measurement program once per data box on a pool of
//! workers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{error, info, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::{Error, Result};
use crate::template::{format_partial, TemplateValue, Values};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRange {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl BoxRange {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<BoxRange> {
        if step <= 0 {
            return Err(Error::validation(format!("box step must be positive, got {}", step)));
        }
        Ok(BoxRange { start, stop, step })
    }

    pub fn boxes(&self) -> Vec<i64> {
        (self.start..self.stop).step_by(self.step as usize).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    pub workers: usize,
    pub cpus_per_worker: usize,
}

impl PoolLayout {
    pub fn new(cpus_per_worker: usize, total_cpus: usize, use_all_cpus: bool) -> Result<PoolLayout> {
        if cpus_per_worker == 0 {
            return Err(Error::validation("need at least one cpu per worker"));
        }
        let mut workers = total_cpus / cpus_per_worker;
        if use_all_cpus && total_cpus % cpus_per_worker != 0 {
            workers += 1;
        }
        Ok(PoolLayout {
            workers: workers.max(1),
            cpus_per_worker,
        })
    }
}

/// Identity of the worker running a task, passed down explicitly.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker: usize,
    pub host: String,
}

/// Name of this machine: `HOSTNAME` if exported, else `/etc/hostname`,
/// else `localhost`.
pub fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl WorkerContext {
    pub fn current(host: &str) -> WorkerContext {
        WorkerContext {
            worker: rayon::current_thread_index().unwrap_or(0),
            host: host.to_string(),
        }
    }
}

impl std::fmt::Display for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "worker {} on {}", self.worker, self.host)
    }
}

#[derive(Debug, Clone)]
pub struct BoxTask {
    /// config template; `{box}` fields are filled per box
    pub template: String,
    pub program: String,
    pub args: Vec<String>,
}

pub fn box_values(b: i64) -> Values {
    let mut v = Values::new();
    v.insert("box".to_string(), TemplateValue::Int(b));
    v
}

impl BoxTask {
    /// Config text for one box and the output path it names.
    pub fn config_for(&self, b: i64) -> Result<(String, PathBuf)> {
        let text = format_partial(&self.template, &box_values(b));
        let doc: serde_yaml::Value = serde_yaml::from_str(&text)?;
        let output = doc
            .get("output")
            .and_then(|o| o.as_str())
            .ok_or_else(|| Error::Config("config needs a string `output` key".to_string()))?;
        Ok((text, PathBuf::from(output)))
    }

    pub fn run(&self, ctx: &WorkerContext, b: i64) -> Result<PathBuf> {
        let (text, output) = self.config_for(b)?;
        let mut config = tempfile::Builder::new()
            .prefix(&format!("box{}_", b))
            .suffix(".yaml")
            .tempfile()?;
        config.write_all(text.as_bytes())?;
        config.flush()?;

        info!("{}: running box {}", ctx, b);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(config.path())
            .status()
            .map_err(|e| Error::Launch {
                program: self.program.clone(),
                message: e.to_string(),
            })?;
        if !status.success() {
            return Err(Error::Launch {
                program: self.program.clone(),
                message: format!("box {} exited with {}", b, status),
            });
        }
        if !Path::new(&output).exists() {
            warn!("{}: box {} finished but `{}` is missing", ctx, b, output.display());
        }
        Ok(output)
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `task` for every box on a pool of `layout.workers` threads.
pub fn run_boxes(task: &BoxTask, boxes: &[i64], layout: &PoolLayout) -> Result<BatchReport> {
    // validate every config before starting any work
    for &b in boxes {
        task.config_for(b)?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(layout.workers)
        .build()
        .map_err(|e| Error::Config(e.to_string()))?;
    info!(
        "running {} boxes on {} workers ({} cpus each)",
        boxes.len(),
        layout.workers,
        layout.cpus_per_worker
    );

    let host = host_name();
    let outcomes: Vec<(i64, Result<PathBuf>)> = pool.install(|| {
        boxes
            .to_vec()
            .into_par_iter()
            .map(|b| {
                let ctx = WorkerContext::current(&host);
                (b, task.run(&ctx, b))
            })
            .collect()
    });

    let mut report = BatchReport::default();
    for (b, r) in outcomes {
        match r {
            Ok(_) => report.completed.push(b),
            Err(e) => {
                error!("box {} failed: {}", b, e);
                report.failed.push((b, e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_range() {
        assert_eq!(BoxRange::new(0, 10, 3).unwrap().boxes(), vec![0, 3, 6, 9]);
        assert!(BoxRange::new(5, 2, 1).unwrap().boxes().is_empty());
        assert!(BoxRange::new(0, 10, 0).is_err());
    }

    #[test]
    fn test_layout() {
        assert_eq!(PoolLayout::new(4, 16, false).unwrap().workers, 4);
        assert_eq!(PoolLayout::new(4, 18, false).unwrap().workers, 4);
        assert_eq!(PoolLayout::new(4, 18, true).unwrap().workers, 5);
        assert_eq!(PoolLayout::new(8, 2, false).unwrap().workers, 1);
        assert!(PoolLayout::new(0, 2, false).is_err());
    }

    #[test]
    fn test_worker_context() {
        let host = host_name();
        assert!(!host.is_empty());
        assert_eq!(host, host.trim());
        let ctx = WorkerContext::current(&host);
        assert_eq!(ctx.to_string(), format!("worker 0 on {}", host));
    }

    #[test]
    fn test_config_for() {
        let task = BoxTask {
            template: "input:\n  path: data/box{box:d}.bin\noutput: pk_{box}.dat\nkmax: {kmax}\n"
                .to_string(),
            program: "true".to_string(),
            args: Vec::new(),
        };
        let (text, out) = task.config_for(7).unwrap();
        assert!(text.contains("data/box7.bin"));
        assert!(text.contains("kmax: {kmax}"));
        assert_eq!(out, PathBuf::from("pk_7.dat"));

        let bad = BoxTask {
            template: "input: {box}\n".to_string(),
            ..task
        };
        assert!(bad.config_for(1).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_boxes() {
        let dir = tempfile::tempdir().unwrap();
        let task = BoxTask {
            template: format!("output: {}/pk_{{box}}.dat\n", dir.path().display()),
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "test \"$(basename \"$0\" | cut -c1-4)\" != box3".to_string(),
            ],
        };
        let layout = PoolLayout::new(1, 2, false).unwrap();
        let report = run_boxes(&task, &[1, 2, 3], &layout).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 3);
        let mut done = report.completed.clone();
        done.sort();
        assert_eq!(done, vec![1, 2]);
        assert!(!report.is_success());
    }
}
