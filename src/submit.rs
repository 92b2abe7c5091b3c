//! Submit one batch-scheduler job per point of a sample grid.
//!
//! Each job receives a parameter file rendered from a template, with the
//! per-sample overrides from a selection file filled in.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::template::{field_names, format_partial, TemplateValue, Values};

pub const ALL: &str = "all";

/// Option names taken by the submission CLI itself.
pub const RESERVED: [&str; 9] = [
    "job_file", "space", "config", "select", "mode", "pause", "debug", "help", "version",
];

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<String>,
}

/// The declared sample dimensions and their coordinate values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SampleSpace {
    pub dims: Vec<Dimension>,
}

impl SampleSpace {
    pub fn from_yaml(text: &str) -> Result<SampleSpace> {
        let space: SampleSpace = serde_yaml::from_str(text)?;
        for (i, d) in space.dims.iter().enumerate() {
            if RESERVED.contains(&d.name.as_str()) {
                return Err(Error::Config(format!(
                    "dimension `{}` clashes with a command-line option",
                    d.name
                )));
            }
            if d.values.is_empty() {
                return Err(Error::Config(format!("dimension `{}` has no values", d.name)));
            }
            if space.dims[..i].iter().any(|o| o.name == d.name) {
                return Err(Error::Config(format!("duplicate dimension `{}`", d.name)));
            }
        }
        Ok(space)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SampleSpace> {
        SampleSpace::from_yaml(&read_existing(path.as_ref())?)
    }

    /// Resolve the requested values of every dimension, in declaration
    /// order. A request of just `all` selects every coordinate.
    pub fn resolve(&self, requested: &BTreeMap<String, Vec<String>>) -> Result<Vec<Vec<String>>> {
        self.dims
            .iter()
            .map(|d| {
                let req = requested
                    .get(&d.name)
                    .ok_or_else(|| Error::validation(format!("no values given for `{}`", d.name)))?;
                if req.len() == 1 && req[0] == ALL {
                    return Ok(d.values.clone());
                }
                for v in req {
                    if !d.values.contains(v) {
                        return Err(Error::validation(format!(
                            "`{}` is not a value of `{}`; choose from {:?}",
                            v, d.name, d.values
                        )));
                    }
                }
                Ok(req.clone())
            })
            .collect()
    }
}

/// Per-sample template values keyed by `<dim>_<value>`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Selection(pub BTreeMap<String, Values>);

impl Selection {
    pub fn from_yaml(text: &str) -> Result<Selection> {
        if text.trim().is_empty() {
            return Ok(Selection::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Selection> {
        Selection::from_yaml(&read_existing(path.as_ref())?)
    }

    /// Merged overrides for one sample point.
    pub fn values_for(&self, dims: &[Dimension], sample: &[String]) -> Values {
        let mut values = Values::new();
        for (d, v) in dims.iter().zip(sample.iter()) {
            if let Some(kw) = self.0.get(&format!("{}_{}", d.name, v)) {
                values.extend(kw.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        values
    }
}

pub fn read_existing(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

/// Cartesian product of the per-dimension value lists, first dimension
/// varying slowest.
pub fn product(lists: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = vec![Vec::new()];
    for list in lists {
        out = out
            .iter()
            .flat_map(|prefix| {
                list.iter().map(move |v| {
                    let mut p = prefix.clone();
                    p.push(v.clone());
                    p
                })
            })
            .collect();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Pbs,
    Slurm,
}

impl FromStr for SubmitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<SubmitMode> {
        match s {
            "pbs" => Ok(SubmitMode::Pbs),
            "slurm" => Ok(SubmitMode::Slurm),
            _ => Err(Error::validation("``mode`` must be `pbs` or `slurm`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl JobCommand {
    pub fn new(mode: SubmitMode, param_file: &Path, job_file: &Path) -> JobCommand {
        let param_str = format!("param_file={}", param_file.display());
        let job = job_file.display().to_string();
        match mode {
            SubmitMode::Pbs => JobCommand {
                program: "qsub".to_string(),
                args: vec!["-v".to_string(), param_str, job],
            },
            SubmitMode::Slurm => JobCommand {
                program: "sbatch".to_string(),
                args: vec![format!("--export={},ALL", param_str), job],
            },
        }
    }
}

impl std::fmt::Display for JobCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

pub trait JobLauncher {
    fn launch(&mut self, cmd: &JobCommand) -> Result<()>;
}

/// Runs the scheduler command as a child process.
pub struct CommandLauncher;

impl JobLauncher for CommandLauncher {
    fn launch(&mut self, cmd: &JobCommand) -> Result<()> {
        let status = Command::new(&cmd.program)
            .args(&cmd.args)
            .status()
            .map_err(|e| Error::Launch {
                program: cmd.program.clone(),
                message: e.to_string(),
            })?;
        if !status.success() {
            warn!("`{}` exited with {}", cmd, status);
        }
        Ok(())
    }
}

pub struct JobPlan {
    pub job_file: PathBuf,
    pub config: String,
    pub selection: Selection,
    pub mode: SubmitMode,
    pub pause: Duration,
}

impl JobPlan {
    /// Render the parameter file for one sample point.
    pub fn render(&self, dims: &[Dimension], sample: &[String]) -> String {
        let fields = field_names(&self.config);
        let valid: BTreeMap<String, TemplateValue> = self
            .selection
            .values_for(dims, sample)
            .into_iter()
            .filter(|(k, _)| fields.contains(k))
            .collect();
        format_partial(&self.config, &valid)
    }

    /// Write the rendered parameters to a persisted temporary file.
    pub fn write_param_file(&self, dims: &[Dimension], sample: &[String]) -> Result<PathBuf> {
        let mut file = tempfile::Builder::new().prefix("params_").tempfile()?;
        file.write_all(self.render(dims, sample).as_bytes())?;
        let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
        Ok(path)
    }

    /// Submit every sample point; stops early if `stop` is raised.
    /// Returns the number of jobs submitted.
    pub fn submit_all<L: JobLauncher>(
        &self,
        space: &SampleSpace,
        samples: &[Vec<String>],
        launcher: &mut L,
        stop: &AtomicBool,
    ) -> Result<usize> {
        let mut submitted = 0;
        for (i, sample) in product(samples).iter().enumerate() {
            if i > 0 {
                thread::sleep(self.pause);
            }
            if stop.load(Ordering::SeqCst) {
                warn!("interrupted; {} jobs submitted", submitted);
                break;
            }
            let param_file = self.write_param_file(&space.dims, sample)?;
            let cmd = JobCommand::new(self.mode, &param_file, &self.job_file);
            info!("calling {}...", cmd);
            launcher.launch(&cmd)?;
            info!("...done");
            submitted += 1;
        }
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACE: &str = "
dims:
  - name: sample
    values: [cmass, lowz]
  - name: box
    values: ['01', '02', '03']
";

    struct Recorder(Vec<JobCommand>);

    impl JobLauncher for Recorder {
        fn launch(&mut self, cmd: &JobCommand) -> Result<()> {
            self.0.push(cmd.clone());
            Ok(())
        }
    }

    fn request(kv: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        kv.iter()
            .map(|(k, v)| (k.to_string(), v.split_whitespace().map(String::from).collect()))
            .collect()
    }

    #[test]
    fn test_resolve_and_product() {
        let space = SampleSpace::from_yaml(SPACE).unwrap();
        let lists = space
            .resolve(&request(&[("sample", "all"), ("box", "02 03")]))
            .unwrap();
        let points = product(&lists);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], vec!["cmass".to_string(), "02".to_string()]);
        assert_eq!(points[3], vec!["lowz".to_string(), "03".to_string()]);

        assert!(space
            .resolve(&request(&[("sample", "boss"), ("box", "all")]))
            .is_err());
        assert!(space.resolve(&request(&[("sample", "all")])).is_err());
    }

    #[test]
    fn test_commands() {
        let pbs = JobCommand::new(SubmitMode::Pbs, Path::new("/tmp/p1"), Path::new("job.sh"));
        assert_eq!(pbs.to_string(), "qsub -v param_file=/tmp/p1 job.sh");
        let slurm = JobCommand::new(SubmitMode::Slurm, Path::new("/tmp/p1"), Path::new("job.sh"));
        assert_eq!(slurm.to_string(), "sbatch --export=param_file=/tmp/p1,ALL job.sh");
        assert!("sge".parse::<SubmitMode>().is_err());
    }

    #[test]
    fn test_render_selection() {
        let space = SampleSpace::from_yaml(SPACE).unwrap();
        let selection = Selection::from_yaml(
            "
sample_cmass: {zmin: 0.43, zmax: 0.7, unused: 1}
box_02: {box: 2}
",
        )
        .unwrap();
        let plan = JobPlan {
            job_file: PathBuf::from("job.sh"),
            config: "z: [{zmin}, {zmax}]\npath: box{box:d}/{tag}\n".to_string(),
            selection,
            mode: SubmitMode::Pbs,
            pause: Duration::from_millis(0),
        };
        let sample = vec!["cmass".to_string(), "02".to_string()];
        assert_eq!(
            plan.render(&space.dims, &sample),
            "z: [0.43, 0.7]\npath: box2/{tag}\n"
        );
        let sample = vec!["lowz".to_string(), "01".to_string()];
        assert_eq!(
            plan.render(&space.dims, &sample),
            "z: [{zmin}, {zmax}]\npath: box{box:d}/{tag}\n"
        );
    }

    #[test]
    fn test_submit_all() {
        let space = SampleSpace::from_yaml(SPACE).unwrap();
        let plan = JobPlan {
            job_file: PathBuf::from("job.sh"),
            config: "box: {box}\n".to_string(),
            selection: Selection::from_yaml("box_03: {box: 3}").unwrap(),
            mode: SubmitMode::Slurm,
            pause: Duration::from_millis(0),
        };
        let lists = space
            .resolve(&request(&[("sample", "lowz"), ("box", "all")]))
            .unwrap();
        let mut rec = Recorder(Vec::new());
        let n = plan
            .submit_all(&space, &lists, &mut rec, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(rec.0[0].program, "sbatch");

        let last = rec.0[2].args[0].clone();
        let path = last
            .trim_start_matches("--export=param_file=")
            .trim_end_matches(",ALL");
        assert_eq!(fs::read_to_string(path).unwrap(), "box: 3\n");
        cleanup(&rec.0);

        let n = plan
            .submit_all(&space, &lists, &mut rec, &AtomicBool::new(true))
            .unwrap();
        assert_eq!(n, 0);
    }

    fn cleanup(cmds: &[JobCommand]) {
        for cmd in cmds {
            let p = cmd.args[0]
                .trim_start_matches("--export=param_file=")
                .trim_end_matches(",ALL");
            let _ = fs::remove_file(p);
        }
    }

    #[test]
    fn test_stop_during_pause() {
        let space = SampleSpace::from_yaml(SPACE).unwrap();
        let plan = JobPlan {
            job_file: PathBuf::from("job.sh"),
            config: "box: {box}\n".to_string(),
            selection: Selection::default(),
            mode: SubmitMode::Slurm,
            pause: Duration::from_millis(400),
        };
        let lists = space
            .resolve(&request(&[("sample", "lowz"), ("box", "all")]))
            .unwrap();
        let stop = std::sync::Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
        });
        let mut rec = Recorder(Vec::new());
        let n = plan.submit_all(&space, &lists, &mut rec, &stop).unwrap();
        setter.join().unwrap();
        assert_eq!(n, 1);
        assert_eq!(rec.0.len(), 1);
        cleanup(&rec.0);
    }

    #[test]
    fn test_reserved_dimension() {
        for name in RESERVED.iter() {
            let yaml = format!("dims:\n  - name: {}\n    values: [a]\n", name);
            match SampleSpace::from_yaml(&yaml) {
                Err(Error::Config(msg)) => assert!(msg.contains(name)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_missing_files() {
        match Selection::from_file("/nonexistent/select.yaml") {
            Err(Error::NotFound(p)) => assert!(p.ends_with("select.yaml")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(SampleSpace::from_yaml("dims:\n  - name: a\n    values: []\n").is_err());
    }
}
