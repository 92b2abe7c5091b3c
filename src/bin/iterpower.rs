use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{App, Arg};
use log::info;

use pkmu_tools::logging;
use pkmu_tools::submit::{read_existing, CommandLauncher, JobPlan, SampleSpace, Selection, ALL};

/// The sample space has to be known before the per-dimension options can
/// be declared, so `--space` is picked out of the raw arguments first.
fn space_path(args: &[String]) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == "--space" {
            return it.next().cloned();
        }
        if let Some(v) = a.strip_prefix("--space=") {
            return Some(v.to_string());
        }
    }
    None
}

pub fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    let space = match space_path(&raw) {
        Some(p) => SampleSpace::from_file(&p).with_context(|| format!("loading sample space `{}`", p))?,
        None => SampleSpace { dims: Vec::new() },
    };

    let choices: Vec<Vec<&str>> = space
        .dims
        .iter()
        .map(|d| std::iter::once(ALL).chain(d.values.iter().map(|v| v.as_str())).collect())
        .collect();
    let helps: Vec<String> = (0..space.dims.len())
        .map(|i| format!("the #{} sample dimension", i))
        .collect();

    let mut app = App::new("iterpower")
        .about("submit the job script for the desired sample(s), one job per sample point")
        .arg(Arg::with_name("job_file")
            .required(true)
            .help("the job script to run; it takes the template parameter file via `param_file`")
        )
        .arg(Arg::with_name("space")
            .long("space")
            .takes_value(true)
            .required(true)
            .value_name("yaml")
            .help("yaml file declaring the sample dimensions and their values")
        )
        .arg(Arg::with_name("config")
            .short("p")
            .long("config")
            .takes_value(true)
            .required(true)
            .help("the template parameter file")
        )
        .arg(Arg::with_name("select")
            .short("s")
            .long("select")
            .takes_value(true)
            .help("yaml file of per-sample template values, keyed by `<dim>_<value>`")
        )
        .arg(Arg::with_name("mode")
            .long("mode")
            .takes_value(true)
            .possible_values(&["pbs", "slurm"])
            .default_value("pbs")
            .help("the job submission mode")
        )
        .arg(Arg::with_name("pause")
            .long("pause")
            .takes_value(true)
            .default_value("1")
            .help("seconds to wait between submissions")
        )
        .arg(Arg::with_name("debug")
            .long("debug")
            .help("set the logging output to debug")
        );
    for ((d, vals), h) in space.dims.iter().zip(choices.iter()).zip(helps.iter()) {
        app = app.arg(Arg::with_name(&d.name)
            .long(&d.name)
            .takes_value(true)
            .multiple(true)
            .required(true)
            .possible_values(vals)
            .help(h)
        );
    }
    let matches = app.get_matches_from(raw.iter());

    logging::init(matches.is_present("debug"));

    let config_path = matches.value_of("config").unwrap_or_default();
    let config = read_existing(Path::new(config_path))?;
    let selection = match matches.value_of("select") {
        Some(p) => Selection::from_file(p).with_context(|| format!("loading selection `{}`", p))?,
        None => Selection::default(),
    };
    let pause: f64 = matches
        .value_of("pause")
        .unwrap_or("1")
        .parse()
        .context("`pause` must be a number of seconds")?;
    if !pause.is_finite() || pause < 0.0 {
        bail!("`pause` must be a finite, non-negative number of seconds");
    }

    let requested: BTreeMap<String, Vec<String>> = space
        .dims
        .iter()
        .map(|d| {
            let vals = matches
                .values_of(&d.name)
                .map(|v| v.map(String::from).collect())
                .unwrap_or_default();
            (d.name.clone(), vals)
        })
        .collect();
    let samples = space.resolve(&requested)?;

    let plan = JobPlan {
        job_file: PathBuf::from(matches.value_of("job_file").unwrap_or_default()),
        config,
        selection,
        mode: matches.value_of("mode").unwrap_or("pbs").parse()?,
        pause: Duration::from_secs_f64(pause),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing the Ctrl-C handler")?;

    let n = plan.submit_all(&space, &samples, &mut CommandLauncher, &stop)?;
    info!("submitted {} job(s)", n);
    Ok(())
}
