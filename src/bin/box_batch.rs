use anyhow::{bail, Context, Result};
use clap::{App, Arg};
use log::info;
use std::path::Path;

use pkmu_tools::logging;
use pkmu_tools::pool::{run_boxes, BoxRange, BoxTask, PoolLayout};
use pkmu_tools::submit::read_existing;

fn parse_arg<T: std::str::FromStr>(value: Option<&str>, name: &str) -> Result<T> {
    value
        .unwrap_or_default()
        .parse()
        .map_err(|_| anyhow::anyhow!("`{}` must be an integer", name))
}

pub fn main() -> Result<()> {
    let matches = App::new("box_batch")
        .about("run a measurement program in batch mode, iterating over data boxes")
        .arg(Arg::with_name("N")
            .required(true)
            .help("the number of cpus per independent worker")
        )
        .arg(Arg::with_name("start")
            .long("start")
            .takes_value(true)
            .required(true)
            .help("the data box number to start at")
        )
        .arg(Arg::with_name("stop")
            .long("stop")
            .takes_value(true)
            .required(true)
            .help("the data box number to stop at")
        )
        .arg(Arg::with_name("step")
            .long("step")
            .takes_value(true)
            .default_value("1")
            .help("the iteration step")
        )
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .takes_value(true)
            .required(true)
            .help("the template config file; `{box}` is replaced by the box number")
        )
        .arg(Arg::with_name("exec")
            .long("exec")
            .takes_value(true)
            .required(true)
            .help("the program to run; it receives the formatted config file as its last argument")
        )
        .arg(Arg::with_name("arg")
            .long("arg")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1)
            .help("extra argument passed to the program before the config file")
        )
        .arg(Arg::with_name("use_all_cpus")
            .long("use_all_cpus")
            .help("include all available cpus in the worker pool")
        )
        .arg(Arg::with_name("debug")
            .long("debug")
            .help("set the logging output to debug, with lots more info printed")
        )
        .get_matches();

    logging::init(matches.is_present("debug"));

    let per_worker: usize = parse_arg(matches.value_of("N"), "N")?;
    let range = BoxRange::new(
        parse_arg(matches.value_of("start"), "start")?,
        parse_arg(matches.value_of("stop"), "stop")?,
        parse_arg(matches.value_of("step"), "step")?,
    )?;
    let total = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let layout = PoolLayout::new(per_worker, total, matches.is_present("use_all_cpus"))?;

    let config_path = matches.value_of("config").unwrap_or_default();
    let task = BoxTask {
        template: read_existing(Path::new(config_path))?,
        program: matches.value_of("exec").unwrap_or_default().to_string(),
        args: matches
            .values_of("arg")
            .map(|v| v.map(String::from).collect())
            .unwrap_or_default(),
    };

    let boxes = range.boxes();
    let report = run_boxes(&task, &boxes, &layout)
        .with_context(|| format!("running boxes with config `{}`", config_path))?;
    info!("{} of {} boxes completed", report.completed.len(), boxes.len());
    if !report.is_success() {
        bail!("{} box(es) failed", report.failed.len());
    }
    Ok(())
}
