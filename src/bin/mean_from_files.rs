use anyhow::{Context, Result};
use clap::{App, Arg};
use log::info;

use pkmu_tools::average::{AverageOptions, MODES};
use pkmu_tools::batch::{average_from_files, AverageRequest, Mode};
use pkmu_tools::{logging, ResultKind};

pub fn main() -> Result<()> {
    let matches = App::new("mean_from_files")
        .about("read in a set of 1D or 2D plain text files and output the mean measurement to a plain text file")
        .arg(Arg::with_name("mode")
            .required(true)
            .possible_values(&["1d", "2d"])
            .help("the mode, either 1D or 2D")
        )
        .arg(Arg::with_name("pattern")
            .required(true)
            .help("the pattern to match files on")
        )
        .arg(Arg::with_name("output")
            .required(true)
            .help("the name of the output file")
        )
        .arg(Arg::with_name("batch")
            .long("batch")
            .takes_value(true)
            .multiple(true)
            .value_name("token")
            .help("loop over these arguments, replacing %s in the input/output files")
        )
        .arg(Arg::with_name("weights")
            .long("weights")
            .takes_value(true)
            .default_value(MODES)
            .help("the column to use as weights, or `none`")
        )
        .arg(Arg::with_name("sum_only")
            .long("sum_only")
            .takes_value(true)
            .multiple(true)
            .min_values(0)
            .help("the sum only columns [default: modes]")
        )
        .arg(Arg::with_name("class")
            .long("class")
            .takes_value(true)
            .value_name("name")
            .help("the result class, one of Power1dDataSet, Power2dDataSet, Corr1dDataSet, Corr2dDataSet")
        )
        .arg(Arg::with_name("debug")
            .long("debug")
            .help("set the logging output to debug")
        )
        .get_matches();

    logging::init(matches.is_present("debug"));

    let mode: Mode = matches.value_of("mode").unwrap_or("2d").parse()?;
    let mut req = AverageRequest::new(
        mode,
        matches.value_of("pattern").unwrap_or_default(),
        matches.value_of("output").unwrap_or_default(),
    );
    if let Some(batch) = matches.values_of("batch") {
        req.batch = batch.map(String::from).collect();
    }

    let weights = matches.value_of("weights").unwrap_or(MODES);
    let sum_only = if matches.occurrences_of("sum_only") > 0 {
        matches
            .values_of("sum_only")
            .map(|v| v.map(String::from).collect())
            .unwrap_or_default()
    } else {
        std::iter::once(MODES.to_string()).collect()
    };
    req.options = AverageOptions {
        weights: if weights == "none" { None } else { Some(weights.to_string()) },
        sum_only,
    };
    if let Some(cls) = matches.value_of("class") {
        req.kind = cls.parse::<ResultKind>()?;
    }

    let written = average_from_files(&req)
        .with_context(|| format!("averaging files matching `{}`", req.pattern))?;
    info!("done, {} output file(s)", written.len());
    Ok(())
}
