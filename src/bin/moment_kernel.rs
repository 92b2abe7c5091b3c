use anyhow::{bail, Context, Result};
use clap::{App, Arg};
use std::path::Path;

use pkmu_tools::submit::read_existing;
use pkmu_tools::transfer::MomentKernel;

pub fn main() -> Result<()> {
    let matches = App::new("moment_kernel")
        .about("print the normalization of the radial momentum moment transfer kernel")
        .arg(Arg::with_name("ell")
            .short("l")
            .long("ell")
            .takes_value(true)
            .help("the (1st) radial velocity moment")
        )
        .arg(Arg::with_name("ell_prime")
            .short("m")
            .long("ell-prime")
            .takes_value(true)
            .requires("ell")
            .help("the 2nd radial velocity moment, for cross moments")
        )
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .takes_value(true)
            .conflicts_with("ell")
            .help("yaml file holding a tagged kernel, e.g. `kind: cross`")
        )
        .get_matches();

    let kernel = if let Some(path) = matches.value_of("config") {
        let text = read_existing(Path::new(path))?;
        MomentKernel::from_yaml(&text).with_context(|| format!("reading kernel from `{}`", path))?
    } else if let Some(ell) = matches.value_of("ell") {
        let ell: u32 = ell.parse().context("`ell` must be a non-negative integer")?;
        match matches.value_of("ell_prime") {
            Some(m) => MomentKernel::cross(ell, m.parse().context("`ell-prime` must be a non-negative integer")?)?,
            None => MomentKernel::auto(ell)?,
        }
    } else {
        bail!("give either --ell or --config");
    };

    println!("{:?} {:e}", kernel, kernel.factor());
    Ok(())
}
