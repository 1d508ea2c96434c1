use std::error::Error;

use clap::Parser;
use gomodnix::{cli::args::CliArgs, Gomodnix};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args = CliArgs::parse();

    let mut builder = Gomodnix::builder()
        .root(&cli_args.dir)
        .outfile(&cli_args.outfile)
        .rewrites(cli_args.rewrites);
    if let Some(infile) = &cli_args.infile {
        builder = builder.infile(infile);
    }
    if let Some(jobs) = cli_args.jobs {
        builder = builder.jobs(jobs);
    }
    if cli_args.keep_going {
        builder = builder.keep_going(true);
    }

    builder.try_build()?.generate()?;
    Ok(())
}
