use clap::Parser;
use splatpack_cli::{Cli, run};

fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse().validate()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    let report = run(&args);
    report.log_summary();

    if report.has_failures() {
        anyhow::bail!("Some assets failed to convert");
    }
    Ok(())
}
