mod cli;
mod environment;
mod logging;
mod run;

use anyhow::Result;
use cli::Command;
use environment::Environment;

fn main() -> Result<()> {
    let cli = cli::parse();
    let environment = Environment::discover()?;
    environment.ensure()?;
    logging::initialise_tracing(&environment.log_file())?;

    let result = dispatch(cli, &environment);
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "shaderreel exited with an error");
    }
    result
}

fn dispatch(cli: cli::Cli, environment: &Environment) -> Result<()> {
    let global = cli.global;
    let settings = || run::load_settings(environment, &global);
    match cli.command {
        Some(Command::Where) => {
            run::describe_paths(environment);
            Ok(())
        }
        None => run::run(environment, &settings()?, cli::RunArgs::default()),
        Some(Command::Run(args)) => run::run(environment, &settings()?, args),
        Some(Command::Pick { seed }) => {
            // A broken config.toml is still reported.
            settings()?;
            run::pick(environment, seed)
        }
        Some(Command::Fetch { id }) => run::fetch(environment, &settings()?, &id),
        Some(Command::Warm) => run::warm(environment, &settings()?),
    }
}
