use clap::Parser;
use forge_cli::commands::{cli, providers, run};
use forge_cli::logging::init_tracing;
use forge_core::config::{self, AppConfig};
use forge_core::error::CliError;

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => run::run(&run_args, &cfg).await,
        cli::Commands::Providers(p) => Ok(providers::print_providers(&cfg, p.json)),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, CliError> {
    let loaded = match path {
        Some(p) => config::load_from_path(p),
        None => config::load_default(),
    };
    loaded.map_err(|e| CliError::Config(format!("{e:#}")))
}
