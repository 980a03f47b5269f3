//! Coronet registrar executable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use coronet::{
    logger_init, pf_error, verbose_level, ClusterConf, CoronetError,
    Registrar, RegistrarEnv,
};

/// Registrar executable arguments.
#[derive(Parser, Debug)]
#[command(about = "Coronet registrar (bootstrap rendezvous)")]
struct CliArgs {
    /// Path to the shared cluster config file.
    #[arg(short, long, default_value = "./config.toml")]
    config: PathBuf,
}

async fn registrar_main(args: CliArgs) -> Result<(), CoronetError> {
    let env = RegistrarEnv::from_env()?;
    let conf = ClusterConf::from_file(&args.config)?;

    let registrar =
        Registrar::new_and_setup(conf.register.to_addr(), env.peers).await?;
    registrar.serve().await
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let verbose = std::env::var("VERBOSE").unwrap_or_default();
    logger_init("reg", verbose_level(&verbose));

    // the launcher tears the service down with SIGINT; that is a clean exit
    if let Err(e) = ctrlc::set_handler(|| std::process::exit(0)) {
        pf_error!("cannot install signal handler: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            pf_error!("cannot build tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(registrar_main(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            pf_error!("registrar failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
