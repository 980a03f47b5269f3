//! Coronet peer node executable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use coronet::{
    logger_init, pf_error, verbose_level, ClusterConf, CoronetError, PeerEnv,
    PeerNode,
};

/// Peer node executable arguments.
#[derive(Parser, Debug)]
#[command(about = "Coronet peer node")]
struct CliArgs {
    /// Path to the shared cluster config file.
    #[arg(short, long, default_value = "./config.toml")]
    config: PathBuf,
}

async fn peer_main(args: CliArgs) -> Result<(), CoronetError> {
    let env = PeerEnv::from_env()?;
    let conf = ClusterConf::from_file(&args.config)?;

    let mut node = PeerNode::new_and_setup(
        &env,
        conf.register.to_addr(),
        conf.peer.to_addr(),
    )
    .await?;
    node.run().await
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // identity is refined to "p<id>" once the registrar assigns an id
    let verbose = std::env::var("VERBOSE").unwrap_or_default();
    logger_init("p?", verbose_level(&verbose));

    // the launcher tears peers down with SIGINT; that is a clean exit
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

    match runtime.block_on(peer_main(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            pf_error!("peer node failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
