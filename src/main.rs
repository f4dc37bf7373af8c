use anyhow::Context;
use clap::Parser;

use rtrm::api::config_dto::ConfigDto;
use rtrm::domain::rpc::transport::spawn_rpc_server;
use rtrm::loader::parser::parse_json_file;
use rtrm::logger;

/// User-space run-time resource manager daemon.
#[derive(Parser, Debug)]
#[command(name = "rtrm", about = "Run-time resource manager")]
struct Args {
    /// Daemon configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Override the configured scheduling policy.
    #[arg(long)]
    policy: Option<String>,
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let mut config: ConfigDto = parse_json_file(&args.config).with_context(|| format!("cannot read configuration '{}'", args.config))?;
    if let Some(policy) = args.policy {
        log::info!("Policy override from the command line: '{}'", policy);
        config.policy = policy;
    }

    let mut daemon = rtrm::build_system_from(config).context("cannot build the daemon")?;
    log::info!("Daemon up: {} resources registered, policy '{}'", daemon.accounter.tree().len(), daemon.config.policy);

    // The dispatcher consumes the inbound record channel; the TCP endpoint
    // feeds it one session actor per connected application.
    let rpc_rx = std::mem::replace(&mut daemon.rpc_rx, std::sync::mpsc::channel().1);
    daemon.proxy.start(rpc_rx);
    let _server = spawn_rpc_server(daemon.config.rpc_bind.clone(), daemon.rpc_inbound.clone(), daemon.proxy.connections());

    let events_rx = std::mem::replace(&mut daemon.events_rx, std::sync::mpsc::channel().1);
    daemon.resource_manager.run(events_rx);

    daemon.proxy.stop();
    log::info!("Daemon stopped");
    Ok(())
}
