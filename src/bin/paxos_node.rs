#![deny(clippy::all, clippy::pedantic, warnings)]

#[macro_use]
extern crate log;

use {
    clap::Parser,
    paxos_core::{util::set_up_logging, Peer, RuntimeOptions},
    std::{
        io,
        net::{IpAddr, SocketAddr},
        path::PathBuf,
        process::exit,
        time::Duration,
    },
    tokio::time::sleep,
};

// The program version
const VERSION: &str = env!("CARGO_PKG_VERSION");

// Defaults
const CONFIG_FILE_DEFAULT_PATH: &str = "config.yml";
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(250);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A demo node wiring the `paxos_core` library to a real network
/// transport. Proposes one value if asked, otherwise just serves RPCs
/// until interrupted.
#[derive(Parser)]
#[command(name = "Paxos", version = VERSION, about = "A library implementing single-decree Paxos.")]
struct Args {
    /// Sets the index of the node corresponding to this instance
    #[arg(short, long, value_name = "INDEX")]
    node: usize,

    /// Sets the path of the config file
    #[arg(short, long, value_name = "PATH", default_value = CONFIG_FILE_DEFAULT_PATH)]
    config_file: PathBuf,

    /// Sets the IP address to run on (if different from the configuration)
    #[arg(short, long, value_name = "ADDRESS")]
    ip: Option<IpAddr>,

    /// Sets the port to run on (if different from the configuration)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// The instance number to propose to, if `--propose` is given
    #[arg(short, long, value_name = "SEQ", default_value_t = 0)]
    seq: u64,

    /// Proposes this value for `--seq` and prints the eventual decision
    #[arg(short = 'v', long, value_name = "VALUE")]
    propose: Option<String>,

    /// Enables the loss-injection transport mode, for testing
    #[arg(long)]
    unreliable: bool,
}

async fn run() -> io::Result<()> {
    let args = Args::parse();

    let config = paxos_core::config::read(&args.config_file).await?;
    if args.node >= config.nodes.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("There is no node with index {}.", args.node),
        ));
    }

    let mut nodes = config.nodes;
    let mut address = nodes[args.node];
    if let Some(ip) = args.ip {
        address.set_ip(ip);
    }
    if let Some(port) = args.port {
        address.set_port(port);
    }
    nodes[args.node] = address;

    let options = RuntimeOptions {
        unreliable: args.unreliable,
        rpc_timeout: DEFAULT_RPC_TIMEOUT,
        backoff_max: DEFAULT_BACKOFF_MAX,
    };

    let peer = Peer::make(nodes, args.node, options).await?;
    info!("Listening on {}.", peer.local_addr());

    if let Some(value) = args.propose {
        peer.start(args.seq, value.into_bytes());
        loop {
            if let (true, Some(decided)) = peer.get(args.seq) {
                info!(
                    "Instance {} decided: {}",
                    args.seq,
                    String::from_utf8_lossy(&decided)
                );
                break;
            }
            sleep(POLL_INTERVAL).await;
        }
    } else {
        // No value to propose; just serve RPCs until interrupted.
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down.");
        }
    }

    peer.kill();
    Ok(())
}

#[tokio::main]
async fn main() {
    set_up_logging();
    if let Err(error) = run().await {
        error!("{}", error);
        exit(1);
    }
}
