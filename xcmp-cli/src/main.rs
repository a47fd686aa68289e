#![forbid(unsafe_code)]

mod error;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use error::CliError;
use xcmp_core::config::{load_from_path, Config, TransportKind};
use xcmp_core::transport::{ByteTransport, TcpTransport, UdpTransport};
use xcmp_core::xnl::XnlSession;
use xcmp_core::XcmpClient;

#[derive(Parser, Debug)]
#[command(author, version, about = "XCMP/XNL radio control client")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "xcmp.toml")]
    config: PathBuf,

    #[command(subcommand)]
    operation: Operation,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Ping the radio and report whether it answered.
    Ping,
    /// Read the device serial number.
    GetSerial,
    /// Read the device model string.
    GetModel,
    /// Tune the transmit frequency, in Hz.
    SetTxFrequency { hz: u64 },
    /// Tune the receive frequency, in Hz.
    SetRxFrequency { hz: u64 },
    /// Key the transmitter.
    Keyup,
    /// Release the transmitter.
    Dekey,
    /// Run a P25 bit-error-rate test over the given frame count.
    GetBer {
        #[arg(default_value_t = 10)]
        frames: u32,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        error!(%err, "operation failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_from_path(&cli.config)
        .map_err(|source| CliError::Config { path: cli.config.clone(), source })?;
    info!(host = %config.host, port = config.port, transport = ?config.transport, "configuration loaded");

    let mut session = build_session(&config)?;
    session.connect()?;

    let mut client = XcmpClient::new(session);
    client.connect_without_probe()?;

    match cli.operation {
        Operation::Ping => {
            let alive = client.ping()?;
            println!("ping: {alive}");
        }
        Operation::GetSerial => println!("serial: {}", client.get_serial()?),
        Operation::GetModel => println!("model: {}", client.get_model()?),
        Operation::SetTxFrequency { hz } => {
            client.set_tx_frequency(hz)?;
            println!("tx frequency set to {hz} Hz");
        }
        Operation::SetRxFrequency { hz } => {
            client.set_rx_frequency(hz)?;
            println!("rx frequency set to {hz} Hz");
        }
        Operation::Keyup => {
            client.keyup()?;
            println!("keyed up");
        }
        Operation::Dekey => {
            client.dekey()?;
            println!("dekeyed");
        }
        Operation::GetBer { frames } => {
            let ber = client.get_p25_ber(frames)?;
            println!("P25 BER over {frames} frames: {ber:e}");
        }
    }

    client.disconnect()?;
    Ok(())
}

fn build_session(config: &Config) -> Result<XnlSession<Box<dyn ByteTransport>>, CliError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let transport: Box<dyn ByteTransport> = match config.transport {
        TransportKind::Tcp => Box::new(TcpTransport::with_timeout(config.addr()?, timeout)),
        TransportKind::Udp => Box::new(UdpTransport::with_timeout(config.addr()?, timeout)),
        TransportKind::PppSerial => {
            return Err(CliError::UnsupportedTransport {
                transport: config.transport,
                reason: "this binary has no serial-port backend to hand PppSerialTransport; \
                         build one against xcmp_core::transport::ByteTransport and wire it in",
            })
        }
    };
    Ok(XnlSession::new(transport, config.tea.into()))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}
