//! Entry point for `abp-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, signal handling, argument parsing, files).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{BufReader, BufWriter};
use tokio_util::sync::CancellationToken;

use abp_transfer::config::DEFAULT_CHUNK_SIZE;
use abp_transfer::simulator::{FaultConfig, FaultyChannel};
use abp_transfer::{
    ChecksumKind, ReceiverSession, SenderSession, Socket, TimeoutPolicy, TransferConfig,
};

/// Reliable file transfer over UDP with the alternating bit protocol.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Retransmission timeout in milliseconds (initial value if adaptive).
        #[arg(long, default_value_t = 50)]
        timeout_ms: u64,
        /// Derive the timeout from measured round-trip times.
        #[arg(long)]
        adaptive: bool,
        /// Give up after this many retransmissions of one packet.
        #[arg(long)]
        max_retries: Option<u32>,
        #[command(flatten)]
        protocol: ProtocolArgs,
        #[command(flatten)]
        faults: FaultArgs,
    },
    /// Receive one file and write it to disk.
    Receive {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Where to write the received bytes.
        #[arg(short, long)]
        output: PathBuf,
        /// Read, process and acknowledge on separate tasks.
        #[arg(long)]
        pipelined: bool,
        /// Keep answering end markers this long after closing.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
        /// Abort if nothing arrives for this long.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
        #[command(flatten)]
        protocol: ProtocolArgs,
        #[command(flatten)]
        faults: FaultArgs,
    },
}

/// Parameters both peers must agree on.
#[derive(Args)]
struct ProtocolArgs {
    /// Payload bytes per packet.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Use CRC-16 instead of the Internet checksum.
    #[arg(long)]
    crc16: bool,
}

/// Outbound fault injection; all probabilities in [0, 1].
#[derive(Args)]
struct FaultArgs {
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,
    #[arg(long, default_value_t = 0.0)]
    delay: f64,
    #[arg(long, default_value_t = 100)]
    max_delay_ms: u64,
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,
    /// Seed for reproducible fault patterns.
    #[arg(long)]
    seed: Option<u64>,
}

impl ProtocolArgs {
    fn config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size,
            checksum: if self.crc16 {
                ChecksumKind::Crc16
            } else {
                ChecksumKind::Internet
            },
            ..TransferConfig::default()
        }
    }
}

impl FaultArgs {
    /// `None` when no fault is requested, so the plain socket is used.
    fn config(&self) -> Result<Option<FaultConfig>> {
        let cfg = FaultConfig {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            delay_rate: self.delay,
            max_delay: Duration::from_millis(self.max_delay_ms),
            duplicate_rate: self.duplicate,
            seed: self.seed,
            ..FaultConfig::default()
        };
        cfg.validate().map_err(anyhow::Error::msg)?;
        let active = [self.loss, self.corrupt, self.delay, self.duplicate]
            .iter()
            .any(|&p| p > 0.0);
        Ok(active.then_some(cfg))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted; cancelling transfer");
            on_ctrl_c.cancel();
        }
    });

    match cli.mode {
        Mode::Send {
            peer,
            file,
            bind,
            timeout_ms,
            adaptive,
            max_retries,
            protocol,
            faults,
        } => {
            let initial = Duration::from_millis(timeout_ms);
            let config = TransferConfig {
                timeout: if adaptive {
                    TimeoutPolicy::adaptive_from(initial)
                } else {
                    TimeoutPolicy::Fixed(initial)
                },
                max_retries,
                ..protocol.config()
            };
            let source = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let source = BufReader::new(source);
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            log::info!("Sending {} to {peer}", file.display());

            let report = match faults.config()? {
                Some(fc) => {
                    SenderSession::new(FaultyChannel::new(socket, fc), peer, config)
                        .with_cancellation(cancel)
                        .run(source)
                        .await?
                }
                None => {
                    SenderSession::new(socket, peer, config)
                        .with_cancellation(cancel)
                        .run(source)
                        .await?
                }
            };
            println!("{report}");
        }
        Mode::Receive {
            bind,
            output,
            pipelined,
            linger_ms,
            idle_timeout_ms,
            protocol,
            faults,
        } => {
            let config = TransferConfig {
                linger: Duration::from_millis(linger_ms),
                idle_timeout: idle_timeout_ms.map(Duration::from_millis),
                ..protocol.config()
            };
            let sink = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("creating {}", output.display()))?;
            let sink = BufWriter::new(sink);
            let socket = Socket::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            log::info!("Receiving on {} into {}", socket.local_addr, output.display());

            let report = match faults.config()? {
                Some(fc) => {
                    let session = ReceiverSession::new(FaultyChannel::new(socket, fc), config)
                        .with_cancellation(cancel);
                    if pipelined {
                        session.run_pipelined(sink).await?
                    } else {
                        session.run(sink).await?
                    }
                }
                None => {
                    let session =
                        ReceiverSession::new(socket, config).with_cancellation(cancel);
                    if pipelined {
                        session.run_pipelined(sink).await?
                    } else {
                        session.run(sink).await?
                    }
                }
            };
            println!("{report}");
        }
    }
    Ok(())
}
