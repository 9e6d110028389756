//! RUDP command-line front-end.
//!
//! # Usage
//!
//! ```bash
//! # Start a receiver, dropping 5% of inbound datagrams
//! rudp server --bind 0.0.0.0 --port 9000 --drop 0.05
//!
//! # Send an inline message
//! rudp client --host 127.0.0.1 --port 9000 --message "ola"
//!
//! # Send a file, encrypted
//! rudp client --port 9000 --file payload.bin --crypto
//!
//! # Derive the envelope key from a shared secret
//! rudp client --port 9000 --file payload.bin --secret "pass" --salt "AAECAwQFBgcICQoLDA0ODw=="
//!
//! # Send 10 MiB of synthetic data without congestion control
//! rudp client --port 9000 --size 10485760 --no-cc
//! ```

// Transfer results are the program's output.
#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use clap::{Parser, Subcommand};
use rand::RngCore as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rudp_client::{Sender, SenderConfig};
use rudp_core::TransferStats;
use rudp_crypto::{Key, SALT_LEN};
use rudp_server::{Receiver, ReceiverConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Reliable transport over UDP
#[derive(Parser, Debug)]
#[command(name = "rudp")]
#[command(about = "Reliable, optionally encrypted byte streams over UDP")]
#[command(version)]
struct Args {
    /// Shortcut for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the receiver until terminated
    Server {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(long, default_value_t = 9000)]
        port: u16,

        /// Probability of dropping each inbound datagram [0..1]
        #[arg(long, default_value_t = 0.0)]
        drop: f64,

        /// Fixed loss-injector seed for reproducible runs
        #[arg(long)]
        drop_seed: Option<u64>,
    },

    /// Connect, transfer one payload, and print the stats
    Client {
        /// Peer host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Peer port
        #[arg(long, default_value_t = 9000)]
        port: u16,

        /// Per-receive timeout in seconds
        #[arg(long, default_value_t = 1.0)]
        timeout: f64,

        /// Seal payloads (the key travels in the SYN)
        #[arg(long)]
        crypto: bool,

        /// Explicit URL-safe base64 envelope key; implies --crypto
        #[arg(long)]
        key: Option<String>,

        /// Derive the envelope key from this shared secret with
        /// PBKDF2-HMAC-SHA256; implies --crypto
        #[arg(long, conflicts_with = "key")]
        secret: Option<String>,

        /// URL-safe base64 16-byte salt for --secret; random if omitted
        #[arg(long, requires = "secret")]
        salt: Option<String>,

        /// Disable congestion control
        #[arg(long)]
        no_cc: bool,

        /// Inline message payload
        #[arg(long, default_value = "ola", conflicts_with_all = ["file", "size"])]
        message: String,

        /// Read the payload from a file
        #[arg(long, conflicts_with = "size")]
        file: Option<PathBuf>,

        /// Send this many synthetic random bytes
        #[arg(long)]
        size: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match args.command {
        Command::Server { bind, port, drop, drop_seed } => run_server(bind, port, drop, drop_seed),
        Command::Client {
            host,
            port,
            timeout,
            crypto,
            key,
            secret,
            salt,
            no_cc,
            message,
            file,
            size,
        } => {
            let payload = load_payload(message, file, size)?;
            let key = resolve_key(key, secret, salt)?;
            run_client(host, port, timeout, crypto, key, no_cc, &payload)
        },
    }
}

fn run_server(
    bind: String,
    port: u16,
    drop: f64,
    drop_seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let receiver = Receiver::bind(ReceiverConfig {
        bind_address: format!("{bind}:{port}"),
        drop_prob: drop,
        loss_seed: drop_seed,
        ..ReceiverConfig::default()
    })?;

    receiver.run()?;
    Ok(())
}

fn run_client(
    host: String,
    port: u16,
    timeout: f64,
    crypto: bool,
    key: Option<Key>,
    no_cc: bool,
    payload: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SenderConfig {
        use_crypto: crypto || key.is_some(),
        key,
        cc_enabled: !no_cc,
        ..SenderConfig::new(host, port, Duration::from_secs_f64(timeout), crypto)
    };

    let mut sender = Sender::new(config)?;
    sender.connect()?;
    let stats = sender.send(payload)?;
    sender.close();

    print_stats(&stats);
    Ok(())
}

/// Resolve the envelope key: an explicit base64 key, PBKDF2 derivation from
/// a shared secret, or none.
fn resolve_key(
    key: Option<String>,
    secret: Option<String>,
    salt: Option<String>,
) -> Result<Option<Key>, Box<dyn std::error::Error>> {
    if let Some(encoded) = key {
        return Ok(Some(Key::from_base64(&encoded)?));
    }

    let Some(secret) = secret else {
        return Ok(None);
    };

    let salt = match salt {
        Some(encoded) => decode_salt(&encoded)?,
        None => {
            let mut salt = [0u8; SALT_LEN];
            StdRng::from_entropy().fill_bytes(&mut salt);
            // The salt is not secret; log it so the derivation can be
            // repeated.
            info!(salt = %URL_SAFE.encode(salt), "generated derivation salt");
            salt
        },
    };

    Ok(Some(Key::derive(secret.as_bytes(), &salt)))
}

fn decode_salt(encoded: &str) -> Result<[u8; SALT_LEN], Box<dyn std::error::Error>> {
    let bytes = URL_SAFE.decode(encoded).map_err(|e| format!("salt is not base64: {e}"))?;
    let salt: [u8; SALT_LEN] =
        bytes.as_slice().try_into().map_err(|_| format!("salt must decode to {SALT_LEN} bytes"))?;
    Ok(salt)
}

/// Resolve the payload source: file beats synthetic size beats the inline
/// message.
fn load_payload(
    message: String,
    file: Option<PathBuf>,
    size: Option<usize>,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Some(path) = file {
        return Ok(std::fs::read(&path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?);
    }
    if let Some(len) = size {
        let mut data = vec![0u8; len];
        StdRng::from_entropy().fill_bytes(&mut data);
        return Ok(data);
    }
    Ok(message.into_bytes())
}

fn print_stats(stats: &TransferStats) {
    println!("packets sent      {}", stats.packets_sent);
    println!("bytes sent        {}", stats.bytes_sent);
    println!("elapsed           {} ms", stats.time_ms);
    println!("throughput        {:.2} KB/s", stats.throughput_kbps);
    println!("retransmissions   {}", stats.retransmissions);
}
