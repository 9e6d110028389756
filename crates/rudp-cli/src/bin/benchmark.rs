//! Benchmark driver for the RUDP transport.
//!
//! Runs the evaluation matrix — loss rate × crypto × congestion control —
//! with the receiver on a loopback thread and the sender in-process, then
//! persists the result records as JSON and prints a summary table.

// The summary table is the program's output.
#![allow(clippy::print_stdout)]

use std::fs::File;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rand::RngCore as _;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rudp_client::{Sender, SenderConfig};
use rudp_server::{MemorySink, Receiver, ReceiverConfig};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// RUDP evaluation scenarios
#[derive(Parser, Debug)]
#[command(name = "rudp-bench")]
#[command(about = "Run the RUDP evaluation scenarios and persist JSON results")]
#[command(version)]
struct Args {
    /// Transfer size in bytes (default 10 MiB = 10240 packets)
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    size: usize,

    /// Per-receive timeout in seconds for lossy scenarios
    #[arg(long, default_value_t = 0.3)]
    timeout: f64,

    /// Results file
    #[arg(long, default_value = "benchmark_results.json")]
    out: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// One persisted result record.
#[derive(Debug, Serialize)]
struct BenchmarkRecord {
    scenario: String,
    packets_sent: u64,
    bytes_sent: u64,
    time_ms: u64,
    throughput_kbps: f64,
    retransmissions: u64,
    drop_rate: f64,
    crypto: bool,
    cc_enabled: bool,
}

/// The evaluation matrix: loss sweep with congestion control on and off,
/// plus an encrypted clean run.
const SCENARIOS: &[(&str, f64, bool, bool)] = &[
    ("clean (cc on)", 0.0, false, true),
    ("clean (cc off)", 0.0, false, false),
    ("5% loss (cc on)", 0.05, false, true),
    ("5% loss (cc off)", 0.05, false, false),
    ("10% loss (cc on)", 0.10, false, true),
    ("10% loss (cc off)", 0.10, false, false),
    ("clean + crypto (cc on)", 0.0, true, true),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    println!(
        "benchmark: {:.1} MiB per scenario ({} packets)",
        args.size as f64 / (1024.0 * 1024.0),
        args.size.div_ceil(1024)
    );

    let mut records = Vec::new();
    for &(name, drop_rate, crypto, cc_enabled) in SCENARIOS {
        println!("running: {name}");
        let record = run_scenario(name, args.size, drop_rate, crypto, cc_enabled, args.timeout);
        println!(
            "  {} pkts, {:.1} KB/s, {} retx",
            record.packets_sent, record.throughput_kbps, record.retransmissions
        );
        records.push(record);
    }

    serde_json::to_writer_pretty(File::create(&args.out)?, &records)?;
    info!(path = %args.out.display(), "results written");

    print_summary(&records);
    Ok(())
}

/// Run one scenario: receiver on a thread, sender in this one.
fn run_scenario(
    name: &str,
    size: usize,
    drop_rate: f64,
    crypto: bool,
    cc_enabled: bool,
    timeout: f64,
) -> BenchmarkRecord {
    let zero = |reason: &str| {
        warn!(scenario = name, reason, "scenario failed");
        BenchmarkRecord {
            scenario: name.to_string(),
            packets_sent: 0,
            bytes_sent: 0,
            time_ms: 0,
            throughput_kbps: 0.0,
            retransmissions: 0,
            drop_rate,
            crypto,
            cc_enabled,
        }
    };

    let sink = MemorySink::new();
    let receiver = match Receiver::bind_with_sink(
        ReceiverConfig {
            bind_address: "127.0.0.1:0".to_string(),
            drop_prob: drop_rate,
            ..ReceiverConfig::default()
        },
        sink.clone(),
    ) {
        Ok(receiver) => receiver,
        Err(err) => return zero(&err.to_string()),
    };
    let Ok(addr) = receiver.local_addr() else {
        return zero("no local address");
    };
    thread::spawn(move || receiver.run());

    let config = SenderConfig {
        use_crypto: crypto,
        cc_enabled,
        ..SenderConfig::new("127.0.0.1", addr.port(), Duration::from_secs_f64(timeout), crypto)
    };
    let mut sender = match Sender::new(config) {
        Ok(sender) => sender,
        Err(err) => return zero(&err.to_string()),
    };

    // The handshake has no retransmission; under loss, retry it whole.
    let mut attempts = 0;
    while let Err(err) = sender.connect() {
        attempts += 1;
        if attempts >= 20 {
            return zero(&format!("connect failed: {err}"));
        }
    }

    let mut data = vec![0u8; size];
    StdRng::from_entropy().fill_bytes(&mut data);

    let stats = match sender.send(&data) {
        Ok(stats) => stats,
        Err(err) => return zero(&err.to_string()),
    };
    sender.close();

    if sink.total_bytes() != size {
        warn!(
            scenario = name,
            delivered = sink.total_bytes(),
            expected = size,
            "receiver delivered a different byte count"
        );
    }

    BenchmarkRecord {
        scenario: name.to_string(),
        packets_sent: stats.packets_sent,
        bytes_sent: stats.bytes_sent,
        time_ms: stats.time_ms,
        throughput_kbps: stats.throughput_kbps,
        retransmissions: stats.retransmissions,
        drop_rate,
        crypto,
        cc_enabled,
    }
}

fn print_summary(records: &[BenchmarkRecord]) {
    println!();
    println!("{:=<78}", "");
    println!(
        "{:<28} {:>8} {:>14} {:>8} {:>10}",
        "scenario", "packets", "KB/s", "retx", "time (s)"
    );
    println!("{:-<78}", "");
    for r in records {
        println!(
            "{:<28} {:>8} {:>14.1} {:>8} {:>10.2}",
            r.scenario,
            r.packets_sent,
            r.throughput_kbps,
            r.retransmissions,
            r.time_ms as f64 / 1000.0
        );
    }
    println!("{:=<78}", "");
}
