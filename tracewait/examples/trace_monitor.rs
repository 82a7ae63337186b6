//! Trace monitor example: send a command and wait for its response
//!
//! Connects to a line-oriented TCP endpoint, sends a command, waits for a
//! pattern, then keeps printing every line matching a monitor pattern until
//! the timeout runs out.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example trace_monitor -- --host 192.168.1.1 --port 12345 \
//!     --command "get version" --expect "version (\S+)" --monitor "ERROR.*"
//! ```
//!
//! A local endpoint to play with: `nc -l 12345`

use std::env;
use std::time::Duration;

use futures_util::StreamExt;
use tracewait::{ConnectionBuilder, FilterSpec, TcpConfig, WaitRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug to see every received line)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Connecting to {}:{}...", args.host, args.port);
    let mut tcp = TcpConfig::client(&args.host, args.port);
    tcp.strip_ansi = true;

    let connection = ConnectionBuilder::new("monitor").tcp(tcp).open().await?;
    println!("Connected!");

    // Register the monitor first so nothing printed after the command is missed
    let mut monitor = connection.activate_filter(FilterSpec::simple(&args.monitor)?);

    let request = WaitRequest::simple(&args.expect)?
        .with_timeout(Duration::from_secs(args.timeout))
        .send(args.command.as_str());

    println!("\nExecuting: {}", args.command);
    match connection.wait_for_pattern(request).await {
        Some(found) => {
            println!("Matched: {}", found.as_str());
            for index in 1..found.len() {
                println!("  group {}: {:?}", index, found.get(index));
            }
        }
        None => println!("No match within {}s", args.timeout),
    }

    println!("\nMonitoring '{}' for {}s...", args.monitor, args.timeout);
    let deadline = tokio::time::sleep(Duration::from_secs(args.timeout));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = monitor.next() => match event {
                Some(event) => {
                    if let Some(found) = event.matched {
                        println!("{:?}: {}", event.timestamp, found.haystack());
                    }
                }
                None => break,
            },
        }
    }

    println!("\nClosing connection...");
    monitor.close();
    connection.quit().await?;
    println!("Done!");

    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    command: String,
    expect: String,
    monitor: String,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 12345,
            command: "help".to_string(),
            expect: ".+".to_string(),
            monitor: "(?i)error".to_string(),
            timeout: 5,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match (args[i].as_str(), value) {
                ("--host" | "-h", Some(value)) => parsed.host = value,
                ("--port" | "-p", Some(value)) => parsed.port = value.parse().unwrap_or(12345),
                ("--command" | "-c", Some(value)) => parsed.command = value,
                ("--expect" | "-e", Some(value)) => parsed.expect = value,
                ("--monitor" | "-m", Some(value)) => parsed.monitor = value,
                ("--timeout" | "-t", Some(value)) => parsed.timeout = value.parse().unwrap_or(5),
                ("--help", _) => {
                    Self::print_help();
                    std::process::exit(0);
                }
                (other, _) => {
                    eprintln!("Unknown or incomplete argument: {}", other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        parsed
    }

    fn print_help() {
        println!(
            r#"tracewait trace_monitor example

USAGE:
    cargo run --example trace_monitor -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>         Target host [default: localhost]
    -p, --port <PORT>         TCP port [default: 12345]
    -c, --command <CMD>       Command to send [default: help]
    -e, --expect <REGEX>      Pattern awaited after the command [default: .+]
    -m, --monitor <REGEX>     Pattern printed while monitoring [default: (?i)error]
    -t, --timeout <SECS>      Wait and monitor duration [default: 5]
    --help                    Print this help message
"#
        );
    }
}
