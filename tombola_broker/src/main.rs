// CLI entry point for the Tombola signaling broker.
//
// Starts a standalone broker that hosts register with and players resolve
// against. The broker never carries game traffic — it only maps room
// addresses to host socket addresses. See `server.rs` for the networking
// architecture and `registry.rs` for the directory state.
//
// Usage:
//   broker [OPTIONS]
//     --port <PORT>    Listen port (default: 7879)

use tombola_broker::server::{BrokerConfig, start_broker};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();

    let (handle, addr) = match start_broker(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start broker: {e}");
            std::process::exit(1);
        }
    };

    println!("Broker listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // The process exits on SIGINT/SIGTERM by default, which is fine for a
    // directory service with no state worth flushing. `_handle` keeps the
    // server threads alive until then.
    let _handle = handle;
    loop {
        std::thread::park();
    }
}

/// Parse command-line arguments into a `BrokerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> BrokerConfig {
    let mut config = BrokerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: broker [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>    Listen port (default: 7879)");
    println!("  --help, -h       Show this help");
}
