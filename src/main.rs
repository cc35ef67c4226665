//! volosd binary entry point.

use std::env;
use std::io;

use tracing::error;
use tracing_subscriber::EnvFilter;

use volosd::audio::PactlClient;
use volosd::Osd;

const DEFAULT_LOG_FILTER: &str = "volosd=info";
const DEBUG_LOG_FILTER: &str = "volosd=debug";

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut debug = false;
    for arg in &args {
        match arg.as_str() {
            "-v" | "--debug" => debug = true,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let default_filter = if debug { DEBUG_LOG_FILTER } else { DEFAULT_LOG_FILTER };
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_owned());
    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::builder().parse_lossy(directives))
        .init();

    let osd = match Osd::bootstrap(PactlClient::new()) {
        Ok(osd) => osd,
        Err(err) => {
            error!("startup failed: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = osd.run() {
        error!("fatal error: {err:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: volosd [-v | --debug]");
    eprintln!();
    eprintln!("Transient volume OSD for X11. Grabs j/k (volume down/up), m (mute)");
    eprintln!("and q/Escape (quit) on the root window, and exits on its own when");
    eprintln!("input focus moves to another window.");
}
