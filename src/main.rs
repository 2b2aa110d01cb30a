//! amqpsnoop — snoop JSON messages flowing through an AMQP exchange
//!
//! Binds an ephemeral exclusive queue to an exchange under a routing-key
//! pattern, runs every received message through a chain of `-f` filter
//! expressions, and prints the survivors to stdout.
//!
//! # Usage
//!
//! ```bash
//! # show all messages under "ca." whose ca_subtype is not "ping"
//! amqpsnoop -h 10.99.99.5 -r "ca.#" -f 'msg.ca_subtype != "ping"'
//!
//! # compact JSON, one message per line
//! amqpsnoop -r "#" -o compact-json
//! ```

mod config;
mod error;
mod expr;
mod filter;
mod output;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use config::BrokerEndpoint;
use error::SnoopError;
use filter::FilterChain;
use output::{Format, Formatter};
use session::{BindingSpec, BrokerSession};

/// Snoop JSON messages sent through an AMQP exchange.
///
/// The short help flag is disabled because `-h` selects the broker host, as
/// it always has for this tool; use `--help`.
#[derive(Parser, Debug)]
#[command(name = "amqpsnoop", version, disable_help_flag = true)]
struct Cli {
    /// Hostname of the AMQP broker (default: from etc/config.json, else localhost)
    #[arg(short = 'h', value_name = "host")]
    host: Option<String>,

    /// Routing key to bind to
    #[arg(short = 'r', value_name = "routekey", default_value = "#")]
    routekey: String,

    /// Filter expression evaluated against each message, with the message
    /// bound to "msg"; may be repeated, and a message is only printed if
    /// every filter returns true
    #[arg(short = 'f', value_name = "filter")]
    filters: Vec<String>,

    /// Output format: structured-dump, pretty-json, or compact-json
    #[arg(short = 'o', value_name = "format", default_value = "structured-dump")]
    format: String,

    /// Exchange name
    #[arg(short = 'x', value_name = "exchange", default_value = "amq.topic")]
    exchange: String,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging();

    // Every flag-derived failure is checked here, before any connection
    // attempt is made.
    let chain = FilterChain::compile(&cli.filters)?;
    let format = Format::parse(&cli.format)
        .ok_or_else(|| SnoopError::UnknownFormat(cli.format.clone()))?;
    let formatter = Formatter::new(format);

    let mut endpoint = BrokerEndpoint::load();
    if let Some(host) = cli.host.as_deref() {
        endpoint = endpoint.with_host(host);
    }

    let binding = BindingSpec {
        exchange: cli.exchange,
        routing_key: cli.routekey,
    };

    tracing::info!(
        host = %endpoint.host,
        port = endpoint.port,
        filters = chain.len(),
        "connecting to broker"
    );
    let session = BrokerSession::connect(&endpoint, &binding)
        .await
        .with_context(|| format!("failed to set up session with {}", endpoint.host))?;

    session.run(&chain, &formatter).await?;
    Ok(())
}

/// Logging goes to stderr; stdout carries nothing but formatted messages.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
