//! Minimal CLI exercising a transport built from a transport string: one side
//! creates a session and sends a line from stdin, the other accepts and
//! echoes what it receives. Illustrative, not a benchmark harness — this
//! crate is an embeddable library, and the command line is not part of its
//! public surface.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use transport_rs::executor::Executor;
use transport_rs::factory::Factory;
use transport_rs::logging::ColorizedFormatter;
use transport_rs::session::wire::CreateInfo;
use transport_rs::session::Session;
use transport_rs::transport::Transport;

/// Opens a transport from a transport string and runs it as one side of a
/// reliable session.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Transport string, e.g. "TCP;Active;Host=localhost;Port=3000".
    transport_string: String,

    /// Originate the session (sends CREATE and relays stdin lines).
    #[arg(long, conflicts_with = "accept")]
    create: bool,

    /// Accept the session (listens and echoes each line it receives).
    #[arg(long, conflicts_with = "create")]
    accept: bool,

    /// Increase log verbosity. Repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
        .init();

    if !args.create && !args.accept {
        bail!("specify exactly one of --create or --accept");
    }

    let executor = Executor::current();
    let factory = Factory::new();
    let transport = factory
        .create(&args.transport_string, executor.clone())
        .context("failed to build transport from transport string")?;

    if args.create {
        run_originating(transport, executor).await
    } else {
        run_accepting(transport, executor).await
    }
}

async fn run_originating(
    transport: transport_rs::transport::AnyTransport,
    executor: Executor,
) -> Result<()> {
    let mut session = Session::connect(
        transport,
        CreateInfo {
            name: "demo".into(),
            password: String::new(),
            force: false,
        },
        executor,
    );
    session.open().await.context("session handshake failed")?;
    info!("session created: id={:?}", session.id().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        session.write(line.as_bytes()).await?;
    }
    session.close().await.ok();
    Ok(())
}

async fn run_accepting(
    transport: transport_rs::transport::AnyTransport,
    executor: Executor,
) -> Result<()> {
    let mut listener = Session::listen(transport, executor);
    listener.open().await.context("failed to open listening transport")?;
    info!("listening for sessions");

    loop {
        let mut accepted = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            loop {
                match accepted.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buf[..n]);
                        println!("{text}");
                    }
                }
            }
        });
    }
}
