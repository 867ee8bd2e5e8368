use std::{sync::Arc, thread};

use anyhow::{anyhow, Context};
use clap::Parser;
use rand::Rng;
use tracing::Level;

pub mod cli;
pub mod render;
pub mod trace;

use cli::Args;
use render::Console;
use shared::{CancelToken, Record, Station};
use trace::TraceWriter;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let seed: u64 = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    println!("Seed: {seed}");

    let (events, rx) = crossbeam_channel::unbounded::<Record>();
    let station =
        Station::new(args.config(seed), Arc::new(events)).context("Invalid configuration")?;

    let cancel = CancelToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        if c.cancel() {
            eprintln!("CTRL-C received, finishing cars in service (press again to kill)");
        } else {
            eprintln!("Killing");
            std::process::exit(1);
        }
    })?;

    let console = (!args.quiet).then(|| Console::new(station.config().waiting_capacity));
    let mut trace = args.trace.as_deref().map(TraceWriter::create).transpose()?;

    let renderer = thread::spawn(move || -> anyhow::Result<()> {
        for record in rx {
            if let Some(console) = &console {
                println!("{}", console.line(&record));
            }
            if let Some(trace) = &mut trace {
                trace.write(&record)?;
            }
        }
        match trace {
            Some(trace) => trace.finish(),
            None => Ok(()),
        }
    });

    let report = station.run_until(&cancel)?;
    // Dropping the station closes the event channel, which ends the renderer.
    drop(station);
    renderer
        .join()
        .map_err(|_| anyhow!("Event renderer panicked"))??;

    println!();
    println!("{report}");
    Ok(())
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}
