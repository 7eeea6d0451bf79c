use anyhow::Result;
use blockchain_core::{Chain, Difficulty, Miner, Strategy};
use clap::Parser;
use std::io;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod shell;

use shell::Shell;

#[derive(Parser, Debug)]
#[command(name = "blockchain-cli")]
#[command(about = "Interactive shell over a proof-of-work blockchain shared by Alice and Bob")]
struct Args {
    /// Amount Alice holds in the genesis block
    #[arg(allow_negative_numbers = true)]
    initial: i32,

    /// Search nonces on every core instead of one
    #[arg(long)]
    parallel: bool,

    /// Give up mining a block after this many nonces
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Leading zero bytes a block hash needs; 3 is the real target, lower
    /// values make a quick demo chain
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=32))]
    zero_bytes: u8,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays the shell transcript.
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let strategy = if args.parallel {
        Strategy::Parallel
    } else {
        Strategy::Sequential
    };
    let mut miner = Miner::new(strategy);
    if let Some(max_attempts) = args.max_attempts {
        miner = miner.with_max_attempts(max_attempts);
    }

    let difficulty = Difficulty(args.zero_bytes);
    info!(initial = args.initial, %difficulty, ?strategy, "creating chain");
    let chain = Chain::with_miner(args.initial, difficulty, &miner)?;

    let mut shell = Shell::new(chain, miner, io::stdin().lock(), io::stdout().lock());
    shell.run()
}
