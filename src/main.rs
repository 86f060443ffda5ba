mod analysis;
mod board;
mod claims;
mod config;
mod constants;
mod engine;
mod event;
mod goal;
mod investigate;
mod pgn;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::claims::canonical::canonicalize;
use crate::claims::{bind::bind_claims, propose_claims, reduce::reduce};
use crate::config::InvestigatorConfig;
use crate::engine::EngineHandle;
use crate::goal::search::TargetPolicy;
use crate::investigate::Investigator;

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a UCI engine binary (e.g. stockfish)
    #[arg(long)]
    engine: String,

    /// Position to investigate
    #[arg(long, default_value = START_FEN)]
    fen: String,

    /// Investigate this specific move (SAN) instead of the whole position
    #[arg(long = "move")]
    move_san: Option<String>,

    /// Goal AST as inline JSON; switches to goal-directed target search
    #[arg(long)]
    goal: Option<String>,

    /// Named config profile to load from profiles/
    #[arg(long)]
    profile: Option<String>,

    #[arg(long)]
    depth_deep: Option<u32>,

    #[arg(long)]
    depth_shallow: Option<u32>,

    /// Engine pool size; 1 runs a single engine behind a FIFO queue,
    /// 0 picks one worker per logical core
    #[arg(long, default_value_t = 1)]
    engines: usize,

    /// Target-search depth bound (goal mode only)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Print the exploration PGN instead of the JSON report
    #[arg(long)]
    pgn: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.profile {
        Some(name) => config::load_profile(name)
            .with_context(|| format!("failed to load profile '{name}'"))?,
        None => InvestigatorConfig::default(),
    };
    if let Some(depth) = args.depth_deep {
        config.depth_deep = depth;
    }
    if let Some(depth) = args.depth_shallow {
        config.depth_shallow = depth;
    }

    let pool_size = if args.engines == 0 {
        num_cpus::get()
    } else {
        args.engines
    };
    let engine = if pool_size > 1 {
        EngineHandle::spawn_pool(&args.engine, pool_size).await?
    } else {
        EngineHandle::spawn_queue(&args.engine).await?
    };

    let investigator = Investigator::new(Arc::new(engine), config);

    // Progress events stream to the log; the JSON report is the contract.
    let mut events = investigator.events().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(event = ?event, "progress");
        }
    });

    let result = if let Some(goal_text) = &args.goal {
        let goal: serde_json::Value =
            serde_json::from_str(goal_text).context("goal is not valid JSON")?;
        let mut policy = TargetPolicy::default();
        if let Some(depth) = args.max_depth {
            policy.max_depth = depth;
        }
        investigator.investigate_target(&args.fen, &goal, policy).await
    } else if let Some(move_san) = &args.move_san {
        investigator.investigate_move(&args.fen, move_san).await
    } else {
        investigator.investigate_with_dual_depth(&args.fen).await
    };

    if args.pgn {
        println!("{}", result.pgn_exploration);
    } else {
        let bound = canonicalize(&result, None, bind_claims(&result, propose_claims(&result)));
        let reduction = reduce(&result, &bound);
        let report = json!({
            "investigation": result,
            "claims": bound,
            "reduction": reduction,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    progress.abort();
    Ok(())
}
