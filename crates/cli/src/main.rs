//! `ideaforge` binary.
//!
//! ```text
//! ideaforge serve                       # HTTP endpoint on server.host:server.port
//! ideaforge run --idea "..." [--industry saas] [--max-cost 0.5]
//! ```
//!
//! Configuration comes from the environment (see [`config`]); telemetry is
//! installed before anything else so every crate's spans are captured.

mod app;
mod config;
mod telemetry;

use std::net::SocketAddr;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pipeline::{AnalysisDepth, CostBudget, IdeaContext};
use tracing::info;

use crate::app::Components;
use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "ideaforge", version, about = "Turns a startup idea into an investor-ready dossier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the pipeline over HTTP.
    Serve {
        /// Overrides server.host/server.port.
        #[arg(long, env = "IDEA_FORGE_BIND")]
        bind: Option<SocketAddr>,
    },
    /// Run the pipeline once and print the result as JSON.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    #[arg(long)]
    idea: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    one_liner: Option<String>,
    #[arg(long)]
    industry: Option<String>,
    #[arg(long)]
    target_market: Option<String>,
    /// USD cap for this run; defaults to pipeline.budget_limit.
    #[arg(long)]
    max_cost: Option<f64>,
    #[arg(long, value_parser = parse_depth, default_value = "standard")]
    depth: AnalysisDepth,
}

fn parse_depth(raw: &str) -> Result<AnalysisDepth, String> {
    match raw {
        "quick" => Ok(AnalysisDepth::Quick),
        "standard" => Ok(AnalysisDepth::Standard),
        "deep" => Ok(AnalysisDepth::Deep),
        other => Err(format!("unknown depth '{other}' (quick, standard, deep)")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;
    let telemetry = telemetry::init()?;

    let outcome = match cli.command {
        Command::Serve { bind } => serve(&config, bind).await,
        Command::Run(args) => run(&config, args).await,
    };

    telemetry.shutdown();
    outcome
}

async fn serve(config: &AppConfig, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = match bind {
        Some(addr) => addr,
        None => config.bind_address()?,
    };
    let state = Components::build(config)?.into_state();
    listener::serve(addr, state).await?;
    Ok(())
}

async fn run(config: &AppConfig, args: RunArgs) -> anyhow::Result<()> {
    if !config.llm.has_api_key() {
        bail!("no Anthropic API key configured; set IDEA_FORGE__LLM__ANTHROPIC_API_KEY or ANTHROPIC_API_KEY");
    }
    let components = Components::build(config)?;

    let mut constraints = components.defaults;
    if let Some(limit) = args.max_cost {
        constraints.max_cost =
            CostBudget::new(limit).with_context(|| format!("--max-cost must be positive, got {limit}"))?;
    }

    let mut context = IdeaContext::new(args.idea).with_constraints(constraints);
    context.title = args.title;
    context.one_liner = args.one_liner;
    context.industry = args.industry;
    context.target_market = args.target_market;
    context.requirements.analysis_depth = args.depth;

    let mut result = components.conductor.execute(context.clone()).await?;
    components.review.review(&mut result, &context).await;

    let costs = components.gateway.cost_summary().await;
    info!(
        execution_id = %result.execution_id,
        total_cost = %costs.total,
        "run finished"
    );

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.metadata.compliance.as_ref().is_some_and(|c| c.is_fail()) {
        bail!("the dossier failed the compliance review");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "ideaforge",
            "run",
            "--idea",
            "A marketplace for idle lab equipment",
            "--industry",
            "marketplace",
            "--max-cost",
            "0.25",
            "--depth",
            "deep",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.industry.as_deref(), Some("marketplace"));
        assert_eq!(args.max_cost, Some(0.25));
        assert_eq!(args.depth, AnalysisDepth::Deep);
    }

    #[test]
    fn rejects_unknown_depths() {
        let parsed = Cli::try_parse_from(["ideaforge", "run", "--idea", "x", "--depth", "extreme"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn serve_accepts_a_bind_override() {
        let cli = Cli::try_parse_from(["ideaforge", "serve", "--bind", "0.0.0.0:3000"]).unwrap();
        let Command::Serve { bind } = cli.command else {
            panic!("expected the serve subcommand");
        };
        assert_eq!(bind.map(|a| a.port()), Some(3000));
    }
}
