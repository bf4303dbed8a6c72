use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use fire_canada::api::{
    Cli, Command, RunArgs, apply_overrides, household_from_json, requested_strategies,
    run_http_server, solve_config,
};
use fire_canada::core::{HouseholdInput, compare_strategies, run_projection, solve_max_spending};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Project(args) => {
            let household = load_household(&args)?;
            let result = run_projection(&household).context("projection failed")?;
            print_json(&result, args.pretty)
        }
        Command::Compare(args) => {
            let household = load_household(&args.run)?;
            let strategies = requested_strategies(&args.strategies);
            let outcomes =
                compare_strategies(&household, &strategies).context("comparison failed")?;
            print_json(&outcomes, args.run.pretty)
        }
        Command::Solve(args) => {
            let household = load_household(&args.run)?;
            let result = solve_max_spending(&household, solve_config(&args))
                .context("spending solve failed")?;
            print_json(&result, args.run.pretty)
        }
        Command::Serve { port } => run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
    }
}

fn load_household(args: &RunArgs) -> Result<HouseholdInput> {
    let json = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut household = household_from_json(&json).map_err(anyhow::Error::msg)?;
    apply_overrides(&mut household, args);
    Ok(household)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
