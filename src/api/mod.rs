use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::core::{
    ConfigError, HouseholdInput, Province, SolveConfig, TaxFunding, WithdrawalStrategy,
    compare_strategies, run_projection, solve_max_spending,
};

#[derive(Debug, Parser)]
#[command(
    name = "fire-canada",
    about = "Canadian retirement projection (CPP, OAS, GIS, RRIF minimums, federal and provincial tax)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Run one projection and print it as JSON")]
    Project(RunArgs),
    #[command(about = "Run the projection once per withdrawal strategy")]
    Compare(CompareArgs),
    #[command(about = "Find the largest sustainable spending multiplier")]
    Solve(SolveArgs),
    #[command(about = "Serve the JSON API")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long, help = "Path to a household JSON file")]
    pub input: PathBuf,
    #[arg(long, help = "Province code (ON, AB, BC, QC); unknown codes use ON")]
    pub province: Option<String>,
    #[arg(long, value_enum)]
    pub strategy: Option<CliWithdrawalStrategy>,
    #[arg(long, value_enum)]
    pub tax_funding: Option<CliTaxFunding>,
    #[arg(long, default_value_t = false, help = "Stop at the first unfunded year")]
    pub stop_on_fail: bool,
    #[arg(long, default_value_t = false)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub run: RunArgs,
    #[arg(
        long = "with",
        value_enum,
        help = "Strategies to compare; defaults to all of them"
    )]
    pub strategies: Vec<CliWithdrawalStrategy>,
}

#[derive(Debug, Clone, Args)]
pub struct SolveArgs {
    #[command(flatten)]
    pub run: RunArgs,
    #[arg(long, default_value_t = 0.0, help = "Lowest spending multiplier searched")]
    pub search_min: f64,
    #[arg(long, default_value_t = 3.0, help = "Highest spending multiplier searched")]
    pub search_max: f64,
    #[arg(long, default_value_t = 0.001)]
    pub tolerance: f64,
    #[arg(long, default_value_t = 40)]
    pub max_iterations: u32,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Share of years that must be funded, in percent"
    )]
    pub target_success_rate: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalStrategy {
    TfsaFirst,
    NonRegisteredFirst,
    RrspFirst,
    ProRata,
}

impl From<CliWithdrawalStrategy> for WithdrawalStrategy {
    fn from(value: CliWithdrawalStrategy) -> Self {
        match value {
            CliWithdrawalStrategy::TfsaFirst => WithdrawalStrategy::TfsaFirst,
            CliWithdrawalStrategy::NonRegisteredFirst => WithdrawalStrategy::NonRegisteredFirst,
            CliWithdrawalStrategy::RrspFirst => WithdrawalStrategy::RrspFirst,
            CliWithdrawalStrategy::ProRata => WithdrawalStrategy::ProRata,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliTaxFunding {
    Reported,
    Withdrawn,
}

impl From<CliTaxFunding> for TaxFunding {
    fn from(value: CliTaxFunding) -> Self {
        match value {
            CliTaxFunding::Reported => TaxFunding::Reported,
            CliTaxFunding::Withdrawn => TaxFunding::Withdrawn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolvePayload {
    #[serde(flatten)]
    household: HouseholdInput,
    #[serde(default)]
    solver: SolveConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparePayload {
    #[serde(flatten)]
    household: HouseholdInput,
    #[serde(default)]
    strategies: Vec<WithdrawalStrategy>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn household_from_json(json: &str) -> Result<HouseholdInput, String> {
    serde_json::from_str::<HouseholdInput>(json).map_err(|e| format!("Invalid household JSON: {e}"))
}

pub fn apply_overrides(household: &mut HouseholdInput, args: &RunArgs) {
    let config = &mut household.config;
    if let Some(code) = args.province.as_deref() {
        config.province = Province::from_code(code);
    }
    if let Some(strategy) = args.strategy {
        config.withdrawal_strategy = strategy.into();
    }
    if let Some(funding) = args.tax_funding {
        config.tax_funding = funding.into();
    }
    if args.stop_on_fail {
        config.stop_on_first_failure = true;
    }
}

pub fn solve_config(args: &SolveArgs) -> SolveConfig {
    SolveConfig {
        search_min: args.search_min,
        search_max: args.search_max,
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
        target_success_rate: args.target_success_rate / 100.0,
    }
}

pub fn requested_strategies(requested: &[CliWithdrawalStrategy]) -> Vec<WithdrawalStrategy> {
    if requested.is_empty() {
        WithdrawalStrategy::ALL.to_vec()
    } else {
        requested.iter().map(|&s| s.into()).collect()
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/project", post(project_handler))
        .route("/api/compare", post(compare_handler))
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("fire-canada HTTP API listening on http://{addr}");
    log::info!("Local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, router()).await
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_handler(body: String) -> Response {
    let household = match household_from_json(&body) {
        Ok(household) => household,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    run_blocking(move || run_projection(&household)).await
}

async fn compare_handler(body: String) -> Response {
    let payload = match serde_json::from_str::<ComparePayload>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid compare JSON: {e}"));
        }
    };
    let strategies = if payload.strategies.is_empty() {
        WithdrawalStrategy::ALL.to_vec()
    } else {
        payload.strategies
    };
    let household = payload.household;
    run_blocking(move || compare_strategies(&household, &strategies)).await
}

async fn solve_handler(body: String) -> Response {
    let payload = match serde_json::from_str::<SolvePayload>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid solve JSON: {e}"));
        }
    };
    run_blocking(move || solve_max_spending(&payload.household, payload.solver)).await
}

async fn run_blocking<T, F>(job: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T, ConfigError> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(Ok(body)) => json_response(StatusCode::OK, body),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            log::error!("projection task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Projection task failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
