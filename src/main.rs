use std::sync::Arc;

use clap::{Parser, Subcommand};
use gpu_earnings::api::{AppState, ProjectArgs, build_inputs, run_http_server};
use gpu_earnings::core::run_projection;
use gpu_earnings::fx::{
    DEFAULT_FX_URL, FixedRateProvider, HttpRateProvider, InputCurrency, RateProvider,
    conversion_rate,
};
use gpu_earnings::report::{render_table, summary};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "gpu-earnings",
    about = "Five-year profit and break-even calculator for a fleet of rented GPU systems"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GPU_EARNINGS_FX_URL",
        default_value = DEFAULT_FX_URL,
        help = "Exchange-rate endpoint returning JSON with rates.GBP"
    )]
    fx_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web dashboard and JSON API
    Serve {
        #[arg(long, env = "GPU_EARNINGS_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "GPU_EARNINGS_PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Print the projection for the given inputs
    Project(ProjectArgs),
}

fn rate_provider(url: &str) -> Arc<dyn RateProvider> {
    match HttpRateProvider::new(url) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            tracing::warn!(error = %e, "could not build HTTP client; using fixed exchange rate");
            Arc::new(FixedRateProvider::default())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let rates = rate_provider(&cli.fx_url);

    match cli.command {
        Command::Serve { host, port } => {
            if let Err(e) = run_http_server(&host, port, AppState { rates }).await {
                tracing::error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        Command::Project(args) => {
            let currency: InputCurrency = args.currency.into();
            let rate = conversion_rate(currency, rates.as_ref()).await;
            let inputs = match build_inputs(&args, rate) {
                Ok(inputs) => inputs,
                Err(msg) => {
                    eprintln!("{msg}");
                    std::process::exit(1);
                }
            };
            let projection = run_projection(&inputs);
            let lines = summary(&projection, inputs.hourly_rate_gbp, inputs.num_systems);

            println!("{}", lines.effective_cost);
            println!("{}", lines.total_cost);
            if currency == InputCurrency::Usd {
                println!("{} (USD to GBP at {rate:.4})", lines.gbp_rate);
            }
            println!("{}", lines.charge_rate);
            println!();
            print!("{}", render_table(&projection));
            println!();
            println!("{}", lines.total_investment);
            println!("{}", lines.break_even);
        }
    }
}
