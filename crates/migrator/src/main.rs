mod cli;

use clap::Parser;
use console::style;

use migrator::EXIT_FAILURE;

#[tokio::main]
async fn main() {
    // Load .env before parsing so env-backed flags see it
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    let code = match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  {} {:#}", style("✗").red().bold(), e);
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}
