mod cmd;

use clap::Parser;
use cmd::config::{Effective, RunArgs};

#[derive(Parser)]
#[command(name = "sanction-service", about = "Санкционная проверка платежей (Kafka → Kafka)")]
struct Cli {
    #[command(flatten)]
    args: RunArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Формат логов берётся из конфига, поэтому subscriber ставится после мержа.
    let eff = match Effective::new(&cli.args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    cmd::telemetry::init_logging(eff.log_format);

    if let Err(e) = cmd::run::run(eff).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
