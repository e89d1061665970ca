use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lb_agent::client::AgentClient;
use serde_json::Value;
use url::Url;

#[derive(Parser)]
#[command(name = "lb-agent-cli")]
#[command(about = "Management CLI for the load-balancer agent", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "https://localhost:20151/")]
    url: Url,

    /// Client certificate (PEM).
    #[arg(long)]
    cert: PathBuf,

    /// Client private key (PEM).
    #[arg(long)]
    key: PathBuf,

    /// CA bundle the agent's certificate chains to (PEM).
    #[arg(long)]
    ca: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the agent is reachable
    Ping,
    /// Live state of every server, grouped by state and backend
    State,
    /// Structured view of the current HAProxy config
    Config,
    /// Raw text of the current HAProxy config
    Source,
    /// Invoke any RPC method with JSON params
    Call {
        method: String,
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = AgentClient::new(cli.url, &cli.cert, &cli.key, &cli.ca)?;

    match cli.command {
        Commands::Ping => println!("{}", client.ping().await?),
        Commands::State => print_json(&serde_json::to_value(client.get_servers_state().await?)?)?,
        Commands::Config => print_json(&serde_json::to_value(client.get_config().await?)?)?,
        Commands::Source => print!("{}", client.get_config_source_code().await?),
        Commands::Call { method, params } => {
            let params: Value = serde_json::from_str(&params)?;
            print_json(&client.call(&method, params).await?)?;
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
