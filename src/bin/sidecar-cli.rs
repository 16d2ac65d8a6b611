use clap::{Parser, Subcommand};
use serde_json::Value;
use sidecar_client::SidecarClient;

#[derive(Parser)]
#[command(name = "sidecar-cli")]
#[command(about = "Talk to a running sidecar helper", long_about = None)]
struct Cli {
    /// JSON-RPC address (host:port)
    #[arg(long, default_value = "127.0.0.1:8767")]
    rpc: String,

    /// HTTP base URL
    #[arg(long, default_value = "http://127.0.0.1:8768")]
    http: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call helper/Ping
    Ping,
    /// Call chat/SendMessage
    Chat { message: String },
    /// GET /healthz
    Health,
    /// Call any service/method with JSON params
    Call {
        service: String,
        method: String,
        /// JSON params, defaults to {}
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = SidecarClient::new(&cli.rpc, &cli.http);

    let output = match cli.command {
        Commands::Ping => serde_json::to_value(client.ping().await?)?,
        Commands::Chat { message } => serde_json::to_value(client.send_message(&message).await?)?,
        Commands::Health => client.health().await?,
        Commands::Call { service, method, params } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Object(Default::default()),
            };
            client.call(&service, &method, params).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
