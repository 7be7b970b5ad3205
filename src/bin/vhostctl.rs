use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "vhostctl")]
#[command(about = "Management CLI for the virtual-host server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status
    Status,
    /// List open connections
    Connections,
    /// List domains
    Domains,
    /// Enable a domain
    Enable { name: String },
    /// Disable a domain (answers 503 until enabled)
    Disable { name: String },
    /// Show hit statistics for a path
    Stats {
        domain: String,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Stop or resume counting hits below a path
    DoNotTrace {
        domain: String,
        path: String,
        #[arg(long)]
        off: bool,
    },
    /// List blacklist entries
    Blacklist,
    /// Block a client address
    Block {
        address: String,
        /// Also log every blocked request
        #[arg(long)]
        log: bool,
    },
    /// Remove a client address from the blacklist
    Unblock { address: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)).send().await?,
        Commands::Connections => client.get(format!("{}/admin/connections", base)).send().await?,
        Commands::Domains => client.get(format!("{}/admin/domains", base)).send().await?,
        Commands::Enable { name } => set_enabled(&client, base, &name, true).await?,
        Commands::Disable { name } => set_enabled(&client, base, &name, false).await?,
        Commands::Stats { domain, path } => {
            client
                .get(format!("{}/admin/statistics", base))
                .query(&[("domain", domain), ("path", path)])
                .send()
                .await?
        }
        Commands::DoNotTrace { domain, path, off } => {
            client
                .put(format!("{}/admin/statistics/do-not-trace", base))
                .json(&json!({ "domain": domain, "path": path, "enabled": !off }))
                .send()
                .await?
        }
        Commands::Blacklist => client.get(format!("{}/admin/blacklist", base)).send().await?,
        Commands::Block { address, log } => {
            let action = if log { "block-and-log" } else { "block" };
            client
                .put(format!("{}/admin/blacklist/{}", base, address))
                .json(&json!({ "action": action }))
                .send()
                .await?
        }
        Commands::Unblock { address } => {
            client
                .delete(format!("{}/admin/blacklist/{}", base, address))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn set_enabled(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    enabled: bool,
) -> Result<reqwest::Response, reqwest::Error> {
    client
        .put(format!("{}/admin/domains/{}/enabled", base, name))
        .json(&json!({ "enabled": enabled }))
        .send()
        .await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("OK");
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
