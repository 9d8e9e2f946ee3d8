use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use sse_relay::stack::{self, Severity, StackOptions};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the SSE event relay", long_about = None)]
struct Cli {
    /// Relay base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Admin API key; falls back to RELAY_ADMIN_KEY
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay status
    Status,
    /// List topics and subscriber counts
    Topics,
    /// Publish an event (authenticates with the producer secret)
    Publish {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        category: String,
        /// JSON payload
        #[arg(long, default_value = "null")]
        payload: String,
        /// Producer secret; falls back to SSE_SECRET
        #[arg(long)]
        secret: Option<String>,
    },
    /// Issue a subscriber token
    Token {
        /// Subject in kind:id form, e.g. account:93000001
        #[arg(long)]
        subject: String,
        /// Comma-separated topics the token may subscribe to
        #[arg(long)]
        topics: String,
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Moderate bans
    #[command(subcommand)]
    Bans(BanCommands),
    /// Work with the deployment stack file
    #[command(subcommand)]
    Stack(StackCommands),
}

#[derive(Subcommand)]
enum BanCommands {
    /// List active bans
    List,
    /// Create a ban
    Create {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        subject_id: i64,
        #[arg(long)]
        subject_name: Option<String>,
        /// Internal reason, operator-facing only
        #[arg(long)]
        reason: String,
        /// Reason shown to the banned subject
        #[arg(long)]
        public_reason: Option<String>,
        /// Seconds until automatic expiry; permanent when absent
        #[arg(long)]
        duration_secs: Option<i64>,
        /// Operator name recorded on the ban
        #[arg(long)]
        by: String,
    },
    /// Show every ban for a subject, including revoked ones
    History { kind: String, subject_id: i64 },
    /// Edit an active ban
    Update {
        id: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        public_reason: Option<String>,
        #[arg(long)]
        duration_secs: Option<i64>,
        #[arg(long)]
        by: String,
    },
    /// Revoke a ban
    Revoke {
        id: i64,
        #[arg(long)]
        by: String,
    },
}

#[derive(Subcommand)]
enum StackCommands {
    /// Print the standard two-service stack file
    Render {
        #[arg(long)]
        postgres_image: Option<String>,
        #[arg(long)]
        relay_image: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Verify a stack file against the deployment contract
    Check {
        file: PathBuf,
        /// Also read deploy-time variables from this env file
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(admin_headers(cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Topics => {
            let res = client
                .get(format!("{}/admin/topics", cli.url))
                .headers(admin_headers(cli.key)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Publish {
            topic,
            category,
            payload,
            secret,
        } => {
            let secret = secret
                .or_else(|| std::env::var("SSE_SECRET").ok())
                .ok_or("No producer secret; pass --secret or set SSE_SECRET")?;
            let payload: Value = serde_json::from_str(&payload)?;
            let res = client
                .post(format!("{}/api/events", cli.url))
                .bearer_auth(secret)
                .json(&json!({
                    "topic": topic,
                    "category": category,
                    "payload": payload,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Token {
            subject,
            topics,
            ttl_secs,
        } => {
            let topics: Vec<&str> = topics
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            let res = client
                .post(format!("{}/admin/tokens", cli.url))
                .headers(admin_headers(cli.key)?)
                .json(&json!({
                    "subject": subject,
                    "topics": topics,
                    "ttl_secs": ttl_secs,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Bans(command) => run_bans(&client, &cli.url, cli.key, command).await?,
        Commands::Stack(command) => run_stack(command)?,
    }

    Ok(())
}

async fn run_bans(
    client: &reqwest::Client,
    url: &str,
    key: Option<String>,
    command: BanCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let headers = admin_headers(key)?;
    let res = match command {
        BanCommands::List => {
            client
                .get(format!("{url}/admin/bans"))
                .headers(headers)
                .send()
                .await?
        }
        BanCommands::Create {
            kind,
            subject_id,
            subject_name,
            reason,
            public_reason,
            duration_secs,
            by,
        } => {
            client
                .post(format!("{url}/admin/bans"))
                .headers(headers)
                .json(&json!({
                    "kind": kind,
                    "subject_id": subject_id,
                    "subject_name": subject_name,
                    "reason": reason,
                    "public_reason": public_reason,
                    "duration_secs": duration_secs,
                    "issued_by": by,
                }))
                .send()
                .await?
        }
        BanCommands::History { kind, subject_id } => {
            client
                .get(format!("{url}/admin/bans/history/{kind}/{subject_id}"))
                .headers(headers)
                .send()
                .await?
        }
        BanCommands::Update {
            id,
            reason,
            public_reason,
            duration_secs,
            by,
        } => {
            client
                .patch(format!("{url}/admin/bans/{id}"))
                .headers(headers)
                .json(&json!({
                    "reason": reason,
                    "public_reason": public_reason,
                    "duration_secs": duration_secs,
                    "updated_by": by,
                }))
                .send()
                .await?
        }
        BanCommands::Revoke { id, by } => {
            client
                .delete(format!("{url}/admin/bans/{id}"))
                .headers(headers)
                .json(&json!({ "revoked_by": by }))
                .send()
                .await?
        }
    };
    print_response(res).await
}

fn run_stack(command: StackCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        StackCommands::Render {
            postgres_image,
            relay_image,
            output,
        } => {
            let mut opts = StackOptions::default();
            if let Some(image) = postgres_image {
                opts.postgres_image = image;
            }
            if let Some(image) = relay_image {
                opts.relay_image = image;
            }
            let yaml = stack::to_yaml(&stack::standard(&opts))?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &yaml)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => print!("{yaml}"),
            }
        }
        StackCommands::Check { file, env_file } => {
            let manifest = stack::from_yaml(&std::fs::read_to_string(&file)?)?;
            let file_vars: BTreeMap<String, String> = match env_file {
                Some(path) => stack::parse_env_file(&std::fs::read_to_string(&path)?),
                None => BTreeMap::new(),
            };
            let issues = stack::verify(&manifest, |name| {
                file_vars.contains_key(name) || std::env::var_os(name).is_some()
            });

            if issues.is_empty() {
                println!("{}: OK", file.display());
                return Ok(());
            }
            let mut errors = 0;
            for issue in &issues {
                let tag = match issue.severity() {
                    Severity::Error => {
                        errors += 1;
                        "error"
                    }
                    Severity::Warning => "warning",
                };
                println!("{tag}: {issue}");
            }
            if errors > 0 {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn admin_headers(key: Option<String>) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let key = key
        .or_else(|| std::env::var("RELAY_ADMIN_KEY").ok())
        .ok_or("No admin key; pass --key or set RELAY_ADMIN_KEY")?;
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {key}"))?,
    );
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
