use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

const TOKEN_FILE: &str = ".rmis_token";

#[derive(Parser)]
#[command(name = "rmis-cli")]
#[command(about = "CLI for the Risk Compass risk register", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(short, long)]
        unit: String,
        /// champion (default), committee, ...; admin and coordinator accounts are not self-registered
        #[arg(short, long)]
        role: Option<String>,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// List the strategic objectives A-G
    Objectives,
    RegisterRisk {
        /// Strategic objective letter (A-G)
        #[arg(short, long)]
        objective: String,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        likelihood: u8,
        #[arg(short, long)]
        impact: u8,
        #[arg(long)]
        principal_owner: Option<String>,
        /// Repeatable
        #[arg(long = "supporting-owner")]
        supporting_owners: Vec<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    ListRisks,
    /// Risks owned by the logged-in user or their unit
    MyRisks,
    GetRisk {
        #[arg(short, long)]
        id: String,
    },
    Submit {
        #[arg(short, long)]
        risk_id: String,
        /// Q1-Q4
        #[arg(short, long)]
        quarter: String,
        #[arg(short, long)]
        year: String,
        #[arg(short, long)]
        unit: String,
        #[arg(short, long)]
        likelihood: u8,
        #[arg(short, long)]
        impact: u8,
        /// target|achievement|status, repeatable; status is 1, 2 or 3
        #[arg(long = "target")]
        targets: Vec<String>,
    },
    ListSubmissions {
        #[arg(short, long)]
        risk_id: Option<String>,
        #[arg(short, long)]
        unit: Option<String>,
        #[arg(short, long)]
        year: Option<String>,
    },
    Analytics {
        #[arg(value_enum)]
        kind: AnalyticsKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AnalyticsKind {
    Severity,
    Trends,
    Units,
    Quarters,
}

impl AnalyticsKind {
    fn path(self) -> &'static str {
        match self {
            AnalyticsKind::Severity => "severity-distribution",
            AnalyticsKind::Trends => "risk-trends",
            AnalyticsKind::Units => "unit-breakdown",
            AnalyticsKind::Quarters => "quarterly-breakdown",
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    role: String,
}

fn authed(builder: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    builder.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or(text);
    println!("{} {}", status, pretty);
    Ok(())
}

fn parse_target(raw: &str) -> Result<Value, String> {
    let parts: Vec<&str> = raw.splitn(3, '|').collect();
    match parts.as_slice() {
        [target, achievement, status] => Ok(json!({
            "target": target,
            "achievement": achievement,
            "status": status
        })),
        _ => Err(format!("target must look like 'target|achievement|status', got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));

    match cli.command {
        Commands::Register { email, password, first_name, last_name, unit, role } => {
            let res = client
                .post(format!("{}/auth/register", api))
                .json(&json!({
                    "email": email,
                    "password": password,
                    "firstName": first_name,
                    "lastName": last_name,
                    "unit": unit,
                    "role": role
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{}/auth/login", api))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in as {}. Token saved to {}", body.role, TOKEN_FILE);
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Logout => {
            let _ = client.post(format!("{}/auth/logout", api)).send().await;
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out.");
        }
        Commands::Objectives => {
            let res = client.get(format!("{}/strategic-objectives", api)).send().await?;
            print_response(res).await?;
        }
        Commands::RegisterRisk {
            objective,
            title,
            likelihood,
            impact,
            principal_owner,
            supporting_owners,
            category,
            description,
        } => {
            let res = authed(client.post(format!("{}/risks", api)))
                .json(&json!({
                    "strategicObjective": objective,
                    "title": title,
                    "likelihood": likelihood,
                    "impact": impact,
                    "principalOwner": principal_owner,
                    "supportingOwners": supporting_owners,
                    "category": category,
                    "description": description
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListRisks => {
            let res = authed(client.get(format!("{}/risks", api))).send().await?;
            print_response(res).await?;
        }
        Commands::MyRisks => {
            let res = authed(client.get(format!("{}/risks/champion", api))).send().await?;
            print_response(res).await?;
        }
        Commands::GetRisk { id } => {
            let res = authed(client.get(format!("{}/risks/{}", api, id))).send().await?;
            print_response(res).await?;
        }
        Commands::Submit { risk_id, quarter, year, unit, likelihood, impact, targets } => {
            let targets = targets
                .iter()
                .map(|raw| parse_target(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let res = authed(client.post(format!("{}/submissions", api)))
                .json(&json!({
                    "riskId": risk_id,
                    "timePeriod": quarter,
                    "year": year,
                    "unit_id": unit,
                    "likelihood": likelihood,
                    "impact": impact,
                    "targets": targets
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ListSubmissions { risk_id, unit, year } => {
            let mut query = vec![];
            if let Some(risk_id) = risk_id {
                query.push(("riskId", risk_id));
            }
            if let Some(unit) = unit {
                query.push(("unit_id", unit));
            }
            if let Some(year) = year {
                query.push(("year", year));
            }
            let res = authed(client.get(format!("{}/submissions", api)))
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Analytics { kind } => {
            let res = authed(client.get(format!("{}/submissions/analytics/{}", api, kind.path())))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}
