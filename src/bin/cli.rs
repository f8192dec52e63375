use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::fs;

const TOKEN_FILE: &str = ".sensor_token";

#[derive(Parser)]
#[command(name = "sensor-cli")]
#[command(about = "CLI for sensor_db", long_about = None)]
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
        username: String,
        #[arg(short, long)]
        password: String,
        /// Defaults to "user" on the server
        #[arg(short, long)]
        role: Option<String>,
    },
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    RecoverPassword {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        new_password: String,
    },
    AddReading {
        #[arg(short, long)]
        sensor_id: i64,
        #[arg(short, long)]
        temperature: f64,
        #[arg(short = 'm', long)]
        humidity: f64,
    },
    Readings,
    ClearReadings,
    Accounts,
    Logout,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn with_token(request: RequestBuilder) -> RequestBuilder {
    match fs::read_to_string(TOKEN_FILE) {
        Ok(token) => request.bearer_auth(token.trim()),
        Err(_) => request,
    }
}

async fn print_response(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = request.send().await?;
    println!("{} {}", res.status(), res.text().await?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Register { username, password, role } => {
            let req = client
                .post(format!("{}/register", cli.url))
                .json(&json!({ "username": username, "password": password, "role": role }));
            print_response(req).await?;
        }
        Commands::Login { username, password } => {
            let res = client
                .post(format!("{}/login", cli.url))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {}", TOKEN_FILE);
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::RecoverPassword { username, new_password } => {
            let req = client
                .post(format!("{}/recover-password", cli.url))
                .json(&json!({ "username": username, "new_password": new_password }));
            print_response(req).await?;
        }
        Commands::AddReading { sensor_id, temperature, humidity } => {
            let req = client.post(format!("{}/readings", cli.url)).json(&json!({
                "sensor_id": sensor_id,
                "temperature": temperature,
                "humidity": humidity
            }));
            print_response(with_token(req)).await?;
        }
        Commands::Readings => {
            print_response(with_token(client.get(format!("{}/readings", cli.url)))).await?;
        }
        Commands::ClearReadings => {
            print_response(with_token(client.delete(format!("{}/clear-readings", cli.url)))).await?;
        }
        Commands::Accounts => {
            print_response(with_token(client.get(format!("{}/accounts", cli.url)))).await?;
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
    }

    Ok(())
}
