use anyhow::{bail, Context};
use backend::error::ErrorResponse;
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared_types::{
    AuthUrlResponse, LoginRequest, ProfileResponse, RegisterRequest, TokenResponse, UserResponse,
};

#[derive(Parser)]
#[command(name = "auth-cli")]
#[command(about = "CLI for the authentication API")]
#[command(
    long_about = "A command-line client for the authentication server.\n\n\
    Registers accounts, logs in, starts a Google login, and shows the\n\
    identity behind an access token."
)]
struct Cli {
    /// Backend server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8080",
        env = "AUTH_API_URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an email/password account
    ///
    /// Passwords need at least 8 characters with an uppercase letter,
    /// a lowercase letter, a digit, and a special character.
    Register {
        email: String,

        /// Display name, letters, spaces and hyphens only.
        #[arg(short, long)]
        name: String,

        #[arg(short, long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in and print the issued token pair
    Login {
        email: String,

        #[arg(short, long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,

        /// Print only the access token, for use in scripts.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the Google consent URL to open in a browser
    GoogleUrl,

    /// Show the identity behind an access token
    Profile {
        #[arg(short, long, env = "AUTH_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.base_url.trim_end_matches('/');

    match cli.command {
        Commands::Register {
            email,
            name,
            password,
        } => {
            let req = RegisterRequest {
                email,
                password,
                name,
            };
            let response = client
                .post(format!("{}/auth/register", base_url))
                .json(&req)
                .send()
                .await
                .context("Failed to reach server")?;
            let user: UserResponse = read_json(response).await?;
            println!("Registered {} <{}> ({})", user.name, user.email, user.role);
        }
        Commands::Login {
            email,
            password,
            quiet,
        } => {
            let req = LoginRequest { email, password };
            let response = client
                .post(format!("{}/auth/login", base_url))
                .json(&req)
                .send()
                .await
                .context("Failed to reach server")?;
            let tokens: TokenResponse = read_json(response).await?;
            if quiet {
                println!("{}", tokens.access_token);
            } else {
                println!("Access token:  {}", tokens.access_token);
                println!("Refresh token: {}", tokens.refresh_token);
                println!("Expires in:    {}s", tokens.expires_in);
            }
        }
        Commands::GoogleUrl => {
            let response = client
                .get(format!("{}/auth/google/login", base_url))
                .send()
                .await
                .context("Failed to reach server")?;
            let body: AuthUrlResponse = read_json(response).await?;
            println!("{}", body.url);
        }
        Commands::Profile { token } => {
            let response = client
                .get(format!("{}/profile", base_url))
                .bearer_auth(token)
                .send()
                .await
                .context("Failed to reach server")?;
            let profile: ProfileResponse = read_json(response).await?;
            println!("[{}] {} ({})", &profile.user_id.to_string()[..8], profile.email, profile.role);
        }
    }

    Ok(())
}

/// Decode a success body, or turn the server's error body into an error.
async fn read_json<T: DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("Invalid response body");
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(ErrorResponse {
            error,
            details: Some(details),
        }) => bail!("{} ({}): {}", error, status, details),
        Ok(ErrorResponse { error, .. }) => bail!("{} ({})", error, status),
        Err(_) => bail!("Request failed ({}): {}", status, text),
    }
}
