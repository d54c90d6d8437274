use anyhow::{Context, Result};
use clap::Parser;
use peloton_client::{ClientConfig, Credentials, Error, PelotonClient};
use tracing_subscriber::EnvFilter;

/// Log in to Peloton and dump the raw profile, latest workout and its
/// metrics as JSON.
#[derive(Parser)]
#[command(name = "peloton-debug", version)]
struct Args {
    /// Peloton account email
    #[arg(short = 'u', long = "user", env = "PELOTON_EMAIL")]
    email: String,

    /// Peloton account password
    #[arg(short = 'p', long = "pass", env = "PELOTON_PASSWORD", hide_env_values = true)]
    password: String,

    /// Number of recent workouts to fetch
    #[arg(short = 'n', long, default_value_t = 5)]
    workouts: u32,

    /// Performance graph sampling interval in seconds (0 for full resolution)
    #[arg(long, default_value_t = peloton_client::DEFAULT_SAMPLING_INTERVAL)]
    every_n: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env()?;

    let mut client =
        match PelotonClient::login_with_config(Credentials::new(args.email, args.password), config)
            .await
        {
            Ok(client) => client,
            Err(Error::Authentication(reason)) => {
                anyhow::bail!("Login or password incorrect: {reason}")
            }
            Err(e) => return Err(e).context("could not reach Peloton"),
        };

    let workouts = client.fetch_recent_workouts(args.workouts).await?;
    let latest = workouts.first().context("account has no workouts")?;
    let profile = client.fetch_profile().await?;
    let metrics = client.fetch_workout_metrics(&latest.id, args.every_n).await?;

    println!("\n==================[ USER PROFILE ]==================\n");
    println!("{}", serde_json::to_string(&profile)?);
    println!("\n==================[ LATEST WORKOUT OVERVIEW ]==================\n");
    println!("{}", serde_json::to_string(latest)?);
    println!("\n==================[ LATEST WORKOUT METRICS ]==================\n");
    println!("{}", serde_json::to_string(&metrics)?);

    Ok(())
}
