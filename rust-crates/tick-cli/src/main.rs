mod demo;

use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::path::PathBuf;
use tick_client::{
    Action,
    ClientConfig,
    Command,
    Credentials,
    GameClient,
    HttpReceiptSource,
    NakamaGateway,
    Submission,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

type Client = GameClient<NakamaGateway, HttpReceiptSource>;

#[derive(Parser, Debug)]
#[command(
    name = "tick-cli",
    about = "Play and inspect a tick-paced game shard through its Nakama gateway",
    version
)]
struct Args {
    /// Client config file (JSON); built-in defaults apply when omitted
    #[arg(long, env = "TICK_CONFIG")]
    config: Option<String>,

    /// Override the gateway URL
    #[arg(long, env = "TICK_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Override the gateway server key
    #[arg(long, env = "TICK_SERVER_KEY")]
    server_key: Option<String>,

    /// Override the receipt endpoint URL
    #[arg(long, env = "TICK_RECEIPTS_URL")]
    receipts_url: Option<String>,

    /// Account email
    #[arg(long, env = "TICK_EMAIL")]
    email: String,

    /// Account password (prompted when omitted)
    #[arg(long, env = "TICK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Walk through claim, player and pet creation, queries and confirmations
    Demo {
        #[arg(long, default_value = "pepe5")]
        persona: String,
        #[arg(long, default_value = "Manny2")]
        pet: String,
        /// Item used for the bath step
        #[arg(long, default_value = "soap")]
        item: String,
    },
    /// Print the shard's current tick
    Tick,
    /// Show the persona bound to this account
    Persona,
    /// Claim a persona tag for this account
    Claim { tag: String },
    /// List this persona's pets
    Pets,
    /// Show the pet leaderboard
    Leaderboard,
    /// List toy, food and drug stores
    Stores,
    /// Submit a game action
    Act {
        #[command(subcommand)]
        action: ActionCommand,
        /// Return after submission instead of waiting for receipts
        #[arg(long, global = true)]
        no_wait: bool,
    },
    /// Wait for and print the receipts of an earlier submission
    Confirm { tx_hash: String, tick: u64 },
    /// Invoke any command by wire name with a raw JSON payload
    Invoke {
        command: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
}

#[derive(Subcommand, Debug)]
enum ActionCommand {
    CreatePlayer,
    CreatePet { nickname: String },
    Bath { target: String, item: String },
    Feed { target: String, item: String },
    Cure { target: String, item: String },
    Play { target: String, item: String },
    Sleep { target: String },
    Breed {
        father: String,
        mother: String,
        born: String,
    },
    Buy { name: String },
}

impl From<ActionCommand> for Action {
    fn from(command: ActionCommand) -> Self {
        match command {
            ActionCommand::CreatePlayer => Action::CreatePlayer,
            ActionCommand::CreatePet { nickname } => Action::CreatePet { nickname },
            ActionCommand::Bath { target, item } => Action::BathPet { target, item },
            ActionCommand::Feed { target, item } => Action::FeedPet { target, item },
            ActionCommand::Cure { target, item } => Action::CurePet { target, item },
            ActionCommand::Play { target, item } => Action::PlayPet { target, item },
            ActionCommand::Sleep { target } => Action::SleepPet { target },
            ActionCommand::Breed {
                father,
                mother,
                born,
            } => Action::BreedPet {
                father,
                mother,
                born,
            },
            ActionCommand::Buy { name } => Action::BuyItem { name },
        }
    }
}

fn init_tracing(log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let dir = PathBuf::from(shellexpand::tilde(dir).into_owned());
            let (writer, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, "tick-cli.log"));
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| eyre!("failed to initialise tracing: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| eyre!("failed to initialise tracing: {e}"))?;
            Ok(None)
        }
    }
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(raw) => {
            let path = PathBuf::from(shellexpand::tilde(raw).into_owned());
            ClientConfig::load(&path)?
        }
        None => ClientConfig::default(),
    };
    if let Some(url) = &args.gateway_url {
        config.gateway.url = url.clone();
    }
    if let Some(key) = &args.server_key {
        config.gateway.server_key = key.clone();
    }
    if let Some(url) = &args.receipts_url {
        config.receipts.url = url.clone();
    }
    Ok(config)
}

fn build_client(config: &ClientConfig) -> Result<Client> {
    let gateway = config
        .gateway()
        .wrap_err("failed to build HTTP client for gateway")?;
    let receipts = config
        .receipt_source()
        .wrap_err("failed to build HTTP client for receipts")?;
    tracing::debug!(%gateway, %receipts, "client configured");
    Ok(GameClient::new(
        gateway,
        receipts,
        config.session_guard(),
        config.confirm_policy(),
    ))
}

fn read_password(args: &Args) -> Result<String> {
    match &args.password {
        Some(password) => Ok(password.clone()),
        None => rpassword::prompt_password(format!("Password for {}: ", args.email))
            .wrap_err("failed to read password"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_confirmation(confirmation: &tick_client::Confirmation) {
    let submission = &confirmation.submission;
    if confirmation.soft_timed_out() {
        println!(
            "{}: tick wait timed out in ticks {}..={}; showing what the receipt log has so far",
            submission.tx_hash,
            confirmation.wait.start(),
            confirmation.wait.latest()
        );
    }
    if !confirmation.is_observed() {
        println!(
            "{}: no receipt yet in ticks {}..={}",
            submission.tx_hash, confirmation.start_tick, confirmation.end_tick
        );
        return;
    }
    for receipt in &confirmation.receipts {
        if receipt.succeeded() {
            println!("{} @{}: ok {}", receipt.tx_hash, receipt.tick, receipt.result);
        } else {
            println!(
                "{} @{}: failed {}",
                receipt.tx_hash,
                receipt.tick,
                receipt.errors.join("; ")
            );
        }
    }
}

async fn run(client: &Client, command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Demo { persona, pet, item } => {
            demo::run(client, &persona, &pet, &item).await?;
        }
        CliCommand::Tick => println!("{}", client.current_tick().await?),
        CliCommand::Persona => match client.persona().await? {
            Some(persona) => print_json(&persona)?,
            None => println!("no persona bound to this account"),
        },
        CliCommand::Claim { tag } => {
            let outcome = client.claim_persona(&tag).await?;
            print_json(outcome.persona())?;
        }
        CliCommand::Pets => print_json(&client.pets().await?)?,
        CliCommand::Leaderboard => print_json(&client.leaderboard().await?)?,
        CliCommand::Stores => {
            print_json(&client.toy_store().await?)?;
            print_json(&client.food_store().await?)?;
            print_json(&client.drug_store().await?)?;
        }
        CliCommand::Act { action, no_wait } => {
            let action = Action::from(action);
            let submission = match action {
                Action::CreatePlayer => match client.create_player().await? {
                    Some(submission) => submission,
                    None => {
                        println!("player already exists");
                        return Ok(());
                    }
                },
                other => client.submit(&other).await?,
            };
            println!("submitted {} at tick {}", submission.tx_hash, submission.tick);
            if !no_wait {
                print_confirmation(&client.confirm(&submission).await?);
            }
        }
        CliCommand::Confirm { tx_hash, tick } => {
            let submission = Submission::new(tx_hash, tick);
            print_confirmation(&client.confirm(&submission).await?);
        }
        CliCommand::Invoke { command, payload } => {
            let command: Command = command.parse()?;
            let payload: serde_json::Value =
                serde_json::from_str(&payload).wrap_err("payload is not valid JSON")?;
            let reply = client.dispatcher().invoke(command, payload).await?;
            print_json(&reply)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref())?;
    tracing::info!("starting tick-cli");

    let config = load_config(&args)?;
    let client = build_client(&config)?;
    let password = read_password(&args)?;
    client
        .authenticate(&Credentials::new(args.email.clone(), password))
        .await
        .wrap_err("failed to sign in")?;

    run(&client, args.command).await
}
