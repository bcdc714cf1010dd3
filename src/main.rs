use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use bee_ledger::model::{BankDetails, ProviderProfile};
use bee_ledger::notify::LogNotifier;
use bee_ledger::{Actor, Amount, Config, Decision, Engine, Intent, JsonStore};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Bee Coin ledger: top-ups, withdrawals, transfers and provider listings.
#[derive(Parser)]
#[command(name = "bee-ledger", version)]
struct Cli {
    /// Directory holding the JSON collections
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// TOML file with rates, limits and channels
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a user's balance
    Balance { user: String },

    /// Request a top-up for a bank transfer of `amount_vnd`
    TopUp { user: String, amount_vnd: u64 },

    /// Request a withdrawal of `coins` to a bank account
    Withdraw {
        user: String,
        coins: u64,
        #[arg(long)]
        account_number: String,
        #[arg(long)]
        bank: String,
        /// Name on the bank account
        #[arg(long)]
        owner: String,
    },

    /// Request a transfer, confirmed later by the sender
    Transfer {
        sender: String,
        receiver: String,
        amount: u64,
    },

    /// Donate to an approved provider
    Donate {
        sender: String,
        registration: String,
        amount: u64,
    },

    /// Approve, reject or cancel a pending request
    Decide {
        reference: String,
        /// approve, reject or cancel
        decision: Decision,
        #[arg(long)]
        actor: String,
        /// The actor holds the approver permission
        #[arg(long)]
        admin: bool,
    },

    /// Apply to be listed as a provider
    Register {
        user: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        #[arg(long)]
        gender: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        avatar: Option<String>,
    },

    /// Approve or reject a provider application
    Review {
        registration: String,
        decision: Decision,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        admin: bool,
    },

    /// Open a private channel with an approved provider
    Hire { client: String, registration: String },

    /// List pending requests as JSON
    Pending,

    /// Export all accounts as CSV
    Accounts,

    /// Apply every intent of a JSON-lines file, skipping failures
    Replay { path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => return fail(e),
        },
        None => Config::default(),
    };
    let store = match JsonStore::open(&cli.data_dir).await {
        Ok(store) => store,
        Err(e) => return fail(e),
    };
    let notifier = LogNotifier::new(config.channels.clone());
    let engine = Engine::new(store, config, notifier);

    let intent = match cli.command {
        Commands::Pending => {
            return match engine.pending().await {
                Ok(pending) => print_json(&pending),
                Err(e) => fail(e),
            };
        }
        Commands::Accounts => {
            let accounts = match engine.accounts().await {
                Ok(accounts) => accounts,
                Err(e) => return fail(e),
            };
            return match bee_ledger::csv::write_accounts(io::stdout().lock(), &accounts) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => fail(e),
            };
        }
        Commands::Replay { path } => return replay(&engine, path).await,
        command => match intent(command) {
            Some(intent) => intent,
            None => return ExitCode::FAILURE,
        },
    };

    match engine.apply(intent).await {
        Ok(receipt) => print_json(&receipt),
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn intent(command: Commands) -> Option<Intent> {
    let intent = match command {
        Commands::Balance { user } => Intent::QueryBalance { user },
        Commands::TopUp { user, amount_vnd } => Intent::RequestTopUp { user, amount_vnd },
        Commands::Withdraw {
            user,
            coins,
            account_number,
            bank,
            owner,
        } => Intent::RequestWithdrawal {
            user,
            coins: Amount::new(coins),
            bank: BankDetails {
                account_number,
                bank,
                owner,
            },
        },
        Commands::Transfer {
            sender,
            receiver,
            amount,
        } => Intent::RequestTransfer {
            sender,
            receiver,
            amount: Amount::new(amount),
        },
        Commands::Donate {
            sender,
            registration,
            amount,
        } => Intent::RequestDonation {
            sender,
            registration,
            amount: Amount::new(amount),
        },
        Commands::Decide {
            reference,
            decision,
            actor,
            admin,
        } => Intent::DecideRequest {
            reference,
            actor: Actor {
                id: actor,
                elevated: admin,
            },
            decision,
        },
        Commands::Register {
            user,
            name,
            age,
            gender,
            contact,
            description,
            avatar,
        } => Intent::RegisterProvider {
            user,
            profile: ProviderProfile {
                name,
                age,
                gender,
                contact_link: contact,
                description,
                avatar,
            },
        },
        Commands::Review {
            registration,
            decision,
            actor,
            admin,
        } => Intent::DecideRegistration {
            registration,
            actor: Actor {
                id: actor,
                elevated: admin,
            },
            decision,
        },
        Commands::Hire {
            client,
            registration,
        } => Intent::HireProvider {
            client,
            registration,
        },
        Commands::Pending | Commands::Accounts | Commands::Replay { .. } => return None,
    };
    Some(intent)
}

async fn replay(engine: &Engine<LogNotifier>, path: PathBuf) -> ExitCode {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => return fail(e),
    };
    let (intent_sender, intent_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        let mut lines = BufReader::new(file).lines();
        let mut line = 0;
        loop {
            line += 1;
            let text = match lines.next_line().await {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(e) => {
                    warn!(line, "failed to read intent log: {e}");
                    break;
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Intent>(&text) {
                Ok(intent) => {
                    if intent_sender.send(intent).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(line, "invalid intent: {e}"),
            }
        }
    });

    engine.run(ReceiverStream::new(intent_receiver)).await;
    ExitCode::SUCCESS
}

fn print_json(value: &impl serde::Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(e: impl std::fmt::Display) -> ExitCode {
    eprintln!("error: {e}");
    ExitCode::FAILURE
}
