use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tokio::task::LocalSet;
use tracing::info;

use bombdash_client::client::{Hero, HeroId, SceneKey, TierId};
use bombdash_client::config::{ConfigLoadError, DashConfig, ProjectPaths};
use bombdash_client::TokenStore;
use bombdash_runner::{init_logging, Intent, Outcome, SessionRunner};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Backend to talk to, overriding the config file
    #[arg(short, long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept the terms of service
    AcceptTerms,
    /// Restore the stored session and show it
    Restore,
    /// Log in with a username and PIN (defaults to the configured account)
    Login {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(short, long)]
        pin: Option<String>,
    },
    /// Create an account and log into it
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        pin: String,
    },
    /// List the heroes of the current account
    Heroes,
    /// List the wager tiers
    Tiers,
    /// Refresh the BCOIN balance
    Balance,
    /// Level up a hero, paying with the given transaction
    LevelUp {
        hero_id: HeroId,
        #[arg(long)]
        tx_hash: String,
    },
    /// Enter a wager tier with a hero
    Wager { tier_id: TierId, hero_id: HeroId },
    /// Show the leaderboard
    Ranking,
    /// Forget the stored session
    Logout,
}

/// What a command needs done
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    /// Applied on top of the restored session
    InSession(Vec<Intent>),
    /// Applied straight away, with or without a session
    Direct(Intent),
}

fn plan(command: Command, config: &DashConfig) -> anyhow::Result<Plan> {
    let intents = match command {
        Command::AcceptTerms => return Ok(Plan::Direct(Intent::AcceptTerms)),
        Command::Logout => return Ok(Plan::Direct(Intent::Logout)),
        Command::Ranking => return Ok(Plan::Direct(Intent::Open(SceneKey::Ranking))),
        Command::Register { username, pin } => {
            return Ok(Plan::Direct(Intent::Register { username, pin }))
        }
        Command::Login { username, pin } => {
            let account = config.account.as_ref();
            let username = username
                .or_else(|| account.map(|a| a.username.clone()))
                .context("No username given and no account configured")?;
            let pin = pin
                .or_else(|| account.map(|a| a.pin.clone()))
                .context("No PIN given and no account configured")?;
            return Ok(Plan::Direct(Intent::Login { username, pin }));
        }
        Command::Restore => vec![],
        Command::Heroes => vec![Intent::Open(SceneKey::CharacterSelection)],
        Command::Tiers => vec![Intent::Open(SceneKey::Pvp)],
        Command::Balance => vec![Intent::RefreshBalance],
        Command::LevelUp { hero_id, tx_hash } => vec![Intent::LevelUp { hero_id, tx_hash }],
        Command::Wager { tier_id, hero_id } => vec![
            Intent::Open(SceneKey::Pvp),
            Intent::EnterWager { tier_id, hero_id },
        ],
    };
    Ok(Plan::InSession(intents))
}

fn create_example_config() -> anyhow::Result<()> {
    let path = DashConfig::example()
        .save()
        .map_err(|e| anyhow!("Failed to write example config: {}", e))?;
    info!("Created example config at {}", path.display());
    eprintln!("Config file created at: {}", path.display());
    eprintln!("Please edit it with your backend and account details, then run bombdash again.");
    Ok(())
}

fn hero_line(hero: &Hero) -> String {
    format!(
        "{:<20} level {:<3} xp {:<8} {}",
        hero.display_name(),
        hero.level,
        hero.xp,
        hero.status
    )
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::SessionStarted(session) => println!(
            "Logged in as user {} (account level {}, {} BCOIN)",
            session.user_id, session.account_level, session.coin_balance
        ),
        Outcome::Heroes(heroes) => {
            for hero in heroes {
                println!("{}", hero_line(hero));
            }
        }
        Outcome::Tiers(tiers) => {
            for tier in tiers {
                println!(
                    "#{:<3} {:<12} {} BCOIN, {} XP",
                    tier.tier_id, tier.display_name, tier.bcoin_cost, tier.xp_cost
                );
            }
        }
        Outcome::Ranking(rows) => {
            for row in rows {
                println!("{:>3}. {:<44} wave {}", row.rank, row.player, row.wave);
            }
        }
        Outcome::Balance(balance) => println!("Balance: {} BCOIN", balance),
        Outcome::ScoreSubmitted { wave, best } => {
            println!("Wave {} submitted{}", wave, if *best { " (new best)" } else { "" })
        }
        Outcome::LeveledUp(hero) => println!("Hero {} is now level {}", hero.hero_id, hero.level),
        Outcome::WagerEntered { tier_id, hero_id } => {
            println!("Hero {} entered wager tier {}", hero_id, tier_id)
        }
        Outcome::LoggedOut => println!("Logged out"),
        Outcome::Failed(error) => eprintln!("Error: {}", error),
        Outcome::Refused(error) => eprintln!("Refused: {}", error),
    }
}

async fn run(cli: Cli, config: DashConfig, tokens: TokenStore) -> anyhow::Result<()> {
    let mut runner = SessionRunner::from_config(&config, tokens)
        .context("Failed to create the HTTP client")?;

    match plan(cli.command, &config)? {
        Plan::InSession(intents) => {
            runner.dispatch(Intent::Boot);
            runner.settle().await;
            if !runner.registry().is_logged_in() {
                runner.take_outcomes().iter().for_each(print_outcome);
                bail!("Not logged in. Run `bombdash login` first.");
            }
            for intent in intents {
                runner.dispatch(intent);
                runner.settle().await;
            }
        }
        Plan::Direct(intent) => {
            runner.dispatch(intent);
            runner.settle().await;
        }
    }

    let outcomes = runner.take_outcomes();
    outcomes.iter().for_each(print_outcome);
    if outcomes.iter().any(|o| matches!(o, Outcome::Failed(_))) {
        bail!("Command failed");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match DashConfig::load() {
        Ok(config) => config,
        Err(ConfigLoadError::NotFound) => return create_example_config(),
        Err(e) => return Err(e).context("Failed to load config"),
    };
    if let Some(base_url) = cli.base_url.clone() {
        config.backend.base_url = base_url;
    }

    let _guard = init_logging("cli", config.logging.file, cli.debug)
        .context("Failed to initialize logging")?;
    info!("Using backend at {}", config.backend.base_url);

    let paths = ProjectPaths::new("bombdash").context("Failed to find home directory")?;
    let tokens = TokenStore::open(paths.state_file()).context("Failed to open client state")?;

    // Session state is single-threaded; everything runs on one local set
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    LocalSet::new().block_on(&runtime, run(cli, config, tokens))
}
