//! EmotionAid CLI
//!
//! Thin wrapper around emotionaid-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create a profile (the first one becomes the default user)
//! emotionaid profile create "Alice"
//!
//! # Talk to the companion; queued when the server is unreachable
//! emotionaid chat send "I had a rough day"
//!
//! # Write in the diary
//! emotionaid diary add "Day 1" "Went for a walk" --tag calm
//!
//! # Rate the session and look at the week
//! emotionaid mood rate 4
//! emotionaid mood week
//!
//! # Replay queued actions, once or every 30 seconds
//! emotionaid sync
//! emotionaid sync --watch
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use emotionaid_core::config::default_data_dir;
use emotionaid_core::{
    keys, logging, AppConfig, Companion, DiaryEntry, LexiconAnalyzer, SendOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// EmotionAid - emotional support companion
#[derive(Parser)]
#[command(name = "emotionaid")]
#[command(version = "0.1.0")]
#[command(about = "EmotionAid - emotional support companion")]
#[command(
    long_about = "A local-first chat companion with an encrypted diary and mood tracking. Works offline and syncs when the server is reachable."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: platform data dir/EmotionAid)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Companion server base URL (overrides config and environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// User id (default: the first profile)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile management
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Chat with the companion
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Diary entries, tags and triggers
    Diary {
        #[command(subcommand)]
        action: DiaryAction,
    },

    /// Mood tracking
    Mood {
        #[command(subcommand)]
        action: MoodAction,
    },

    /// Inspect the offline queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Cache housekeeping
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Replay queued actions against the server
    Sync {
        /// Keep running and check connectivity periodically
        #[arg(long)]
        watch: bool,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent log records
    Logs {
        /// Only records at this level or more severe (error, warn, info, debug, trace)
        #[arg(short, long)]
        level: Option<LevelFilter>,

        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete all local data
    Wipe {
        /// Confirm deletion (required)
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Create a new profile
    Create {
        /// Display name
        name: String,
    },
    /// List all profiles
    List,
    /// Set the profile picture from an image file
    Avatar {
        /// Path to the image
        path: PathBuf,
    },
    /// Write the profile picture to a directory
    ExportAvatar {
        /// Destination directory
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum ChatAction {
    /// Send a message
    Send {
        /// Message text
        text: String,
    },
    /// Send a recorded voice message
    Audio {
        /// Path to the audio file
        path: PathBuf,
    },
    /// Show the current dialog
    History,
    /// Close the current dialog and start a new one
    New,
    /// List past dialogs
    Dialogs,
}

#[derive(Subcommand)]
enum DiaryAction {
    /// Write a new entry
    Add {
        title: String,
        content: String,
        /// Tags for the entry (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
        /// Emoji shown next to the entry
        #[arg(short, long)]
        emoji: Option<String>,
    },
    /// List entries
    List {
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        /// Entries per page
        #[arg(long, default_value_t = emotionaid_core::diary::ENTRIES_PER_PAGE)]
        page_size: usize,
    },
    /// List known tags
    Tags,
    /// Record a trigger
    Trigger {
        name: String,
    },
    /// List recorded triggers
    Triggers,
    /// Move all entries to the archive
    Archive,
    /// Write all entries to a JSON file
    Export {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum MoodAction {
    /// Rate the current session from 1 to 5
    Rate {
        score: u8,
    },
    /// Ratings of the last seven days
    Week,
    /// How often each emotion was detected
    Stats,
    /// Total points earned
    Points,
    /// Classify the emotion of a text without storing it
    Analyze {
        text: String,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List pending actions
    List,
    /// Drop every pending action
    Clear,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove cache entries whose key starts with a prefix
    Clear {
        /// Key prefix (empty clears everything)
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to config.toml
    Init,
}

fn setup_logging(verbosity: u8, data_dir: &std::path::Path) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    logging::install(filter, Some(&logging::logs_dir(data_dir)), "cli")
        .context("Failed to set up logging")?;
    Ok(())
}

/// Resolve the user to act for: `--user` or the first profile.
async fn resolve_user(companion: &Companion, user: Option<String>) -> Result<String> {
    if let Some(user) = user {
        return Ok(user);
    }
    companion
        .profiles()
        .primary_user()
        .await?
        .ok_or_else(|| anyhow::anyhow!("No profile yet. Create one with: emotionaid profile create <name>"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    setup_logging(cli.verbose, &data_dir)?;

    let mut config = AppConfig::load(&data_dir)?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }

    let companion = Companion::open(config, keys::provider_from_env()?)?;

    match cli.command {
        Commands::Profile { action } => match action {
            ProfileAction::Create { name } => {
                let profile = companion.profiles().create_profile(&name).await?;
                println!("Created profile: {}", profile.name);
                println!("  ID: {}", profile.id);
            }
            ProfileAction::List => {
                let ids = companion.profiles().user_ids().await?;
                if ids.is_empty() {
                    println!("No profiles yet.");
                }
                for id in ids {
                    match companion.profiles().profile(&id).await? {
                        Some(profile) => println!("{}  {}", id, profile.name),
                        None => println!("{}  (missing profile record)", id),
                    }
                }
            }
            ProfileAction::Avatar { path } => {
                let user_id = resolve_user(&companion, cli.user).await?;
                let avatar = companion.profiles().save_avatar(&user_id, &path).await?;
                println!("Saved avatar ({} bytes)", avatar.bytes.len());
            }
            ProfileAction::ExportAvatar { dir } => {
                let user_id = resolve_user(&companion, cli.user).await?;
                match companion.profiles().export_avatar(&user_id, &dir).await? {
                    Some(path) => println!("Avatar written to {}", path.display()),
                    None => println!("No avatar set."),
                }
            }
        },

        Commands::Chat { action } => {
            let user_id = resolve_user(&companion, cli.user).await?;
            match action {
                ChatAction::Send { text } => {
                    print_outcome(companion.send_message(&user_id, &text).await?);
                }
                ChatAction::Audio { path } => {
                    print_outcome(companion.send_audio(&user_id, &path).await?);
                }
                ChatAction::History => {
                    let messages = companion.chats().messages(&user_id).await?;
                    if messages.is_empty() {
                        println!("No messages in the current dialog.");
                    }
                    for m in messages {
                        println!(
                            "[{}] {}: {}",
                            m.timestamp.format("%Y-%m-%d %H:%M"),
                            m.author,
                            m.text
                        );
                    }
                }
                ChatAction::New => {
                    let title = companion.chats().start_new_dialog(&user_id, Utc::now()).await?;
                    println!("Started new dialog: {}", title);
                }
                ChatAction::Dialogs => {
                    for title in companion.chats().dialogs().await? {
                        println!("{}", title);
                    }
                }
            }
        }

        Commands::Diary { action } => {
            let user_id = resolve_user(&companion, cli.user).await?;
            let diary = companion.diary();
            match action {
                DiaryAction::Add {
                    title,
                    content,
                    tag,
                    emoji,
                } => {
                    let mut entry = DiaryEntry::new(title, content)?;
                    for t in tag {
                        entry = entry.with_tag(t);
                    }
                    if let Some(e) = emoji {
                        entry = entry.with_emoji(e);
                    }
                    let outcome = companion.create_diary_entry(&user_id, entry).await?;
                    println!("Saved diary entry.");
                    if outcome == SendOutcome::Queued {
                        println!("Server unreachable; the entry will be synced later.");
                    }
                }
                DiaryAction::List { page, page_size } => {
                    let entries = diary.entries(&user_id, page, page_size).await?;
                    if entries.is_empty() {
                        println!("No entries on page {}.", page);
                    }
                    for entry in entries {
                        let emoji = entry.emoji.as_deref().unwrap_or(" ");
                        println!("{} {} {}", entry.date.format("%Y-%m-%d"), emoji, entry.title);
                        println!("    {}", entry.content);
                        if !entry.tags.is_empty() {
                            println!("    tags: {}", entry.tags.join(", "));
                        }
                    }
                }
                DiaryAction::Tags => {
                    for tag in diary.tags(&user_id).await? {
                        println!("{}", tag);
                    }
                }
                DiaryAction::Trigger { name } => {
                    if diary.add_trigger(&user_id, &name).await? {
                        println!("Recorded trigger: {}", name);
                    } else {
                        println!("Trigger already recorded: {}", name);
                    }
                }
                DiaryAction::Triggers => {
                    for trigger in diary.triggers(&user_id).await? {
                        println!("{}", trigger);
                    }
                }
                DiaryAction::Archive => {
                    let moved = diary.archive_entries(&user_id).await?;
                    println!("Archived {} entries.", moved);
                }
                DiaryAction::Export { path } => {
                    let count = diary.export_entries(&user_id, &path).await?;
                    println!("Exported {} entries to {}", count, path.display());
                }
            }
        }

        Commands::Mood { action } => {
            let analytics = companion.analytics();
            let user = cli.user;
            match action {
                MoodAction::Rate { score } => {
                    let user_id = resolve_user(&companion, user).await?;
                    analytics.save_session_rating(&user_id, score)?;
                    println!("Saved rating: {}", score);
                }
                MoodAction::Week => {
                    let user_id = resolve_user(&companion, user).await?;
                    let ratings = analytics.weekly_ratings(&user_id, Utc::now())?;
                    if ratings.is_empty() {
                        println!("No ratings in the last seven days.");
                    }
                    for r in &ratings {
                        println!("{}  {}", r.date.format("%Y-%m-%d %H:%M"), r.score);
                    }
                    if !ratings.is_empty() {
                        let sum: u32 = ratings.iter().map(|r| u32::from(r.score)).sum();
                        println!("Average: {:.1}", f64::from(sum) / ratings.len() as f64);
                    }
                }
                MoodAction::Stats => {
                    let user_id = resolve_user(&companion, user).await?;
                    let stats = analytics.mood_stats(&user_id)?;
                    if stats.is_empty() {
                        println!("No emotions logged yet.");
                    }
                    for (emotion, count) in stats {
                        println!("{:<14}{}", emotion, count);
                    }
                }
                MoodAction::Points => {
                    let user_id = resolve_user(&companion, user).await?;
                    println!("Points: {}", analytics.total_points(&user_id)?);
                }
                MoodAction::Analyze { text } => {
                    let analysis = LexiconAnalyzer::new().analyze(&text);
                    println!("Emotion: {}", analysis.emotion);
                    println!("Confidence: {:.2}", analysis.confidence);
                    if analysis.is_sarcasm {
                        println!("Sarcasm: likely");
                    }
                }
            }
        }

        Commands::Queue { action } => match action {
            QueueAction::List => {
                let items = companion.queue().pending().await?;
                println!("Pending actions: {}", items.len());
                for item in items {
                    println!(
                        "  {}  {}  attempts={}  {}",
                        item.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        item.action,
                        item.attempts,
                        serde_json::to_string(&item.data)?
                    );
                }
            }
            QueueAction::Clear => {
                let removed = companion.queue().clear().await?;
                println!("Removed {} pending actions.", removed);
            }
        },

        Commands::Cache { action } => match action {
            CacheAction::Clear { prefix } => {
                let removed = companion.cache().clear(&prefix).await?;
                println!("Removed {} cache entries.", removed);
            }
        },

        Commands::Sync { watch } => {
            let cancel = CancellationToken::new();
            if watch {
                let interval = Duration::from_secs(companion.config().sync.interval_secs);
                let handle = companion.spawn_sync_loop(interval, cancel.clone());
                println!("Syncing every {}s. Press Ctrl+C to stop.", interval.as_secs());
                tokio::signal::ctrl_c().await?;
                cancel.cancel();
                handle.await?;
            } else {
                match companion.sync_now(&cancel).await? {
                    Some(report) => {
                        println!("Synced: {}", report.synced);
                        println!("Failed: {}", report.failed);
                        println!("Dropped: {}", report.dropped);
                        println!("Remaining: {}", report.remaining);
                    }
                    None => println!("Server unreachable; nothing synced."),
                }
            }
        }

        Commands::Logs { level, limit } => {
            let mut records = logging::read_records(&logging::logs_dir(companion.data_dir()))
                .context("Failed to read logs")?;
            if let Some(level) = level {
                records.retain(|r| r.level.parse::<LevelFilter>().is_ok_and(|l| l <= level));
            }
            if records.is_empty() {
                println!("No log records.");
            }
            let skip = records.len().saturating_sub(limit);
            for record in records.into_iter().skip(skip) {
                let fields: Vec<String> = record
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                println!(
                    "{} {:>5} {}: {} {}",
                    record.ts,
                    record.level.to_uppercase(),
                    record.target,
                    record.message,
                    fields.join(" ")
                );
            }
        }

        Commands::Wipe { force } => {
            if !force {
                anyhow::bail!("Refusing to delete all data without --force");
            }
            companion.wipe_all_data().await?;
            println!("All local data deleted.");
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = companion.config().clone();
                if shown.api.api_token.is_some() {
                    shown.api.api_token = Some("<redacted>".into());
                }
                println!("# {}", shown.config_path().display());
                print!("{}", toml::to_string_pretty(&shown)?);
            }
            ConfigAction::Init => {
                let path = companion.config().save()?;
                println!("Wrote {}", path.display());
            }
        },
    }

    Ok(())
}

fn print_outcome(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Replied(reply) => println!("{}", reply),
        SendOutcome::Delivered => println!("Delivered."),
        SendOutcome::Queued => println!("Server unreachable; queued for later."),
    }
}
