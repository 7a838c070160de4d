pub mod output;

use std::{fmt::Display, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    report::{
        fetch::{fetch_extension_data, FetchOutcome, RetryPolicy, StoreSource},
        sorted_dates, today_stats, DEFAULT_TOP_SITES,
    },
    storage::{
        entities::{FocusModeState, StoragePatch},
        open_store, LocalStore, SerializedStore, Store, StoreBackend,
    },
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        percentage::Percentage,
        time::{date_label, time_greeting},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Mora", version, long_about = None)]
#[command(about = "Browsing time tracked by the Mora extension", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to use $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = StoreBackend::Fields)]
    backend: StoreBackend,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Summary of today's browsing")]
    Today {
        #[arg(
            short = 'p',
            long = "percentage",
            help = "Hide sites below this share of the listed time",
            default_value = "1"
        )]
        min_percentage: Percentage,
        #[arg(long, help = "How many sites to list", default_value_t = DEFAULT_TOP_SITES)]
        top: usize,
    },
    #[command(about = "Time per site for every tracked day, or for one day")]
    Dates {
        #[arg(
            long,
            short,
            help = "Day to show. Examples are \"yesterday\", \"15/03/2025\", \"last friday\""
        )]
        date: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
        #[arg(short = 'p', long = "percentage", default_value = "0")]
        min_percentage: Percentage,
    },
    #[command(about = "Closed sessions, newest first")]
    Sessions {
        #[arg(long, help = "Only sessions that started after this. Same formats as `dates --date`")]
        since: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk)]
        date_style: DateStyle,
    },
    #[command(about = "Control focus mode")]
    Focus {
        #[command(subcommand)]
        command: FocusCommand,
    },
    #[command(about = "Write every stored field to a JSON file")]
    Export { path: PathBuf },
    #[command(about = "Delete everything tracked for a domain")]
    Forget { domain: String },
}

#[derive(Subcommand, Debug)]
enum FocusCommand {
    #[command(about = "Start focus mode. Defaults come from settings")]
    Start {
        #[arg(short, long, help = "Minutes")]
        duration: Option<u32>,
        #[arg(short, long = "block", help = "Domain to block, can be repeated")]
        blocked_sites: Vec<String>,
    },
    Stop,
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let store = Arc::new(SerializedStore::new(open_store(&app_dir, args.backend)?));
    let clock = DefaultClock;

    match args.commands {
        Commands::Today {
            min_percentage,
            top,
        } => {
            let data = store.read_or_default().await;
            let now = Local::now();
            let stats = today_stats(&data.sites, &now, top);
            print_lines(output::render_today(&stats, time_greeting(&now), min_percentage, true));
            Ok(())
        }
        Commands::Dates {
            date,
            date_style,
            min_percentage,
        } => show_dates(store, &clock, date, date_style, min_percentage).await,
        Commands::Sessions { since, date_style } => {
            let since = since
                .map(|since| parse_date(&since, date_style, "since"))
                .transpose()?;
            let mut sessions = store.read_or_default().await.sessions;
            if let Some(since) = since {
                sessions.retain(|session| session.start_time >= since);
            }
            print_lines(output::render_sessions(&sessions, clock.time()));
            Ok(())
        }
        Commands::Focus { command } => run_focus_command(&store, &clock, command).await,
        Commands::Export { path } => {
            let data = store.read().await.context("Failed to read storage")?;
            let json = serde_json::to_string_pretty(&data)?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {path:?}"))?;
            info!("Exported storage to {path:?}");
            println!("Exported to {}", path.display());
            Ok(())
        }
        Commands::Forget { domain } => {
            if store.delete_site(&domain).await? {
                println!("Forgot {domain}");
            } else {
                println!("Nothing tracked for {domain}");
            }
            Ok(())
        }
    }
}

async fn show_dates(
    store: Arc<SerializedStore<LocalStore>>,
    clock: &dyn Clock,
    date: Option<String>,
    date_style: DateStyle,
    min_percentage: Percentage,
) -> Result<()> {
    let date = date
        .map(|date| parse_date(&date, date_style, "date"))
        .transpose()?;

    let source = StoreSource::new(store);
    let outcome =
        fetch_extension_data(&source, &RetryPolicy::default(), clock, &CancellationToken::new())
            .await;
    if matches!(outcome, FetchOutcome::Fallback(_)) {
        eprintln!("Storage didn't answer, showing sample data");
    }
    let Some(totals) = outcome.totals() else {
        return Ok(());
    };

    match date {
        Some(date) => {
            let label = date_label(date, &Local);
            match totals.get(&label) {
                Some(sites) => print_lines(output::render_date(&label, sites, min_percentage, true)),
                None => println!("Nothing tracked on {label}"),
            }
        }
        None => print_lines(output::render_date_overview(&totals, &sorted_dates(&totals))),
    }
    Ok(())
}

async fn run_focus_command<S: Store>(
    store: &SerializedStore<S>,
    clock: &dyn Clock,
    command: FocusCommand,
) -> Result<()> {
    match command {
        FocusCommand::Start {
            duration,
            blocked_sites,
        } => {
            let defaults = store.read_or_default().await.settings.focus_mode;
            let duration = duration.unwrap_or(defaults.default_duration);
            if duration == 0 {
                return Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        "Focus mode needs a duration of at least one minute",
                    )
                    .into());
            }
            let blocked_sites = if blocked_sites.is_empty() {
                defaults.default_blocked_sites
            } else {
                blocked_sites
            };

            let state = FocusModeState::started(duration, blocked_sites, clock.time());
            store.write(StoragePatch::focus_mode(state.clone())).await?;
            print_lines(output::render_focus(&state, clock.time()));
        }
        FocusCommand::Stop => {
            store
                .write(StoragePatch::focus_mode(FocusModeState::stopped()))
                .await?;
            println!("Focus mode is off");
        }
        FocusCommand::Status => {
            let state = store.read_or_default().await.focus_mode;
            print_lines(output::render_focus(&state, clock.time()));
        }
    }
    Ok(())
}

fn parse_date(value: &str, date_style: DateStyle, name: &str) -> Result<DateTime<Utc>> {
    match parse_date_string(value, Local::now(), date_style.into()) {
        Ok(date) => Ok(date.with_timezone(&Utc)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} {e}"),
            )
            .into()),
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::memory::MemoryStore, utils::clock::testing::ManualClock};

    #[test]
    fn global_options_work_after_subcommands() {
        let args = Args::parse_from(["mora", "focus", "start", "-d", "50", "-b", "reddit.com", "--dir", "/tmp/mora"]);

        assert_eq!(args.dir, Some(PathBuf::from("/tmp/mora")));
        let Commands::Focus {
            command: FocusCommand::Start {
                duration,
                blocked_sites,
            },
        } = args.commands
        else {
            panic!("wrong command");
        };
        assert_eq!(duration, Some(50));
        assert_eq!(blocked_sites, vec!["reddit.com".to_string()]);
    }

    #[test]
    fn today_defaults() {
        let args = Args::parse_from(["mora", "today"]);
        let Commands::Today { min_percentage, top } = args.commands else {
            panic!("wrong command");
        };
        assert_eq!(*min_percentage, 1.);
        assert_eq!(top, DEFAULT_TOP_SITES);
        assert_eq!(args.backend, StoreBackend::Fields);
    }

    #[tokio::test]
    async fn focus_start_stores_sites_the_host_can_match() -> Result<()> {
        let store = SerializedStore::new(MemoryStore::default());
        let clock = ManualClock::at_test_start();

        run_focus_command(
            &store,
            &clock,
            FocusCommand::Start {
                duration: Some(30),
                blocked_sites: vec!["www.Reddit.com".into()],
            },
        )
        .await?;

        let state = store.read().await?.focus_mode;
        assert_eq!(state.blocked_sites, vec!["reddit.com".to_string()]);
        assert!(state.is_blocking(clock.time()));
        assert!(run_focus_command(
            &store,
            &clock,
            FocusCommand::Start {
                duration: Some(0),
                blocked_sites: vec![],
            },
        )
        .await
        .is_err());
        Ok(())
    }

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }
}
