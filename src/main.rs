use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use match_agent::calculate::AnalyticsAggregator;
use match_agent::config::AppConfig;
use match_agent::context::{ActivePlayerContext, Observation};
use match_agent::fetch::Fetcher;
use match_agent::ingest;
use match_agent::models::{
    Aggregate, KdrReport, MatchRecord, PlayerIdentity, Region, Summary, Window, DEFAULT_WINDOW,
};
use match_agent::storage::MatchStore;
use match_agent::sync::henrik::HenrikClient;
use match_agent::sync::{SyncEngine, SyncError, SyncOutcome};

#[derive(Parser)]
#[command(name = "match-agent")]
#[command(about = "Conversational player tracker with incremental competitive match sync")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new matches for a player
    Sync {
        /// Player as name#tag (optionally region:name#tag; spaces allowed in the name)
        #[arg(long)]
        player: String,

        /// Skip region probing
        #[arg(long)]
        region: Option<Region>,
    },

    /// Average KDR over recent stored matches
    Kdr {
        #[arg(long)]
        player: String,

        #[arg(long)]
        region: Option<Region>,

        /// Only matches on this map
        #[arg(long)]
        map: Option<String>,

        /// Number of recent matches
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        last: usize,
    },

    /// Per-match averages over recent stored matches
    Summary {
        #[arg(long)]
        player: String,

        #[arg(long)]
        region: Option<Region>,

        #[arg(long)]
        map: Option<String>,

        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        last: usize,
    },

    /// List recent stored matches
    Matches {
        #[arg(long)]
        player: String,

        #[arg(long)]
        region: Option<Region>,

        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        last: usize,
    },

    /// List players that have been synced
    Players,

    /// Forget a player's cursor so the next sync re-reads the newest page
    ResetCursor {
        #[arg(long)]
        player: String,

        #[arg(long)]
        region: Region,
    },

    /// Run a saved match-history response through the sync engine
    IngestFixture {
        /// Path to the saved JSON document
        path: PathBuf,

        #[arg(long)]
        player: String,

        #[arg(long)]
        region: Region,
    },

    /// Interactive session: mention players, then ask for stats
    Shell,
}

/// Parse a player argument, applying an explicit region when given.
fn parse_player(player: &str, region: Option<Region>) -> Result<PlayerIdentity> {
    let identity = PlayerIdentity::parse_qualified(player)
        .with_context(|| format!("Invalid player '{}', expected name#tag", player))?;
    Ok(match region {
        Some(region) => identity.with_region(region),
        None => identity,
    })
}

fn window(map: Option<String>, last: usize) -> Window {
    let window = Window::last(last);
    match map {
        Some(map) => window.on_map(map),
        None => window,
    }
}

fn build_engine(config: &AppConfig, store: Arc<MatchStore>) -> Result<SyncEngine> {
    let fetcher_config = config.api.fetcher_config();
    if fetcher_config.api_key.is_none() {
        tracing::warn!(
            "{} is not set, requests will be sent without an API key",
            config.api.api_key_env
        );
    }

    let fetcher = Fetcher::new(fetcher_config).context("Failed to create HTTP client")?;
    let client = HenrikClient::new(fetcher, config.api.base_url.clone());
    Ok(SyncEngine::new(Arc::new(client), store, config.sync.clone()))
}

fn print_outcome(identity: &PlayerIdentity, outcome: &SyncOutcome) {
    println!("\n=== Sync Results: {} ===", identity);
    println!("Region:           {}", outcome.resolved_region);
    println!("Observed:         {}", outcome.observed);
    println!("Inserted:         {}", outcome.inserted);
    println!("Stats upserted:   {}", outcome.stats_upserted);
    if outcome.shells > 0 {
        println!("Without stats:    {}", outcome.shells);
    }
    println!(
        "Cursor:           {}",
        outcome.cursor_match_id.as_deref().unwrap_or("(none)")
    );
    println!("Duration:         {:?}", outcome.duration);
}

fn print_sync_error(identity: &PlayerIdentity, err: &SyncError) {
    match err {
        SyncError::RegionUnresolved { tried, .. } => println!(
            "Couldn't find {} in any region ({}). Check the spelling of the name and tag.",
            identity.riot_id(),
            tried
        ),
        e if e.is_retryable() => println!("Sync for {} failed, try again shortly: {}", identity, e),
        e => println!("Sync for {} failed: {}", identity, e),
    }
}

fn print_kdr(identity: &PlayerIdentity, window: &Window, result: &Aggregate<KdrReport>) {
    match result {
        Aggregate::NoData => println!("No stored matches for {} in that window.", identity),
        Aggregate::Data(report) => {
            println!("\n=== KDR: {} ===", identity);
            if let Some(map) = &window.map {
                println!("Map:              {}", map);
            }
            println!("Matches:          {}", report.matches_considered);
            println!("Kills / deaths:   {} / {}", report.kills, report.deaths);
            println!("KDR:              {}", report.kdr);
        }
    }
}

fn print_summary(identity: &PlayerIdentity, result: &Aggregate<Summary>) {
    let Aggregate::Data(summary) = result else {
        println!("No stored matches for {} in that window.", identity);
        return;
    };

    let avg = &summary.averages;
    let opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));

    println!("\n=== Summary: {} ===", identity);
    println!("Matches:          {}", summary.matches_considered);
    println!("K / D / A:        {:.2} / {:.2} / {:.2}", avg.kills, avg.deaths, avg.assists);
    println!("KDR:              {}", avg.kdr);
    println!("Headshot rate:    {:.2}%", avg.headshot_rate);
    println!("Score:            {}", opt(avg.score));
    println!("Damage made:      {}", opt(avg.damage_made));
    println!("Damage received:  {}", opt(avg.damage_received));
    println!("Credits spent:    {}", opt(avg.credits_spent));
    println!("Loadout value:    {}", opt(avg.loadout_value));
    println!(
        "Win rate:         {}",
        summary
            .win_rate
            .map_or_else(|| "-".to_string(), |w| format!("{:.0}%", w * 100.0))
    );
    if let Some(character) = &summary.most_played_character {
        println!("Most played:      {}", character);
    }
}

fn print_matches(identity: &PlayerIdentity, matches: &[MatchRecord]) {
    if matches.is_empty() {
        println!("No stored matches for {}.", identity);
        return;
    }

    println!("\n=== Recent matches: {} ===", identity);
    for m in matches {
        let started = m
            .started_at
            .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let kda = match (m.kills, m.deaths, m.assists) {
            (Some(k), Some(d), a) => format!("{}/{}/{}", k, d, a.unwrap_or(0)),
            _ => "no stats".to_string(),
        };
        println!(
            "  {}  {:<10} {:<12} {}",
            started,
            m.map.as_deref().unwrap_or("?"),
            kda,
            m.match_id
        );
    }
}

/// `key=value` options for shell commands.
fn shell_window(args: &[&str]) -> Window {
    let mut window = Window::default();
    for arg in args {
        match arg.split_once('=') {
            Some(("map", map)) => window.map = Some(map.to_string()),
            Some(("last", n)) => {
                if let Ok(n) = n.parse() {
                    window.last_n = n;
                }
            }
            _ => println!("Ignoring '{}' (use map=<name> or last=<n>)", arg),
        }
    }
    window
}

async fn sync_active(ctx: &mut ActivePlayerContext, engine: &SyncEngine) {
    match engine.sync_active(ctx).await {
        Ok(outcome) => {
            if let Some(identity) = ctx.active() {
                print_outcome(identity, &outcome);
            }
        }
        Err(SyncError::NoActivePlayer) => println!("Who should I look up? Mention a player as name#tag."),
        Err(e) => {
            if let Some(identity) = ctx.active() {
                print_sync_error(identity, &e);
            }
        }
    }
}

/// Line-oriented session: every line is checked for a player mention, and
/// Print the answer to a shell stats command.
///
/// A storage error is reported and the shell keeps running. Returns whether
/// an answer was printed.
async fn answer_stats(
    aggregator: &AnalyticsAggregator,
    identity: &PlayerIdentity,
    command: &str,
    window: &Window,
) -> bool {
    let answered = match command {
        "kdr" => aggregator
            .average_kdr(identity, window)
            .await
            .map(|result| print_kdr(identity, window, &result)),
        "summary" => aggregator
            .summarize(identity, window)
            .await
            .map(|result| print_summary(identity, &result)),
        _ => aggregator
            .recent_matches(identity, window)
            .await
            .map(|matches| print_matches(identity, &matches)),
    };

    match answered {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Reading stored matches for {} failed: {}", identity, e);
            println!("Couldn't read stored matches ({}). Try again shortly.", e);
            false
        }
    }
}

/// `/commands` ask for stats about the active player.
async fn run_shell(engine: &SyncEngine, aggregator: &AnalyticsAggregator) -> Result<()> {
    let mut ctx = ActivePlayerContext::new();
    println!("Session {}", ctx.session_id());
    println!("Mention a player as name#tag. Commands: /sync /kdr /summary /matches /who /quit");
    println!("Stats commands take map=<name> and last=<n>.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();

            match name {
                "quit" | "exit" => break,
                "who" => match ctx.active() {
                    Some(identity) => println!("Active player: {}", identity),
                    None => println!("No active player yet."),
                },
                "sync" => sync_active(&mut ctx, engine).await,
                "kdr" | "summary" | "matches" => {
                    if !ctx.is_set() {
                        println!("Who should I look up? Mention a player as name#tag.");
                        continue;
                    }

                    // Stats answers always reflect the newest upstream data
                    sync_active(&mut ctx, engine).await;

                    let window = shell_window(&args);
                    let Some(identity) = ctx.active() else {
                        continue;
                    };
                    answer_stats(aggregator, identity, name, &window).await;
                }
                other => println!("Unknown command /{}", other),
            }
            continue;
        }

        match ctx.observe(line) {
            Ok(Observation::Switched { .. }) => sync_active(&mut ctx, engine).await,
            Ok(Observation::Unchanged) => {
                if let Some(identity) = ctx.active() {
                    println!("Still on {}.", identity);
                }
            }
            Ok(Observation::NoMention) => {
                if !ctx.is_set() {
                    println!("Mention a player as name#tag to get started.");
                }
            }
            Err(e) => println!("Couldn't read that player ({}). Try name#tag.", e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    tracing::info!("Starting match-agent v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(MatchStore::new(config.storage()));

    match cli.command {
        Commands::Sync { player, region } => {
            let mut identity = parse_player(&player, region)?;
            let engine = build_engine(&config, store)?;
            match engine.sync(&mut identity).await {
                Ok(outcome) => print_outcome(&identity, &outcome),
                Err(e) => {
                    print_sync_error(&identity, &e);
                    bail!("Sync failed");
                }
            }
        }
        Commands::Kdr {
            player,
            region,
            map,
            last,
        } => {
            let identity = parse_player(&player, region)?;
            let window = window(map, last);
            let result = AnalyticsAggregator::new(store)
                .average_kdr(&identity, &window)
                .await?;
            print_kdr(&identity, &window, &result);
        }
        Commands::Summary {
            player,
            region,
            map,
            last,
        } => {
            let identity = parse_player(&player, region)?;
            let result = AnalyticsAggregator::new(store)
                .summarize(&identity, &window(map, last))
                .await?;
            print_summary(&identity, &result);
        }
        Commands::Matches {
            player,
            region,
            last,
        } => {
            let identity = parse_player(&player, region)?;
            let matches = AnalyticsAggregator::new(store)
                .recent_matches(&identity, &Window::last(last))
                .await?;
            print_matches(&identity, &matches);
        }
        Commands::Players => {
            let players = store.list_players().await?;
            if players.is_empty() {
                println!("No players synced yet.");
            } else {
                println!("=== Known players ({}) ===", players.len());
                for cursor in players {
                    println!(
                        "  {:<28} last match {} (synced {})",
                        cursor.identity().to_string(),
                        cursor.last_match_id,
                        cursor.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::ResetCursor { player, region } => {
            let identity = parse_player(&player, Some(region))?;
            if store.reset_cursor(&identity).await? {
                println!("Cursor for {} reset; stored matches kept.", identity);
            } else {
                println!("{} has no cursor.", identity);
            }
        }
        Commands::IngestFixture {
            path,
            player,
            region,
        } => {
            let mut identity = parse_player(&player, Some(region))?;
            let outcome = ingest::ingest_fixture(&path, &mut identity, region, store, &config.sync)
                .await
                .with_context(|| format!("Failed to ingest {:?}", path))?;
            print_outcome(&identity, &outcome);
        }
        Commands::Shell => {
            let engine = build_engine(&config, store.clone())?;
            let aggregator = AnalyticsAggregator::new(store);
            run_shell(&engine, &aggregator).await?;
        }
    }

    Ok(())
}
