use std::{io, path::PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, FuzzySelect, Select};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cache;
mod catalog;
mod config;
mod error;
mod history;
mod player;
mod providers;
mod proxy;
mod types;

use cache::ResponseCache;
use catalog::{Catalog, CatalogLimits};
use config::{Settings, config_path, history_path};
use history::{History, HistoryEntry, theme};
use providers::{build_http_client, gojo::GojoScraper, jikan::JikanClient, zoro::ZoroClient};
use types::{CatalogEntry, DetailPage, EpisodeInfo, FeaturedEntry, MediaKind};

#[derive(Debug, Parser)]
#[command(
    name = "anistream",
    about = "Browse anime catalogs and stream episodes with subtitles via mpv.",
    version
)]
struct Cli {
    /// Resume a show from watch history.
    #[arg(long)]
    history: bool,

    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Featured trailers plus the Recently Aired, Best Anime and Popular rows.
    Home,
    Search {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
    },
    /// Open the detail page for an episode-provider id.
    Show {
        id: String,
        #[arg(short = 'e', long, value_name = "EPISODE")]
        episode: Option<String>,
    },
    /// Print the scraped top-anime list.
    Scrape,
    /// Run the local /api/proxy and /api/scrape helper server.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,
    },
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum CacheAction {
    List,
    Clear,
    Remove { key: String },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a config file with the default settings.
    Init {
        #[arg(long)]
        force: bool,
    },
    Path,
}

struct Session<'a> {
    settings: &'a Settings,
    catalog: Catalog<'a, JikanClient, ZoroClient>,
    history: History,
    history_path: PathBuf,
}

/// `config` runs before settings are loaded, so it never touches the cache.
fn opens_cache(command: Option<&Commands>) -> bool {
    !matches!(command, Some(Commands::Config { .. }))
}

fn init_tracing() {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=anistream=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if !opens_cache(cli.command.as_ref())
        && let Some(Commands::Config { action }) = &cli.command
    {
        return run_config(action);
    }

    let mut settings = Settings::load()?;
    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = Some(dir.clone());
    }

    let cache = ResponseCache::open(settings.response_cache_dir()?)?;
    cache.clear_startup_keys()?;
    info!(cache = %cache.dir().display(), "anistream starting");

    match &cli.command {
        Some(Commands::Cache { action }) => return run_cache(&cache, action),
        Some(Commands::Scrape) => return run_scrape(&settings).await,
        Some(Commands::Serve { bind }) => {
            let state = proxy::ProxyState {
                client: build_http_client()?,
                scraper: GojoScraper::new(&settings.scrape_url)?,
            };
            return proxy::serve(bind, state).await;
        }
        _ => {}
    }

    let jikan = JikanClient::new(&settings.jikan_base_url)?;
    let zoro = ZoroClient::new(&settings.zoro_base_url)?;
    let history_path = history_path()?;
    let mut session = Session {
        settings: &settings,
        catalog: Catalog::new(&jikan, &zoro, &cache).with_limits(CatalogLimits {
            rows: settings.catalog_limit,
            featured: settings.featured_limit,
        }),
        history: History::load(&history_path)?,
        history_path,
    };

    if cli.history {
        if let Some(entry) = session.history.select_entry()? {
            return show_flow(&mut session, &entry.show_id, Some(entry.episode_id)).await;
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Search { page, query }) => {
            search_view(&mut session, &query.join(" "), page.max(1)).await
        }
        Some(Commands::Show { id, episode }) => show_flow(&mut session, &id, episode).await,
        _ => home_view(&mut session).await,
    }
}

fn run_config(action: &ConfigAction) -> Result<()> {
    let path = config_path()?;
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                println!(
                    "Config already exists at {}. Use --force to overwrite.",
                    path.display()
                );
                return Ok(());
            }
            Settings::write_default(&path)?;
            println!("Wrote default settings to {}.", path.display());
        }
    }
    Ok(())
}

fn run_cache(cache: &ResponseCache, action: &CacheAction) -> Result<()> {
    match action {
        CacheAction::List => {
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("Cache is empty ({}).", cache.dir().display());
            }
            for entry in entries {
                println!(
                    "{:<40} {:>10} {:>8} bytes",
                    entry.key,
                    entry.age_display(),
                    entry.size_bytes
                );
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("Removed {removed} cached responses.");
        }
        CacheAction::Remove { key } => {
            if cache.remove(key)? {
                println!("Removed {key}.");
            } else {
                println!("No cached entry named {key}.");
            }
        }
    }
    Ok(())
}

async fn run_scrape(settings: &Settings) -> Result<()> {
    let scraper = GojoScraper::new(&settings.scrape_url)?;
    let items = scraper
        .scrape_top()
        .await
        .context("Error fetching top anime")?;
    if items.is_empty() {
        println!("No top anime found at {}.", settings.scrape_url);
    }
    for (idx, item) in items.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] {}",
            idx + 1,
            item.title,
            item.episode_count,
            item.link.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

// --- Home ---

enum HomeItem {
    Featured(FeaturedEntry),
    Entry(&'static str, CatalogEntry),
}

impl HomeItem {
    fn label(&self) -> String {
        match self {
            HomeItem::Featured(f) => format!("[Featured] {} \u{25b6} trailer", f.title),
            HomeItem::Entry(row, entry) => format!("[{row}] {}", entry.label()),
        }
    }
}

async fn home_view(session: &mut Session<'_>) -> Result<()> {
    let catalog = &session.catalog;
    let (featured, recent, best, popular) = tokio::join!(
        catalog.featured(),
        catalog.recent_anime(),
        catalog.best_anime(),
        catalog.popular_anime()
    );
    let best = best.unwrap_or_else(|err| {
        error!(error = %err, "error fetching best anime");
        Vec::new()
    });
    let popular = popular.unwrap_or_else(|err| {
        error!(error = %err, "error fetching popular anime");
        Vec::new()
    });

    if let Some(hero) = featured.first() {
        println!("\n{}\n{}\n", hero.title, hero.synopsis);
    }

    let mut items: Vec<HomeItem> = featured.into_iter().map(HomeItem::Featured).collect();
    for (row, entries) in [
        ("Recently Aired", recent),
        ("Best Anime", best),
        ("Popular", popular),
    ] {
        if !entries.is_empty() {
            println!("{row}: {} titles", entries.len());
        }
        items.extend(entries.into_iter().map(|e| HomeItem::Entry(row, e)));
    }
    if items.is_empty() {
        println!("Nothing to show right now. Check your connection and try again.");
        return Ok(());
    }

    let labels: Vec<String> = items.iter().map(HomeItem::label).collect();
    loop {
        let selection = FuzzySelect::with_theme(&theme())
            .with_prompt("Pick a title (type to filter, Esc to quit)")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            return Ok(());
        };

        match &items[idx] {
            HomeItem::Featured(featured) => {
                let actions = ["Watch now", "Play trailer"];
                let action = Select::with_theme(&theme())
                    .with_prompt(&featured.title)
                    .items(&actions)
                    .default(0)
                    .interact_opt()?;
                match action {
                    Some(0) => open_by_title(session, &featured.title).await?,
                    Some(_) => {
                        if let Err(err) = player::open_trailer(&featured.trailer_embed_url) {
                            println!("Could not open trailer: {err}");
                        }
                    }
                    None => {}
                }
            }
            HomeItem::Entry(_, entry) => open_by_title(session, &entry.title).await?,
        }
    }
}

async fn open_by_title(session: &mut Session<'_>, title: &str) -> Result<()> {
    match session.catalog.resolve_title(title).await {
        Ok(Some(id)) => show_flow(session, &id, None).await,
        Ok(None) => {
            println!("Anime not found: {title}");
            Ok(())
        }
        Err(err) => {
            error!(title, error = %err, "error resolving title");
            println!("Could not look up \"{title}\": {err}");
            Ok(())
        }
    }
}

// --- Search ---

async fn search_view(session: &mut Session<'_>, query: &str, mut page: u32) -> Result<()> {
    if query.trim().is_empty() {
        return Ok(());
    }

    loop {
        let results = session.catalog.search(query, page).await;
        if results.results.is_empty() {
            println!("No results found for \"{query}\". Try searching for something else.");
            return Ok(());
        }

        println!(
            "Results for \"{query}\" (Page {page} of {})",
            results.total_pages
        );
        let mut labels: Vec<String> = results.results.iter().map(|r| r.label()).collect();
        let has_prev = page > 1;
        let has_next = page < results.total_pages;
        if has_prev {
            labels.push(String::from("\u{2190} Previous page"));
        }
        if has_next {
            labels.push(String::from("Next page \u{2192}"));
        }

        let selection = Select::with_theme(&theme())
            .with_prompt("Select a title (Esc to cancel)")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            println!("Cancelled.");
            return Ok(());
        };

        if idx >= results.results.len() {
            let is_prev = has_prev && idx == results.results.len();
            page = if is_prev { page - 1 } else { page + 1 };
            continue;
        }

        let anime = &results.results[idx];
        if anime.kind != MediaKind::TvSeries {
            let year = anime
                .year
                .as_ref()
                .map(|y| format!(" - {y}"))
                .unwrap_or_default();
            let proceed = Confirm::with_theme(&theme())
                .with_prompt(format!(
                    "You're selecting \"{}\" ({}{}). Continue?",
                    anime.title,
                    anime.kind.label(),
                    year
                ))
                .default(true)
                .interact()?;
            if !proceed {
                continue;
            }
        }
        let id = anime.id.clone();
        return show_flow(session, &id, None).await;
    }
}

// --- Detail + playback ---

fn print_detail(page: &DetailPage) {
    println!("\n{}  \u{2605} {}", page.title, page.rating);
    if !page.genres.is_empty() {
        println!("{}", page.genres.join(" \u{00b7} "));
    }
    if let Some(banner) = &page.banner {
        println!("{banner}");
    }
    println!("\nSynopsis\n{}\n", page.synopsis);
}

fn episode_label(ep: &EpisodeInfo) -> String {
    format!("Episode {} \u{00b7} {}", ep.number, ep.title)
}

fn next_episode_index(episodes: &[EpisodeInfo], current: usize) -> Option<usize> {
    (current + 1 < episodes.len()).then_some(current + 1)
}

/// Default selection: the requested episode (by id or number), else the one
/// after the last watched, else the first.
fn starting_episode(
    episodes: &[EpisodeInfo],
    prefer: Option<&str>,
    last_watched: Option<&str>,
) -> usize {
    if let Some(wanted) = prefer
        && let Some(idx) = episodes
            .iter()
            .position(|ep| ep.id == wanted || ep.number == wanted)
    {
        return idx;
    }
    last_watched
        .and_then(|id| episodes.iter().position(|ep| ep.id == id))
        .map(|idx| next_episode_index(episodes, idx).unwrap_or(idx))
        .unwrap_or(0)
}

async fn show_flow(session: &mut Session<'_>, id: &str, prefer: Option<String>) -> Result<()> {
    let page = session.catalog.detail_page(id).await;
    if page.title == "Unknown" && page.episodes.is_empty() {
        println!("Anime not found.");
        return Ok(());
    }
    print_detail(&page);

    if page.episodes.is_empty() {
        println!("No episodes available");
        return Ok(());
    }

    let last_watched = session
        .history
        .last_watched(&page.id)
        .map(|e| e.episode_id.clone());
    if let Some(prev) = last_watched
        .as_deref()
        .and_then(|id| page.episodes.iter().find(|ep| ep.id == id))
    {
        println!("Last watched: Episode {}.", prev.number);
    }

    let labels: Vec<String> = page.episodes.iter().map(episode_label).collect();
    let mut current = starting_episode(&page.episodes, prefer.as_deref(), last_watched.as_deref());

    loop {
        let selection = Select::with_theme(&theme())
            .with_prompt("Episode to play (Enter to select, Esc to cancel)")
            .items(&labels)
            .default(current)
            .interact_opt()?;
        let Some(idx) = selection else {
            println!("Exiting playback loop.");
            return Ok(());
        };

        let auto_advance = idx == current;
        let episode = &page.episodes[idx];
        if !play_episode(session, &page, episode).await? {
            current = idx;
            continue;
        }

        match (auto_advance, next_episode_index(&page.episodes, idx)) {
            (_, Some(next)) => current = next,
            (true, None) => {
                println!("No further episodes found. Exiting.");
                return Ok(());
            }
            (false, None) => current = idx,
        }
    }
}

/// Returns `false` when nothing was played.
async fn play_episode(
    session: &mut Session<'_>,
    page: &DetailPage,
    episode: &EpisodeInfo,
) -> Result<bool> {
    println!("Fetching streams for episode {}...", episode.number);
    let stream = match session
        .catalog
        .episode_stream(&episode.id, &session.settings.server)
        .await
    {
        Ok(Some(stream)) => stream,
        Ok(None) => {
            println!(
                "No supported streams found for episode {}. Try another episode or rerun later.",
                episode.number
            );
            return Ok(false);
        }
        Err(err) => {
            error!(episode = %episode.id, error = %err, "error fetching video source");
            println!("Error fetching streams: {err}");
            return Ok(false);
        }
    };

    let source = player::select_source(&stream)?;
    if !source.is_m3u8 {
        println!("No HLS stream available; playing progressive source instead.");
    }
    let subtitle = player::choose_subtitle(&stream.subtitles, &session.settings.preferred_subtitle)?;
    let media_title = format!("{} - Episode {}", page.title, episode.number);
    let args = player::build_player_args(source, &stream, subtitle, &media_title);
    player::launch_player(&session.settings.player, &args).await?;

    session.history.upsert(HistoryEntry {
        show_id: page.id.clone(),
        show_title: page.title.clone(),
        episode_id: episode.id.clone(),
        episode_number: episode.number.clone(),
        subtitle: subtitle.and_then(|idx| stream.subtitles.get(idx)).map(|t| t.lang.clone()),
        watched_at: Utc::now(),
    });
    session.history.save(&session.history_path)?;
    Ok(true)
}
