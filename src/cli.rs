use std::error::Error;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

use quotecloud_rs::{
    ApiSource, CacheStore, Controller, DataLoader, DirSource, FilterState, HttpSource,
    KeywordEntry, LoadError, MIN_SEARCH_LEN, Quote, SortKey, View,
};

#[derive(Parser, Debug)]
#[command(name = "quotecloud-rs", about = "Browse, search, and filter the quote cloud", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the static API, e.g. https://example.org/data/api.
    #[arg(long, global = true, conflicts_with = "data_dir")]
    base_url: Option<String>,

    /// Directory holding the generated static API.
    #[arg(long, global = true, default_value = "data/api")]
    data_dir: PathBuf,

    /// Skip reading and writing the on-disk cache snapshots.
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the keyword cloud, optionally restricted to categories.
    Cloud {
        /// Category to select; repeat to intersect several.
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Browse the quotes behind one keyword.
    Quotes {
        /// Keyword to fetch.
        keyword: String,
        /// Sort order: popularity, author, length, or random.
        #[arg(short, long, default_value = "popularity")]
        sort: SortKey,
    },
    /// Fuzzy-search quote text and authors across the full index.
    Search {
        /// Search term, at least three characters.
        term: String,
        /// Sort order for the result list.
        #[arg(short, long, default_value = "popularity")]
        sort: SortKey,
    },
    /// Deterministic facet filtering over the full index.
    Filter {
        /// Author to match; repeat for OR semantics.
        #[arg(long = "author")]
        authors: Vec<String>,
        /// Tag every result must carry; repeat for AND semantics.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Category to match; repeat for OR semantics.
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Minimum popularity score in [0, 1].
        #[arg(long, default_value_t = 0.0)]
        min_popularity: f64,
        #[arg(short, long, default_value = "popularity")]
        sort: SortKey,
    },
    /// Corpus totals and the most quoted authors.
    Stats,
}

enum CliSource {
    Http(HttpSource),
    Dir(DirSource),
}

impl ApiSource for CliSource {
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        match self {
            CliSource::Http(source) => source.fetch_bytes(path).await,
            CliSource::Dir(source) => source.fetch_bytes(path).await,
        }
    }
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    let source = match &cli.base_url {
        Some(base) => CliSource::Http(HttpSource::new(base.clone())),
        None => CliSource::Dir(DirSource::new(&cli.data_dir)),
    };
    let loader = DataLoader::new(source);

    let store = if cli.no_cache {
        None
    } else {
        CacheStore::default_dir().map(CacheStore::new)
    };
    if let Some(store) = &store {
        store.restore(&loader);
    }

    // Catalog failures abort here: no partial UI.
    let mut controller = Controller::initialize(loader).await?;

    match cli.command {
        Command::Cloud { categories } => handle_cloud(&mut controller, categories, cli.json).await?,
        Command::Quotes { keyword, sort } => {
            handle_quotes(&mut controller, keyword, sort, cli.json).await?
        }
        Command::Search { term, sort } => {
            handle_search(&mut controller, term, sort, cli.json).await?
        }
        Command::Filter {
            authors,
            tags,
            categories,
            min_popularity,
            sort,
        } => {
            let state = FilterState {
                authors,
                tags,
                categories,
                min_popularity,
                sort,
                ..FilterState::default()
            };
            handle_filter(&mut controller, state, cli.json).await?;
        }
        Command::Stats => handle_stats(&controller, cli.json)?,
    }

    if let Some(store) = &store {
        store.persist(controller.loader());
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn handle_cloud(
    controller: &mut Controller<CliSource>,
    categories: Vec<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let known = controller.catalog().category_names();
    for category in &categories {
        if !known.contains(category) {
            return Err(format!(
                "Unknown category {category:?} (available: {})",
                known.join(", ")
            )
            .into());
        }
    }

    let mut view = controller.refresh().await;
    for category in &categories {
        view = controller.toggle_category(category).await;
    }

    match view {
        View::Cloud {
            keywords,
            active_keyword,
            quotes,
        } => {
            if as_json {
                let payload = json!({
                    "categories": categories,
                    "keywords": keywords,
                    "active_keyword": active_keyword,
                    "quotes": quotes,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }
            if keywords.is_empty() {
                println!("No keywords shared by the selected categories.");
                return Ok(());
            }
            print_keyword_table(&keywords);
            if let Some(keyword) = active_keyword {
                println!();
                println!("Quotes for \"{keyword}\":");
                print_quote_list(&quotes, &keyword);
            }
        }
        // A restored bulk index makes facet filtering the active path for
        // category selections.
        View::Results { quotes, .. } => {
            if as_json {
                let payload = json!({ "categories": categories, "quotes": quotes });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }
            if quotes.is_empty() {
                println!("No quotes matched the selected categories.");
                return Ok(());
            }
            print_quotes(&quotes);
        }
    }
    Ok(())
}

async fn handle_quotes(
    controller: &mut Controller<CliSource>,
    keyword: String,
    sort: SortKey,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    controller.set_sort(sort).await;
    let view = controller.select_keyword(&keyword).await;
    let quotes = view.quotes();

    if as_json {
        let payload = json!({
            "keyword": keyword,
            "sort": sort.to_string(),
            "quotes": quotes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    print_quote_list(quotes, &keyword);
    Ok(())
}

async fn handle_search(
    controller: &mut Controller<CliSource>,
    term: String,
    sort: SortKey,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if term.trim().chars().count() < MIN_SEARCH_LEN {
        return Err(format!("Search term must be at least {MIN_SEARCH_LEN} characters").into());
    }
    controller.set_sort(sort).await;
    let view = controller.set_search_term(term.clone()).await;
    let quotes = view.quotes();

    if as_json {
        let payload = json!({
            "term": term,
            "sort": sort.to_string(),
            "quotes": quotes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if quotes.is_empty() {
        println!("No quotes matched \"{term}\".");
        return Ok(());
    }
    println!("Matches for \"{term}\":");
    print_quotes(quotes);
    Ok(())
}

async fn handle_filter(
    controller: &mut Controller<CliSource>,
    state: FilterState,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    // The filter command is explicitly the deep facet path; make the full
    // index available up front so category selections filter it instead
    // of falling back to the cloud view.
    controller.loader().full_index().await;
    let view = controller.apply(state.clone()).await;
    let quotes = view.quotes();

    if as_json {
        let payload = json!({
            "authors": state.authors,
            "tags": state.tags,
            "categories": state.categories,
            "min_popularity": state.min_popularity,
            "sort": state.sort.to_string(),
            "quotes": quotes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if quotes.is_empty() {
        println!("No quotes matched the selected filters.");
        return Ok(());
    }
    print_quotes(quotes);
    Ok(())
}

fn handle_stats(
    controller: &Controller<CliSource>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let stats = &controller.catalog().stats;
    if as_json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("Total quotes: {}", stats.total_quotes);
    println!("Categories:   {}", controller.catalog().keywords.len());
    let mut authors: Vec<(&String, &u64)> = stats.top_authors.iter().collect();
    authors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if authors.is_empty() {
        return Ok(());
    }
    let width = authors
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(6)
        .max("AUTHOR".len());
    println!();
    println!("{:<width$}  {}", "AUTHOR", "QUOTES", width = width);
    println!("{:-<width$}  {}", "", "------", width = width);
    for (name, count) in authors {
        println!("{:<width$}  {}", name, count, width = width);
    }
    Ok(())
}

fn print_keyword_table(rows: &[KeywordEntry]) {
    let width = rows
        .iter()
        .map(|entry| entry.word.len())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {:>6}  {:>5}", "WORD", "IMPACT", "COUNT", width = width);
    println!("{:-<width$}  {:->6}  {:->5}", "", "", "", width = width);
    for entry in rows {
        println!(
            "{:<width$}  {:>6.3}  {:>5}",
            entry.word,
            entry.impact,
            entry.count,
            width = width
        );
    }
}

fn print_quote_list(quotes: &[Quote], keyword: &str) {
    if quotes.is_empty() {
        println!("No quotes found for \"{keyword}\".");
        return;
    }
    print_quotes(quotes);
}

fn print_quotes(quotes: &[Quote]) {
    for (idx, quote) in quotes.iter().enumerate() {
        let attribution = if quote.author.is_empty() {
            "Unknown".to_string()
        } else {
            quote.author.clone()
        };
        let body = format!("> {}\n>\n> — **{attribution}**", quote.quote.trim());
        println!("\n{}.", idx + 1);
        render_markdown_block(&body);
        let mut meta = Vec::new();
        if !quote.category.is_empty() {
            meta.push(format!("category: {}", quote.category));
        }
        if !quote.tags.is_empty() {
            meta.push(format!("tags: {}", quote.tags.join(", ")));
        }
        if quote.popularity > 0.0 {
            meta.push(format!("popularity: {:.2}", quote.popularity));
        }
        if !meta.is_empty() {
            println!("   {}", meta.join("  |  "));
        }
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(body: &str) {
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, body, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{body}");
    }
}
