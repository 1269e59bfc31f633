//! # Forum Search CLI (`fsearch`)
//!
//! ```bash
//! fsearch --config ./config/fsearch.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fsearch init` | Create the forum schema in the SQLite database |
//! | `fsearch search "<query>"` | Ranked search over posts and replies |
//! | `fsearch ask "<question>" --user <id>` | AI answer scoped to one user's threads |
//! | `fsearch stats` | Corpus and index statistics |
//! | `fsearch serve` | Start the HTTP server |
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use forum_search::config;
use forum_search::models::DocumentKind;
use forum_search::search::{MatchMode, SearchQuery, SortOrder};
use forum_search::service::{AiSearchRequest, SearchService};
use forum_search::{migrate, server};

/// Forum Search: ranked search and access-scoped AI answers for forums.
#[derive(Parser)]
#[command(name = "fsearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Ranked search over posts and replies.
    Search {
        query: String,

        /// Only `post` or `reply` documents.
        #[arg(long = "type")]
        kind: Option<DocumentKind>,

        /// `or`, `and`, or `exact`.
        #[arg(long = "match", default_value = "or")]
        match_mode: MatchMode,

        #[arg(long)]
        business_unit: Option<i64>,

        #[arg(long)]
        thread: Option<i64>,

        /// `relevance`, `new`, or `top`.
        #[arg(long, default_value = "relevance")]
        sort: SortOrder,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Show per-signal score contributions.
        #[arg(long)]
        explain: bool,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Ask a question answered from the threads a user can read.
    Ask {
        query: String,

        /// User id whose thread memberships bound the answer.
        #[arg(long)]
        user: i64,

        #[arg(long)]
        business_unit: Option<String>,

        #[arg(long)]
        thread: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show corpus and index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Search {
            query,
            kind,
            match_mode,
            business_unit,
            thread,
            sort,
            page,
            limit,
            explain,
            json,
        } => {
            let service = SearchService::open(cfg).await?;
            let query = SearchQuery {
                query,
                kind,
                match_mode,
                business_unit_id: business_unit,
                thread_id: thread,
                sort,
                page: Some(page),
                limit,
                explain,
            };
            print_search(&service, &query, json)?;
        }
        Commands::Ask {
            query,
            user,
            business_unit,
            thread,
            json,
        } => {
            let service = SearchService::open(cfg).await?;
            let request = AiSearchRequest {
                query,
                conversation_history: Vec::new(),
                business_unit_id: business_unit,
                thread_id: thread,
            };
            let answer = service.ai_search(user, &request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, s) in answer.sources.iter().enumerate() {
                        println!(
                            "  {}. {} {}",
                            i + 1,
                            s.url,
                            s.title.as_deref().unwrap_or("(reply)")
                        );
                    }
                }
                if !answer.suggested_followups.is_empty() {
                    println!();
                    println!("Follow-ups:");
                    for f in &answer.suggested_followups {
                        println!("  - {}", f);
                    }
                }
            }
        }
        Commands::Stats { json } => {
            let path = cfg.db.path.clone();
            let service = SearchService::open(cfg).await?;
            let stats = service.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Forum Search: Index Stats");
                println!("==========================");
                println!();
                println!("  Database:    {}", path.display());
                println!("  Generation:  {}", stats.generation);
                println!("  Built at:    {}", stats.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
                println!();
                println!("  Documents:   {}", stats.documents);
                println!("  Posts:       {}", stats.posts);
                println!("  Replies:     {}", stats.replies);
                println!("  Terms:       {}", stats.terms);
                println!();
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn print_search(service: &SearchService, query: &SearchQuery, json: bool) -> anyhow::Result<()> {
    let resp = service.search(query);
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }
    if resp.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let offset = (resp.page - 1) * resp.limit;
    for (i, r) in resp.results.iter().enumerate() {
        let title = r.title.as_deref().unwrap_or("(reply)");
        println!("{}. [{:.2}] {} / {}", offset + i + 1, r.relevance_score, r.id, title);
        println!("    created: {}", r.created_at.format("%Y-%m-%d"));
        if let Some(thread) = &r.thread_name {
            println!("    thread: {}", thread);
        }
        println!("    upvotes: {}", r.popularity_score);
        println!("    excerpt: \"{}\"", r.snippet.replace('\n', " ").trim());
        if let Some(e) = &r.explain {
            println!(
                "    explain: terms={:.2} phrase={:.2} proximity={:.2} popularity={:.2} recency={:.2}",
                e.term_frequency, e.phrase, e.proximity, e.popularity, e.recency
            );
        }
        println!();
    }
    println!(
        "Page {} of {} ({} results)",
        resp.page,
        resp.total.div_ceil(resp.limit).max(1),
        resp.total
    );
    Ok(())
}
