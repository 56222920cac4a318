mod config;
mod db;
mod enrichment;
mod listing;
mod models;
mod provider;
mod repository;
mod seed;
mod server;
mod workspace;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::Database;
use enrichment::{EnrichRequest, InFlight};
use listing::{ListingPage, Query, SortDirection, SortField, ALL};
use models::{Company, SearchFilters};
use workspace::{export_file_name, Workspace};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Company intelligence - search, track, and enrich companies")]
struct Cli {
    /// Path to the database (overrides SCOUT_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and load the built-in companies
    Init,

    /// Search, filter, and sort companies
    Companies {
        /// Text to match against name and description
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Only this industry
        #[arg(short, long, default_value = ALL)]
        industry: String,

        /// Only this funding stage
        #[arg(short, long, default_value = ALL)]
        stage: String,

        /// Sort field (name, industry, stage, founded, employees, totalFunding, lastFundingDate, ...)
        #[arg(long, default_value = "name")]
        sort: String,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Page number
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Rows per page (default from SCOUT_PAGE_SIZE, else 10)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show a company profile
    Show {
        /// Company ID
        id: String,
    },

    /// Enrich a company from its public website
    Enrich {
        /// Company ID
        id: String,
    },

    /// Manage notes on companies
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Manage company lists
    List {
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Manage saved searches
    Search {
        #[command(subcommand)]
        command: SearchCommands,
    },

    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides SCOUT_BIND)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a note to a company
    Add {
        /// Company ID
        company_id: String,
        /// Note text
        content: String,
    },

    /// Show notes for a company, newest first
    List {
        /// Company ID
        company_id: String,
    },

    /// Replace the text of a note
    Edit {
        /// Note ID
        id: String,
        /// New text
        content: String,
    },

    /// Delete a note
    Delete {
        /// Note ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// Show all lists
    Ls,

    /// Create a list
    Create {
        /// List name
        name: String,

        /// What the list is for
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Delete a list
    Delete {
        /// List ID
        id: String,
    },

    /// Show the companies on a list
    Show {
        /// List ID
        id: String,
    },

    /// Add a company to a list
    Add {
        /// List ID
        list_id: String,
        /// Company ID
        company_id: String,
    },

    /// Remove a company from a list
    Remove {
        /// List ID
        list_id: String,
        /// Company ID
        company_id: String,
    },

    /// Export a list as JSON
    Export {
        /// List ID
        id: String,

        /// Output file (default: <list-name>-<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SearchCommands {
    /// Save a search
    Save {
        /// Search text
        query: String,

        /// Industry filter
        #[arg(short, long)]
        industry: Option<String>,

        /// Stage filter
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Show saved searches
    List,

    /// Run a saved search
    Run {
        /// Saved search ID
        id: String,

        /// Rows per page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Delete a saved search
    Delete {
        /// Saved search ID
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "scout=debug" } else { "scout=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::from_env()?;
    if let Some(path) = cli.db {
        config.db_path = path;
    }
    debug!(?config, "loaded configuration");

    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            let stats = db.seed()?;
            println!("Database initialized at {}", db.path().display());
            if stats.companies + stats.lists + stats.saved_searches > 0 {
                println!(
                    "Loaded {} companies, {} lists, {} saved searches.",
                    stats.companies, stats.lists, stats.saved_searches
                );
            }
        }

        Commands::Companies {
            search,
            industry,
            stage,
            sort,
            desc,
            page,
            page_size,
        } => {
            db.ensure_initialized()?;
            let query = Query {
                search_text: search.unwrap_or_default(),
                industry_filter: industry,
                stage_filter: stage,
                sort_field: sort.parse::<SortField>()?,
                sort_direction: if desc { SortDirection::Desc } else { SortDirection::Asc },
                page,
                page_size: page_size.unwrap_or(config.page_size),
            };
            let companies = db.list_companies()?;
            let result = listing::list(&companies, &query)?;
            print_page(&result);
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            let company = db
                .get_company(&id)?
                .ok_or_else(|| anyhow!("Company #{} not found", id))?;
            show_company(&db, &company)?;
        }

        Commands::Enrich { id } => {
            db.ensure_initialized()?;
            let company = db
                .get_company(&id)?
                .ok_or_else(|| anyhow!("Company #{} not found", id))?;
            enrich_company(&db, &config, &company).await?;
        }

        Commands::Note { command } => {
            db.ensure_initialized()?;
            let ws = Workspace::new(&db);
            match command {
                NoteCommands::Add { company_id, content } => {
                    require_company(&db, &company_id)?;
                    let note = ws.add_note(&company_id, &content)?;
                    println!("Added note #{}", note.id);
                }

                NoteCommands::List { company_id } => {
                    let notes = ws.notes_for(&company_id)?;
                    if notes.is_empty() {
                        println!("No notes yet.");
                    }
                    for note in notes {
                        println!("#{}  {}", note.id, note.timestamp.format("%Y-%m-%d %H:%M"));
                        println!("{}\n", textwrap::indent(&textwrap::fill(&note.content, 76), "  "));
                    }
                }

                NoteCommands::Edit { id, content } => {
                    ws.edit_note(&id, &content)?;
                    println!("Updated note #{}", id);
                }

                NoteCommands::Delete { id } => {
                    ws.delete_note(&id)?;
                    println!("Deleted note #{}", id);
                }
            }
        }

        Commands::List { command } => {
            db.ensure_initialized()?;
            let ws = Workspace::new(&db);
            match command {
                ListCommands::Ls => {
                    let lists = ws.lists()?;
                    if lists.is_empty() {
                        println!("No lists found.");
                    } else {
                        println!("{:<15} {:<25} {:>9} {:<12}", "ID", "NAME", "COMPANIES", "CREATED");
                        println!("{}", "-".repeat(64));
                        for list in lists {
                            println!(
                                "{:<15} {:<25} {:>9} {:<12}",
                                list.id,
                                truncate(&list.name, 23),
                                list.company_ids.len(),
                                list.created_at.format("%Y-%m-%d")
                            );
                        }
                    }
                }

                ListCommands::Create { name, description } => {
                    let list = ws.create_list(&name, &description)?;
                    println!("Created list '{}' (ID: {})", list.name, list.id);
                }

                ListCommands::Delete { id } => {
                    ws.delete_list(&id)?;
                    println!("Deleted list #{}", id);
                }

                ListCommands::Show { id } => {
                    let list = ws.get_list(&id)?;
                    println!("{} (ID: {})", list.name, list.id);
                    if !list.description.is_empty() {
                        println!("{}", list.description);
                    }
                    let companies = db.list_companies()?;
                    let members: Vec<&Company> = list
                        .company_ids
                        .iter()
                        .filter_map(|cid| companies.iter().find(|c| &c.id == cid))
                        .collect();
                    println!();
                    if members.is_empty() {
                        println!("No companies on this list.");
                    } else {
                        print_company_header();
                        for company in members {
                            print_company_row(company);
                        }
                    }
                }

                ListCommands::Add { list_id, company_id } => {
                    let company = require_company(&db, &company_id)?;
                    if ws.add_to_list(&list_id, &company_id)? {
                        println!("Added {} to list #{}", company.name, list_id);
                    } else {
                        println!("{} is already on list #{}", company.name, list_id);
                    }
                }

                ListCommands::Remove { list_id, company_id } => {
                    if ws.remove_from_list(&list_id, &company_id)? {
                        println!("Removed #{} from list #{}", company_id, list_id);
                    } else {
                        println!("#{} is not on list #{}", company_id, list_id);
                    }
                }

                ListCommands::Export { id, output } => {
                    let companies = db.list_companies()?;
                    let export = ws.export_list(&id, &companies)?;
                    let out_path =
                        output.unwrap_or_else(|| PathBuf::from(export_file_name(&export.list_name)));
                    let json = serde_json::to_string_pretty(&export)?;
                    std::fs::write(&out_path, json)
                        .with_context(|| format!("Failed to write to {}", out_path.display()))?;
                    println!(
                        "Exported {} companies to {}",
                        export.companies.len(),
                        out_path.display()
                    );
                }
            }
        }

        Commands::Search { command } => {
            db.ensure_initialized()?;
            let ws = Workspace::new(&db);
            match command {
                SearchCommands::Save {
                    query,
                    industry,
                    stage,
                } => {
                    let companies = db.list_companies()?;
                    let filters = SearchFilters {
                        industry: industry.filter(|v| v != ALL),
                        stage: stage.filter(|v| v != ALL),
                    };
                    let search = ws.save_search(&query, filters, &companies)?;
                    println!(
                        "Saved search #{} ({} results)",
                        search.id, search.result_count
                    );
                }

                SearchCommands::List => {
                    let searches = ws.saved_searches()?;
                    if searches.is_empty() {
                        println!("No saved searches yet.");
                    } else {
                        println!(
                            "{:<15} {:<25} {:<30} {:>7} {:<12}",
                            "ID", "QUERY", "FILTERS", "RESULTS", "CREATED"
                        );
                        println!("{}", "-".repeat(93));
                        for search in searches {
                            let filters = [search.filters.industry.as_deref(), search.filters.stage.as_deref()]
                                .into_iter()
                                .flatten()
                                .collect::<Vec<_>>()
                                .join(", ");
                            println!(
                                "{:<15} {:<25} {:<30} {:>7} {:<12}",
                                search.id,
                                truncate(&search.query, 23),
                                truncate(&filters, 28),
                                search.result_count,
                                search.created_at.format("%Y-%m-%d")
                            );
                        }
                    }
                }

                SearchCommands::Run { id, page_size } => {
                    let companies = db.list_companies()?;
                    let page = ws.run_search(&id, &companies, page_size.unwrap_or(config.page_size))?;
                    print_page(&page);
                }

                SearchCommands::Delete { id } => {
                    ws.delete_search(&id)?;
                    println!("Deleted saved search #{}", id);
                }
            }
        }

        Commands::Serve { bind } => {
            db.init()?;
            db.seed()?;
            let addr = bind.unwrap_or_else(|| config.bind.clone());
            let state = server::AppState {
                db: Arc::new(db),
                provider: Arc::from(provider::provider_from_config(&config)?),
                in_flight: InFlight::new(),
                enrich_timeout: config.enrich_timeout,
                page_size: config.page_size,
            };
            server::serve(state, &addr).await?;
        }
    }

    Ok(())
}

fn require_company(db: &Database, id: &str) -> Result<Company> {
    db.get_company(id)?
        .ok_or_else(|| anyhow!("Company #{} not found", id))
}

async fn enrich_company(db: &Database, config: &Config, company: &Company) -> Result<()> {
    let provider = provider::provider_from_config(config)?;
    let request = EnrichRequest::new(&company.website, &company.name);

    println!("Enriching {} from {}...", company.name, company.website);
    let outcome = tokio::select! {
        outcome = enrichment::enrich(provider.as_ref(), &request, config.enrich_timeout) => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("Enrichment cancelled.");
            return Ok(());
        }
    };

    match outcome {
        Ok(result) => {
            db.save_enrichment(&company.id, &result)?;
            println!();
            print_enrichment(&result);
            Ok(())
        }
        Err(e) => {
            if db.latest_enrichment(&company.id)?.is_some() {
                warn!(company_id = %company.id, "keeping previous enrichment");
            }
            let hint = if e.is_retryable() {
                " (temporary, try again)"
            } else if e.is_caller_error() {
                " (check the company website)"
            } else {
                ""
            };
            Err(anyhow!("Enrichment failed: {}{}", e, hint))
        }
    }
}

fn show_company(db: &Database, company: &Company) -> Result<()> {
    println!("Company #{}", company.id);
    println!("Name: {}", company.name);
    println!("Industry: {}", company.industry);
    println!("Stage: {}", company.stage);
    println!("Founded: {}", company.founded);
    println!("Location: {}", company.location);
    println!("Website: {}", company.website);
    println!("Employees: {}", company.employees);
    println!("Total funding: {}", company.funding_display());
    println!("Last funding: {}", company.last_funding_date);
    if !company.signals.is_empty() {
        println!("Signals: {}", company.signals.join(", "));
    }
    println!("\n{}", textwrap::fill(&company.description, 78));

    let ws = Workspace::new(db);
    let lists = ws.lists_containing(&company.id)?;
    if !lists.is_empty() {
        let names: Vec<&str> = lists.iter().map(|l| l.name.as_str()).collect();
        println!("\nOn lists: {}", names.join(", "));
    }

    let notes = ws.notes_for(&company.id)?;
    if !notes.is_empty() {
        println!("\nNotes ({}):", notes.len());
        for note in notes {
            println!("  #{} ({}) {}", note.id, note.timestamp.format("%Y-%m-%d"), note.content);
        }
    }

    match db.latest_enrichment(&company.id)? {
        Some((result, enriched_at)) => {
            println!("\n--- Enrichment ({}) ---", enriched_at.format("%Y-%m-%d %H:%M"));
            print_enrichment(&result);
        }
        None => println!("\nNot enriched yet. Run 'scout enrich {}'.", company.id),
    }
    Ok(())
}

fn print_enrichment(result: &models::EnrichmentResult) {
    println!("Summary:\n{}", textwrap::indent(&textwrap::fill(&result.summary, 76), "  "));
    println!("\nWhat they do:");
    for item in &result.what_they_do {
        println!("  - {}", item);
    }
    println!("\nKeywords: {}", result.keywords.join(", "));
    if !result.derived_signals.is_empty() {
        println!("\nSignals:");
        for signal in &result.derived_signals {
            println!("  - {}", signal);
        }
    }
    println!("\nSources:");
    for source in &result.sources {
        println!("  {} (fetched {})", source.url, source.fetched_at.format("%Y-%m-%d %H:%M:%S"));
    }
}

fn print_company_header() {
    println!(
        "{:<6} {:<20} {:<24} {:<10} {:>9} {:>9}",
        "ID", "NAME", "INDUSTRY", "STAGE", "FUNDING", "EMPLOYEES"
    );
    println!("{}", "-".repeat(83));
}

fn print_company_row(company: &Company) {
    println!(
        "{:<6} {:<20} {:<24} {:<10} {:>9} {:>9}",
        truncate(&company.id, 6),
        truncate(&company.name, 18),
        truncate(&company.industry, 22),
        truncate(&company.stage, 10),
        company.funding_display(),
        company.employees
    );
}

fn print_page(page: &ListingPage) {
    if page.items.is_empty() {
        println!("No companies found.");
        return;
    }
    print_company_header();
    for company in &page.items {
        print_company_row(company);
    }
    println!(
        "\nShowing {} of {} companies. Page {} of {}",
        page.items.len(),
        page.total_matched,
        page.page,
        page.total_pages
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
