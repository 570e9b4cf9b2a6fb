use catalog_search::search::{QueryAnalyzer, QueryBuilder, SearchConfig, SearchRequest};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use std::error::Error;

#[derive(Parser)]
#[command(name = "catalog-search-cli")]
#[command(about = "Catalog Search CLI", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search
    Search {
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Query strategy (best_fields, phrase, prefix, fuzzy, wildcard, boolean)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Search mode (standard, strict, relaxed)
        #[arg(short, long)]
        mode: Option<String>,

        #[arg(short = 'c', long = "category")]
        categories: Vec<String>,

        #[arg(short = 'b', long = "brand")]
        brands: Vec<String>,

        #[arg(long)]
        min_price: Option<f64>,

        #[arg(long)]
        max_price: Option<f64>,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Skip facet aggregation
        #[arg(long)]
        no_facets: bool,
    },

    /// Analyze a query offline and print the recommendation
    Analyze {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Print the backend query a search would execute, built offline
    Plan {
        #[arg(value_name = "QUERY")]
        query: String,

        #[arg(short, long)]
        strategy: Option<String>,

        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Compare strategies for a query against the running service
    Compare {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Autocomplete suggestions
    Suggest {
        #[arg(value_name = "PREFIX")]
        prefix: String,

        #[arg(short, long, default_value = "5")]
        limit: u32,

        #[arg(short, long)]
        fuzzy: bool,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Search {
            query,
            strategy,
            mode,
            categories,
            brands,
            min_price,
            max_price,
            page,
            limit,
            no_facets,
        } => {
            let response = client
                .post(format!("{}/v1/search", cli.endpoint))
                .json(&json!({
                    "q": query,
                    "strategy": strategy,
                    "mode": mode,
                    "filters": {
                        "category_ids": categories,
                        "brand_ids": brands,
                        "price_min": min_price,
                        "price_max": max_price,
                    },
                    "page": page,
                    "limit": limit,
                    "include_facets": !no_facets,
                }))
                .send()
                .await?;

            print_response(response).await?;
        }

        Commands::Analyze { query } => {
            let analyzer = QueryAnalyzer::new(&SearchConfig::default());
            let analysis = analyzer.analyze(&query);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }

        Commands::Plan {
            query,
            strategy,
            mode,
        } => {
            let mut request = SearchRequest::new(query);
            if let Some(strategy) = strategy {
                request = request.with_strategy(strategy.parse()?);
            }
            if let Some(mode) = mode {
                request = request.with_mode(mode.parse()?);
            }

            let builder = QueryBuilder::new(SearchConfig::default());
            let plan = builder.build(&request);
            println!("Strategy: {} ({})", plan.strategy(), plan.mode());
            println!("Function score: {}", plan.has_function_score());
            println!("{}", serde_json::to_string_pretty(plan.body())?);
        }

        Commands::Compare { query } => {
            let response = client
                .post(format!("{}/v1/search/compare", cli.endpoint))
                .json(&json!({ "query": query }))
                .send()
                .await?;

            print_response(response).await?;
        }

        Commands::Suggest {
            prefix,
            limit,
            fuzzy,
        } => {
            let response = client
                .get(format!("{}/v1/search/suggest", cli.endpoint))
                .query(&[
                    ("q", prefix),
                    ("limit", limit.to_string()),
                    ("fuzzy", fuzzy.to_string()),
                ])
                .send()
                .await?;

            print_response(response).await?;
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            print_response(response).await?;
        }
    }

    Ok(())
}

async fn print_response(response: reqwest::Response) -> Result<(), Box<dyn Error>> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        eprintln!("Request failed with status {}", status);
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
