use anyhow::Result;
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;

use couch::feed::{EventSourcePush, PushSource};
use couch::http::HttpTransportBuilder;
use couch::{Client, ClientOptions, FeedOptions, Init};
use testing_tools::feed_watcher::Watcher;
use testing_tools::output::print_test_summary;
use testing_tools::scenarios;

#[derive(Parser)]
#[command(name = "feed-test-client")]
#[command(about = "Change Feed Integration Testing Tool")]
struct Cli {
    /// Base URL of the CouchApp rewriter (e.g., http://localhost:5984/app/_design/app/_rewrite/)
    #[arg(long)]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// View used by the pagination scenario
    #[arg(long)]
    view: Option<String>,

    /// Rows per page in the pagination scenario
    #[arg(long, default_value_t = 5)]
    page_size: u64,

    /// Skip eventsource and use the longpoll feed only
    #[arg(long)]
    longpoll: bool,

    /// Try `_rewrite/api` when `api` is not found
    #[arg(long)]
    auto_redirect: bool,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test that a change feed subscription starts
    ConnectionTest,
    /// Test that a new document shows up on the change feed
    ChangeNotification,
    /// Test create, update, get and delete of one document
    DocumentRoundTrip,
    /// Test next/previous navigation through a view (requires --view)
    Pagination,
    /// Run all tests (pagination only when --view is given)
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let base_url = url::Url::parse(&cli.base_url)?;
    let transport = HttpTransportBuilder::new(base_url.clone()).build()?;
    let push = if cli.longpoll {
        None
    } else {
        Some(Arc::new(EventSourcePush::new(base_url)) as Arc<dyn PushSource>)
    };
    let options = ClientOptions {
        request_timeout: Some(Duration::from_secs(30)),
        feed: FeedOptions::default(),
    };
    let client = Client::with_transport(Arc::new(transport), push, options);

    println!("{} Checking api...", "→".blue());
    let client = match client.init(cli.auto_redirect).await? {
        Init::Rewritten(client) => {
            println!("{} api found below _rewrite/", "✓".green());
            client
        }
        Init::Ready(response) if response.ok => {
            println!("{} api reachable (status {})", "✓".green(), response.status);
            client
        }
        Init::Ready(response) => {
            anyhow::bail!("api not reachable: {} {}", response.status, response.status_text)
        }
    };

    println!("\n{} Subscribing to the change feed...", "→".blue());
    let since = client.update_seq().await?;
    let mut watcher =
        Watcher::establish(&client, "Feed".to_string(), since.clone(), Duration::from_secs(5))
            .await?;
    println!("{} Change feed subscribed (since {})", "✓".green(), since);

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&watcher).await?);
        }
        ScenarioChoice::ChangeNotification => {
            results.push(scenarios::test_change_notification(&client, &mut watcher).await?);
        }
        ScenarioChoice::DocumentRoundTrip => {
            results.push(scenarios::test_document_round_trip(&client).await?);
        }
        ScenarioChoice::Pagination => {
            let view = cli
                .view
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--view is required for Pagination"))?;
            results.push(scenarios::test_pagination(&client, view, cli.page_size).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&watcher).await?);
            results.push(scenarios::test_change_notification(&client, &mut watcher).await?);
            results.push(scenarios::test_document_round_trip(&client).await?);
            if let Some(view) = cli.view.as_deref() {
                results.push(scenarios::test_pagination(&client, view, cli.page_size).await?);
            }
        }
    }

    if let Some(seq) = watcher.last_seq() {
        println!("\n{} Last acknowledged seq: {}", "→".blue(), seq);
    }
    let final_state = watcher.stop().await;
    println!("{} Change feed stopped ({:?})", "✓".green(), final_state);

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
