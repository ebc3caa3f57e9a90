use anyhow::Result;
use colored::*;
use couch::{Client, ViewQuery};
use serde_json::json;
use std::time::{Duration, Instant};

use crate::feed_watcher::Watcher;
use crate::output::{print_change, print_rows, TestResult};

const CHANGE_TIMEOUT: Duration = Duration::from_secs(10);

fn test_doc_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

pub async fn test_connection(watcher: &Watcher) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());

    let state = watcher.state();
    if state.is_terminal() {
        println!("{} Change feed is {:?}", "✗".red(), state);
        return Ok(TestResult::fail(
            "connection",
            format!("Feed ended in state {:?}", state),
            start.elapsed(),
        ));
    }

    println!("{} {} feed active ({:?})", "✓".green(), watcher.label, state);
    Ok(TestResult::pass("connection", start.elapsed()))
}

pub async fn test_change_notification(client: &Client, watcher: &mut Watcher) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Change Notification ===".bright_cyan().bold());

    let id = test_doc_id("feed");
    println!("{} Creating document {}...", "→".blue(), id);
    let doc = client
        .create(Some(&id), &json!({"type": "feed-test", "created_by": "feed-test-client"}))
        .await?;
    let rev = doc["_rev"].as_str().unwrap_or_default().to_string();
    println!("{} Document created (rev: {})", "✓".green(), rev);

    println!("{} Waiting for change notification...", "→".blue());
    let result = match watcher.wait_for_change(&id, CHANGE_TIMEOUT).await {
        Ok(change) => {
            print_change(&watcher.label, &change);
            let latency = change.timestamp.duration_since(start);
            println!("{} Notified after {:?}", "✓".green(), latency);
            TestResult::pass("change_notification", start.elapsed())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            TestResult::fail("change_notification", e.to_string(), start.elapsed())
        }
    };

    client.delete(&id, &rev).await?;
    Ok(result)
}

pub async fn test_document_round_trip(client: &Client) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Document Round Trip ===".bright_cyan().bold());

    let created = client
        .create(None, &json!({"type": "feed-test", "text": "draft"}))
        .await?;
    let id = created["_id"].as_str().unwrap_or_default().to_string();
    println!("{} Created {} (server-assigned id)", "✓".green(), id);

    let mut edited = created.clone();
    edited["text"] = json!("final");
    let updated = client.update(&edited).await?;
    println!("{} Updated to rev {}", "✓".green(), updated["_rev"]);

    let fetched = client.get(&id).await?;
    let rev = updated["_rev"].as_str().unwrap_or_default().to_string();
    client.delete(&id, &rev).await?;
    println!("{} Deleted {}", "✓".green(), id);

    if fetched == updated {
        Ok(TestResult::pass("document_round_trip", start.elapsed()))
    } else {
        println!("{} Fetched document differs from the update!", "✗".red());
        Ok(TestResult::fail(
            "document_round_trip",
            format!("Expected {}, got {}", updated, fetched),
            start.elapsed(),
        ))
    }
}

pub async fn test_pagination(client: &Client, view_id: &str, page_size: u64) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Pagination ===".bright_cyan().bold());

    let first = client
        .view(view_id, ViewQuery::new().limit(page_size))
        .await?;
    print_rows("first", &first.rows);
    if first.rows.is_empty() {
        return Ok(TestResult::fail(
            "pagination",
            format!("View {} has no rows", view_id),
            start.elapsed(),
        ));
    }

    let second = match first.next().await {
        Ok(page) if !page.is_empty() => page,
        Ok(_) => {
            println!("{} View fits on one page, nothing to navigate", "→".blue());
            return Ok(TestResult::pass("pagination", start.elapsed()));
        }
        Err(e) => return Ok(TestResult::fail("pagination", e.to_string(), start.elapsed())),
    };
    print_rows("next", &second.rows);

    let back = second.previous().await?;
    print_rows("previous", &back.rows);

    if back.rows == first.rows {
        println!("{} previous() returned the first page", "✓".green());
        Ok(TestResult::pass("pagination", start.elapsed()))
    } else {
        println!("{} previous() did not return the first page!", "✗".red());
        Ok(TestResult::fail(
            "pagination",
            format!(
                "Expected {} rows starting at {}, got {} rows",
                first.rows.len(),
                first.rows[0].key,
                back.rows.len()
            ),
            start.elapsed(),
        ))
    }
}
