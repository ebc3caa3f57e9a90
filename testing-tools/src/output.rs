use colored::*;
use std::time::Duration;

use couch::ViewRow;

use crate::feed_watcher::Change;

#[derive(Debug)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    pub fn pass(scenario: &str, duration: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: true,
            message: None,
            duration,
        }
    }

    pub fn fail(scenario: &str, message: String, duration: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: false,
            message: Some(message),
            duration,
        }
    }
}

pub fn print_change(label: &str, change: &Change) {
    println!(
        "\n[{}] change to {} received",
        label.bright_blue().bold(),
        change.row.id().unwrap_or("?").yellow()
    );

    if let Ok(pretty) = serde_json::to_string_pretty(change.row.as_value()) {
        println!("   {}", pretty.dimmed());
    }
}

pub fn print_rows(label: &str, rows: &[ViewRow]) {
    let keys: Vec<String> = rows.iter().map(|row| row.key.to_string()).collect();
    println!(
        "   {} {} rows: {}",
        label.bright_magenta(),
        rows.len(),
        keys.join(", ").dimmed()
    );
}

pub fn print_test_summary(results: &[TestResult]) {
    println!("\n{}", "=== TEST SUMMARY ===".bright_white().bold());

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;

    for result in results {
        let status = if result.passed {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };

        println!("[{}] {} ({:?})", status, result.scenario, result.duration);

        if let Some(msg) = &result.message {
            println!("      {}", msg.dimmed());
        }
    }

    println!(
        "\n{}: {} passed, {} failed",
        "Results".bold(),
        passed.to_string().green(),
        failed.to_string().red()
    );
}
