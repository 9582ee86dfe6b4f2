use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;
use tracing::{error, info};

use crate::indexer::IngestionReport;
use crate::pipeline::Pipeline;

const EXIT_COMMAND: &str = "exit";

/// Ingest the wiki page `root_id` and its children
#[inline]
pub async fn init_collection(pipeline: &Pipeline, root_id: &str) -> Result<()> {
    info!("Initializing collection '{}' from page {}", pipeline.collection(), root_id);

    let spinner = spinner(format!("Indexing page {} and its children", root_id));
    let result = pipeline.init(root_id).await;
    spinner.finish_and_clear();

    let report = result.with_context(|| format!("Failed to ingest page {}", root_id))?;
    print_report(&report);
    Ok(())
}

/// Print the answer to a single question
#[inline]
pub async fn answer_question(pipeline: &Pipeline, question: &str) -> Result<()> {
    let spinner = spinner("Thinking".to_string());
    let result = pipeline.query(question).await;
    spinner.finish_and_clear();

    println!("{}", result.context("Failed to answer question")?);
    Ok(())
}

/// Print the event frames of a streamed answer as they arrive
#[inline]
pub async fn stream_answer(pipeline: &Pipeline, question: &str) -> Result<()> {
    let mut events = pipeline.stream_query(question);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        stdout
            .write_all(event.to_frame().as_bytes())
            .context("Failed to write event")?;
        stdout.flush().context("Failed to flush stdout")?;
    }
    Ok(())
}

/// Ask questions until the user types `exit`
#[inline]
pub async fn chat_loop(pipeline: &Pipeline) -> Result<()> {
    eprintln!("{}", style("💬 Operations assistant").bold().cyan());
    eprintln!("Type '{}' to quit.", EXIT_COMMAND);
    eprintln!();

    loop {
        let question: String = Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match pipeline.query(question).await {
            Ok(answer) => {
                println!("{}", style("Answer:").bold().green());
                println!("{}", answer);
            }
            Err(e) => {
                error!("Query failed: {}", e);
                eprintln!("{} {}", style("Error:").bold().red(), e);
            }
        }
        println!();
    }

    Ok(())
}

/// Show the collection size and whether queries can be answered
#[inline]
pub async fn show_status(pipeline: &Pipeline) -> Result<()> {
    let count = pipeline
        .document_count()
        .await
        .context("Failed to count documents")?;

    println!("{}", style("📊 ops-rag status").bold().cyan());
    println!("  Collection: {}", style(pipeline.collection()).cyan());
    println!("  Documents: {}", style(count).cyan());
    if pipeline.is_ready() {
        println!("  State: {}", style("ready").green());
    } else {
        println!("  State: {}", style("not initialized").yellow());
        println!("  Use 'ops-rag init <page-id>' to index documentation.");
    }
    Ok(())
}

fn print_report(report: &IngestionReport) {
    println!(
        "{} page {}",
        style("✓ Ingested").bold().green(),
        report.root_id
    );
    println!("  Added: {}", report.added);
    println!("  Already indexed: {}", report.skipped);
    if !report.failed.is_empty() {
        println!("  {}: {}", style("Failed").red(), report.failed.len());
        for failure in &report.failed {
            println!("    {} ({}): {}", failure.id, failure.title, failure.error);
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(template);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
