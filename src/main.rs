// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments and load settings (.env / environment)
// 2. Gather identifiers from --file, arguments and piped stdin
// 3. Hand them to the engine as one batch, with Ctrl-C wired to cancel it
// 4. Print progress while it runs, then a table (or JSON) of results
// 5. Exit with proper code (0 = all available, 1 = some not, 2 = error)
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use cli::{CheckArgs, Cli};
use nameprobe::config::Settings;
use nameprobe::engine::{Batch, CancelToken, Dispatcher, RateLimiter, RetryPolicy, Service};
use nameprobe::outcome::{CheckOutcome, Progress, ResultAggregate, Verdict};
use nameprobe::{input, telemetry};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = every identifier is available
//   Ok(1) = at least one identifier is taken, invalid or unknown
//   Ok(2) = nothing to check
//   Err   = configuration or runtime error
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let settings = Settings::load().context("failed to load configuration")?;
    telemetry::init(&settings.log_level)?;

    let kind = cli.command.kind();
    let args = cli.command.args();

    let identifiers = gather_identifiers(args)?;
    if identifiers.is_empty() {
        eprintln!("error: no identifiers provided");
        eprintln!("usage: nameprobe <github|repo|domain> [OPTIONS] [NAMES...]");
        return Ok(2);
    }

    if kind.service() == Service::GitHub && !settings.is_authenticated() {
        info!("GITHUB_TOKEN not set, using the anonymous limit of 60 requests per hour");
    }

    let checker = kind
        .build(&settings)
        .with_context(|| format!("failed to set up the {kind} checker"))?;
    let limiter = Arc::new(RateLimiter::for_services(settings.is_authenticated()));

    // First Ctrl-C stops new lookups and reports what finished,
    // a second one quits on the spot
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if wait_for_force_quit(tokio::signal::ctrl_c, on_interrupt).await {
            eprintln!("\n🛑 Interrupted again, exiting");
            std::process::exit(130);
        }
    });

    let total = identifiers.len();
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(progress_rx, total, args.quiet));

    let dispatcher = Dispatcher::new(checker, limiter)
        .with_policy(RetryPolicy::default().with_max_attempts(args.max_attempts))
        .with_options(args.dispatch_options())
        .with_progress(progress_tx)
        .with_cancel(cancel);

    if !args.quiet {
        eprintln!("🔍 Checking {} {} name(s)...", total, kind);
    }

    let started = Instant::now();
    let batch = Batch::new(identifiers).with_context(cli.command.context());
    let results = dispatcher.run(&batch).await?;

    // Dropping the dispatcher closes the progress channel
    drop(dispatcher);
    reporter.await.ok();

    print_results(&results, args, started.elapsed())?;

    Ok(if results.all_available() { 0 } else { 1 })
}

// Cancels the batch on the first interrupt and returns true on the second.
// Returns false if the signal handler can't be installed.
async fn wait_for_force_quit<F, Fut>(mut interrupt: F, cancel: CancelToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut interrupts = 0;
    while interrupt().await.is_ok() {
        interrupts += 1;
        if interrupts > 1 {
            return true;
        }
        eprintln!("\n⚠️  Interrupted, reporting partial results (Ctrl-C again to quit)...");
        cancel.cancel();
    }
    false
}

// Merges --file, positional names and piped stdin (in that order)
fn gather_identifiers(args: &CheckArgs) -> Result<Vec<String>> {
    let mut sources = Vec::new();

    if let Some(path) = &args.file {
        sources.push(input::read_file(path)?);
    }

    sources.push(args.names.iter().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()).collect());

    if !io::stdin().is_terminal() {
        sources.push(input::read_lines(io::stdin().lock())?);
    }

    Ok(input::merge(sources))
}

// Prints one line per finished identifier to stderr
async fn report_progress(mut rx: mpsc::UnboundedReceiver<Progress>, total: usize, quiet: bool) {
    let mut done = 0;
    while let Some(event) = rx.recv().await {
        done += 1;
        if !quiet {
            eprintln!(
                "   [{}/{}] {}: {} ({} attempt{})",
                done,
                total,
                event.identifier,
                event.verdict,
                event.attempts,
                if event.attempts == 1 { "" } else { "s" }
            );
        }
    }
}

fn print_results(results: &ResultAggregate, args: &CheckArgs, elapsed: Duration) -> Result<()> {
    let shown: Vec<&CheckOutcome> = results
        .iter()
        .filter(|o| !args.available_only || o.is_available())
        .collect();

    if args.json {
        let json_output = serde_json::to_string_pretty(&shown)?;
        println!("{}", json_output);
    } else {
        print_table(&shown);
        print_summary(results, elapsed);
    }
    Ok(())
}

// Prints results as a human-readable table in the terminal
fn print_table(results: &[&CheckOutcome]) {
    println!();
    println!("{:<40} {:<15} {:<9} {:<40}", "NAME", "STATUS", "ATTEMPTS", "DETAILS");
    println!("{}", "=".repeat(104));

    for outcome in results {
        let details = outcome
            .diagnostic
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        // Truncate long names so the columns stay aligned
        let name_display = if outcome.identifier.chars().count() > 37 {
            format!("{}...", outcome.identifier.chars().take(37).collect::<String>())
        } else {
            outcome.identifier.clone()
        };

        println!(
            "{:<40} {:<15} {:<9} {:<40}",
            name_display,
            format_verdict(outcome.verdict),
            outcome.attempts,
            details
        );
    }

    println!();
}

fn print_summary(results: &ResultAggregate, elapsed: Duration) {
    println!("📊 Summary (completed in {:.2}s):", elapsed.as_secs_f64());
    println!("   ✅ Available: {}", results.count(Verdict::Available));
    println!("   ❌ Taken: {}", results.count(Verdict::Taken));
    println!("   🚫 Invalid: {}", results.count(Verdict::Invalid));
    println!("   ⚠️  Unknown: {}", results.count(Verdict::Unknown));
    println!("   📋 Total: {}", results.len());
}

fn format_verdict(verdict: Verdict) -> String {
    match verdict {
        Verdict::Available => "✅ AVAILABLE".to_string(),
        Verdict::Taken => "❌ TAKEN".to_string(),
        Verdict::Invalid => "🚫 INVALID".to_string(),
        Verdict::Unknown => "⚠️  UNKNOWN".to_string(),
    }
}
