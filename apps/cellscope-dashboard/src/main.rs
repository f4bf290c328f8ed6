use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde_json::Value as JsonValue;
use std::thread;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "cellscope-dashboard",
    version,
    about = "Terminal watcher for the cycle-life study charts"
)]
struct Args {
    #[arg(long, env = "CELLSCOPE_BASE", default_value = "http://127.0.0.1:8097")]
    base: String,
    /// Also watch the raw per-cycle charts for this file (requires --cycle)
    #[arg(long)]
    file: Option<String>,
    #[arg(long)]
    cycle: Option<i64>,
    /// Poll interval in seconds
    #[arg(long, default_value_t = 30)]
    interval: u64,
    /// Print full chart JSON instead of one-line summaries
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Emit one round of summaries and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

const DERIVED_CHARTS: [&str; 3] = [
    "/charts/discharge-over-cycle",
    "/charts/voltage-delta",
    "/charts/curve-variance",
];

const TIME_SERIES_KINDS: [&str; 4] = ["current", "voltage", "discharge-capacity", "charge-capacity"];

fn fetch_json(client: &Client, base: &str, route: &str) -> Result<JsonValue> {
    let url = format!("{}{}", base.trim_end_matches('/'), route);
    let resp = client
        .get(&url)
        .header(ACCEPT, "application/json")
        .send()
        .with_context(|| format!("fetching {}", route))?;
    if !resp.status().is_success() {
        bail!("{} failed: {}", route, resp.status());
    }
    resp.json().with_context(|| format!("decoding {}", route))
}

/// One-line digest of a chart payload: row count plus the title the server
/// attached to it.
fn chart_summary(route: &str, chart: &JsonValue) -> String {
    let rows = chart
        .get("rows")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    let title = chart.get("title").and_then(|v| v.as_str()).unwrap_or("?");
    format!("{} rows={} \"{}\"", route, rows, title)
}

fn files_summary(snapshot: &JsonValue) -> String {
    let count = snapshot.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
    format!("/state/files count={}", count)
}

fn render(client: &Client, args: &Args, routes: &[String]) {
    let now = Local::now().format("%H:%M:%S");
    match fetch_json(client, &args.base, "/state/files") {
        Ok(snapshot) => println!("[{}] {}", now, files_summary(&snapshot)),
        Err(err) => eprintln!("[{}] /state/files error: {err:?}", now),
    }
    for route in routes {
        match fetch_json(client, &args.base, route) {
            Ok(chart) => {
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string(&chart).unwrap_or_else(|_| "{}".to_string())
                    );
                } else {
                    println!("[{}] {}", now, chart_summary(route, &chart));
                }
            }
            Err(err) => eprintln!("[{}] {} error: {err:?}", now, route),
        }
    }
}

fn watched_routes(args: &Args) -> Result<Vec<String>> {
    let mut routes: Vec<String> = DERIVED_CHARTS.iter().map(|r| r.to_string()).collect();
    match (&args.file, args.cycle) {
        (Some(file), Some(cycle)) => {
            for kind in TIME_SERIES_KINDS {
                routes.push(format!(
                    "/charts/time-series/{}?file={}&cycle={}",
                    kind, file, cycle
                ));
            }
        }
        (None, None) => {}
        _ => bail!("--file and --cycle must be given together"),
    }
    Ok(routes)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("client build")?;
    let routes = watched_routes(&args)?;
    render(&client, &args, &routes);
    if args.once {
        return Ok(());
    }
    loop {
        thread::sleep(Duration::from_secs(args.interval.max(1)));
        render(&client, &args, &routes);
    }
}
