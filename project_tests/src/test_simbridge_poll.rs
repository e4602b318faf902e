use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Parser;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Polls a running SimBridge and reports snapshot freshness", long_about = None)]
struct Args {
    /// Bridge URL
    #[clap(short, long, default_value = "http://127.0.0.1:5000/")]
    url: String,

    /// Number of polls, 0 polls forever
    #[clap(short, long, default_value_t = 10)]
    count: u64,

    /// Delay between polls in milliseconds
    #[clap(short, long, default_value_t = 1000)]
    interval_ms: u64,
}

#[derive(Default)]
struct Tally {
    polls: u64,
    empty: u64,
    failed: u64,
    changed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let mut tally = Tally::default();
    let mut previous: Option<Value> = None;

    while args.count == 0 || tally.polls < args.count {
        tally.polls += 1;

        match poll_once(&client, &args.url).await {
            Ok(body) => {
                match body.get("timestamp").and_then(Value::as_str) {
                    Some(stamp) => {
                        let age = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
                            .map(|t| Utc::now().naive_utc() - t)
                            .map(|d| d.num_milliseconds())
                            .unwrap_or(-1);
                        println!(
                            "#{} {} lat={} lon={} alt={} (render age {} ms)",
                            tally.polls,
                            body["Title"],
                            body["PlaneLatitude"],
                            body["PlaneLongitude"],
                            body["PlaneAltitude"],
                            age
                        );
                    }
                    None => {
                        tally.empty += 1;
                        println!("#{} no snapshot yet: {}", tally.polls, body);
                    }
                }

                let mut fields = body.clone();
                if let Some(map) = fields.as_object_mut() {
                    map.remove("timestamp");
                }
                if previous.as_ref().is_some_and(|p| *p != fields) {
                    tally.changed += 1;
                }
                previous = Some(fields);
            }
            Err(e) => {
                tally.failed += 1;
                eprintln!("#{} request failed: {:#}", tally.polls, e);
            }
        }

        sleep(Duration::from_millis(args.interval_ms)).await;
    }

    println!(
        "polls={} empty={} failed={} changed={}",
        tally.polls, tally.empty, tally.failed, tally.changed
    );
    Ok(())
}

async fn poll_once(client: &reqwest::Client, url: &str) -> Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.json::<Value>().await?;
    Ok(body)
}
