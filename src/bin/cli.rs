//! Sensorhub CLI
//!
//! Command-line client for a running sensorhub:
//! - Inspect nodes and their history
//! - Send commands to nodes
//! - Act as a device (push readings, simulate sensor nodes)
//! - Print a default config file

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

use sensorhub::api::dto::{encode_senml, SenmlRecord, SenmlScalar, SenmlValue};
use sensorhub::telemetry::{Reading, ReadingBatch, Value};

#[derive(Parser)]
#[command(name = "sensorhub-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and drive a sensorhub collector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sensorhub server URL
    #[arg(long, default_value = "http://[::1]:12345", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List known nodes with their liveness
    Nodes,

    /// Show one node and its channel history
    Node {
        /// Node id (SenML base name)
        id: String,
        /// Samples shown per channel
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Send a command to a node endpoint
    Send {
        /// Node address, or node id with --node
        target: String,
        /// Endpoint on the node (e.g. a:rgb)
        ep: String,
        /// Payload
        val: String,
        /// Treat the target as a node id
        #[arg(long)]
        node: bool,
    },

    /// Push one SenML pack as if sent by a node
    Push {
        /// Base name (node id)
        base_name: String,
        /// Readings as key=value[:unit], vectors as key=1,2,3[:unit]
        #[arg(required = true)]
        readings: Vec<String>,
    },

    /// Simulate sensor nodes sending periodic random readings
    Simulate {
        /// Only simulate this node (a built-in preset or a new temp/hum node)
        base_name: Option<String>,
        /// Send interval in ms (default: per-node preset)
        #[arg(short, long)]
        interval_ms: Option<u64>,
        /// Packs per node, 0 runs forever
        #[arg(short, long, default_value = "0")]
        count: u64,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Nodes => {
            let snapshot: serde_json::Value =
                fetch_json(&client, &format!("{}/api/v1/nodes", cli.api_url)).await?;
            let liveness: serde_json::Value =
                fetch_json(&client, &format!("{}/api/v1/liveness", cli.api_url)).await?;

            if cli.format == "json" {
                let combined = serde_json::json!({ "nodes": snapshot["nodes"], "liveness": liveness });
                println!("{}", serde_json::to_string_pretty(&combined)?);
                return Ok(());
            }

            let nodes = match snapshot["nodes"].as_object() {
                Some(nodes) if !nodes.is_empty() => nodes,
                _ => {
                    println!("No nodes known yet.");
                    println!();
                    println!("Push a reading with:");
                    println!("  sensorhub-cli push urn:dev:test s:temp=21.5:Cel");
                    return Ok(());
                }
            };

            let stale: Vec<&str> = liveness["stale"]
                .as_array()
                .map(|ids| ids.iter().filter_map(|id| id.as_str()).collect())
                .unwrap_or_default();

            println!(
                "{:<32} {:<26} {:<7} {:<9} {}",
                "Node", "Address", "State", "Channels", "Last seen"
            );
            println!("{}", "-".repeat(95));

            for (id, node) in nodes {
                let state = if stale.contains(&id.as_str()) { "stale" } else { "active" };
                let channels = node["channels"].as_object().map(|c| c.len()).unwrap_or(0);
                println!(
                    "{:<32} {:<26} {:<7} {:<9} {}",
                    id,
                    node["address"].as_str().unwrap_or("-"),
                    state,
                    channels,
                    format_timestamp(node["last_seen_at"].as_i64())
                );
            }
        }

        Commands::Node { id, limit } => {
            let response = client
                .get(node_url(&cli.api_url, &id))
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                eprintln!("Unknown node: {}", id);
                std::process::exit(1);
            }
            let node: serde_json::Value = response.error_for_status()?.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&node)?);
                return Ok(());
            }

            println!("Node:      {}", id);
            println!("Address:   {}", node["address"].as_str().unwrap_or("-"));
            println!("First seen: {}", format_timestamp(node["first_seen_at"].as_i64()));
            println!("Last seen:  {}", format_timestamp(node["last_seen_at"].as_i64()));
            if let Some(caps) = node["capabilities"].as_array() {
                let caps: Vec<&str> = caps.iter().filter_map(|c| c.as_str()).collect();
                println!("Has:       {}", caps.join(", "));
            }

            if let Some(channels) = node["channels"].as_object() {
                for (key, channel) in channels {
                    println!();
                    println!("{} [{}]", key, channel["unit"].as_str().unwrap_or(""));
                    let samples = channel["samples"].as_array().cloned().unwrap_or_default();
                    for sample in samples.iter().take(limit) {
                        println!(
                            "  {}  {}",
                            format_timestamp(sample["timestamp"].as_i64()),
                            sample["value"]
                        );
                    }
                    if samples.len() > limit {
                        println!("  ... {} more", samples.len() - limit);
                    }
                }
            }
        }

        Commands::Send {
            target,
            ep,
            val,
            node,
        } => {
            let body = if node {
                serde_json::json!({ "node": target, "ep": ep, "val": val })
            } else {
                serde_json::json!({ "addr": target, "ep": ep, "val": val })
            };

            let response = client
                .post(format!("{}/api/v1/commands", cli.api_url))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!(
                    "Queued {} -> [{}] {}",
                    val,
                    result["addr"].as_str().unwrap_or("?"),
                    result["ep"].as_str().unwrap_or("?")
                );
            } else {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                eprintln!("Send failed ({}): {}", status, text);
                std::process::exit(1);
            }
        }

        Commands::Push {
            base_name,
            readings,
        } => {
            let mut batch = ReadingBatch::new(base_name, "");
            for arg in &readings {
                batch.readings.push(parse_reading(arg)?);
            }

            let pack = encode_senml(&batch);
            let status = post_pack(&client, &cli.api_url, &pack).await?;
            if status == reqwest::StatusCode::NO_CONTENT {
                println!("{}: [ok]", batch.node_id);
            } else {
                eprintln!("{}: [fail] {}", batch.node_id, status);
                std::process::exit(1);
            }
        }

        Commands::Simulate {
            base_name,
            interval_ms,
            count,
        } => {
            let nodes = simulated_nodes(base_name.as_deref());
            println!("Simulating {} node(s) against {}", nodes.len(), cli.api_url);

            let runs = nodes.into_iter().map(|mut node| {
                let client = client.clone();
                let api_url = cli.api_url.clone();
                let period = Duration::from_millis(interval_ms.unwrap_or(node.interval_ms).max(1));

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    let mut sent = 0;
                    while count == 0 || sent < count {
                        ticker.tick().await;
                        let pack = node.next_pack();
                        let outcome = match post_pack(&client, &api_url, &pack).await {
                            Ok(reqwest::StatusCode::NO_CONTENT) => "[ok]".to_string(),
                            Ok(status) => format!("[fail] {}", status),
                            Err(e) => format!("[fail] {}", e),
                        };
                        println!("{}: {}", node.base_name, outcome);
                        sent += 1;
                    }
                })
            });

            join_all(runs).await;
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                        return Ok(());
                    }

                    println!(
                        "Sensorhub v{}",
                        health["version"].as_str().unwrap_or(env!("CARGO_PKG_VERSION"))
                    );
                    println!();
                    println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!();
                    println!("Nodes:");
                    println!("  Known:  {}", health["nodes"].as_u64().unwrap_or(0));
                    println!("  Active: {}", health["active"].as_u64().unwrap_or(0));
                    println!("  Stale:  {}", health["stale"].as_u64().unwrap_or(0));
                    println!("Viewers: {}", health["viewers"].as_u64().unwrap_or(0));

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("Server returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to sensorhub at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin sensorhub");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = sensorhub::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(format!("{} returned {}", url, response.status()).into());
    }
    Ok(response.json().await?)
}

async fn post_pack(
    client: &reqwest::Client,
    api_url: &str,
    pack: &[SenmlRecord],
) -> Result<reqwest::StatusCode, reqwest::Error> {
    let response = client
        .post(format!("{}/senml", api_url))
        .json(pack)
        .send()
        .await?;
    Ok(response.status())
}

/// URL of one node on the query API; the id is a single path segment
fn node_url(api_url: &str, id: &str) -> String {
    format!("{}/api/v1/nodes/{}", api_url, urlencoding::encode(id))
}

/// Parse `key=value[:unit]`, where value is a number or a comma list
fn parse_reading(arg: &str) -> Result<Reading, Box<dyn std::error::Error>> {
    let (key, rest) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid reading '{}'. Use: key=value[:unit]", arg))?;
    let (value, unit) = rest.split_once(':').unwrap_or((rest, ""));

    let numbers = value
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("Invalid value in '{}'", arg))?;

    let value = match numbers.as_slice() {
        [single] if !value.contains(',') => Value::Scalar(*single),
        _ => Value::Vector(numbers),
    };
    Ok(Reading::new(key, unit, value))
}

/// One simulated channel: bounds, smoothing state and print precision
struct SimChannel {
    key: &'static str,
    unit: &'static str,
    min: f64,
    max: f64,
    decimals: usize,
    last: Vec<f64>,
}

struct SimNode {
    base_name: String,
    interval_ms: u64,
    channels: Vec<SimChannel>,
}

impl SimNode {
    /// Next pack: each value moves a quarter of the way toward a random
    /// target and is sent as fixed-precision text
    fn next_pack(&mut self) -> Vec<SenmlRecord> {
        let mut rng = rand::thread_rng();
        let mut pack = vec![SenmlRecord {
            bn: Some(self.base_name.clone()),
            ..Default::default()
        }];

        for channel in &mut self.channels {
            let values: Vec<f64> = channel
                .last
                .iter()
                .map(|last| {
                    let target = rng.gen_range(channel.min..=channel.max);
                    (3.0 * last + target) / 4.0
                })
                .collect();

            let texts: Vec<SenmlScalar> = values
                .iter()
                .map(|v| SenmlScalar::Text(format!("{:.*}", channel.decimals, v)))
                .collect();
            let v = match texts.as_slice() {
                [single] => SenmlValue::One(single.clone()),
                _ => SenmlValue::Many(texts),
            };

            channel.last = values;
            pack.push(SenmlRecord {
                bn: None,
                n: Some(channel.key.to_string()),
                u: Some(channel.unit.to_string()),
                v: Some(v),
            });
        }
        pack
    }
}

fn channel(
    key: &'static str,
    unit: &'static str,
    min: f64,
    max: f64,
    decimals: usize,
    dims: usize,
) -> SimChannel {
    SimChannel {
        key,
        unit,
        min,
        max,
        decimals,
        last: vec![min; dims],
    }
}

fn climate_node(base_name: &str, interval_ms: u64) -> SimNode {
    SimNode {
        base_name: base_name.to_string(),
        interval_ms,
        channels: vec![
            channel("s:temp", "Cel", 0.0, 35.0, 2, 1),
            channel("s:hum", "%RH", 25.0, 75.0, 2, 1),
        ],
    }
}

fn simulated_nodes(only: Option<&str>) -> Vec<SimNode> {
    let presets = vec![
        climate_node("urn:dev:mac:0103fa34d4e5", 1500),
        climate_node("urn:dev:mac:affe08155508", 500),
        SimNode {
            base_name: "urn:dev:mac:3308ae84fea4".to_string(),
            interval_ms: 1000,
            channels: vec![channel("s:light", "lm", 80.0, 1500.0, 0, 1)],
        },
        SimNode {
            base_name: "urn:dev:mac:aed80806cc34".to_string(),
            interval_ms: 100,
            channels: vec![
                channel("s:acc", "g", 0.0, 6.0, 3, 3),
                channel("s:mag", "Gs", 0.0, 30.0, 3, 3),
                channel("s:gyro", "dps", 0.0, 2500.0, 0, 3),
            ],
        },
        SimNode {
            base_name: "urn:dev:mac:fe80beeb1234".to_string(),
            interval_ms: 3000,
            channels: vec![channel("a:rgb", "rgb", 0.0, 255.0, 0, 3)],
        },
    ];

    match only {
        None => presets,
        Some(name) => {
            let matching: Vec<SimNode> = presets
                .into_iter()
                .filter(|node| node.base_name == name)
                .collect();
            if matching.is_empty() {
                vec![climate_node(name, 1000)]
            } else {
                matching
            }
        }
    }
}

fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_reading() {
        let reading = parse_reading("s:temp=21.5:Cel").unwrap();
        assert_eq!(reading.channel, "s:temp");
        assert_eq!(reading.unit, "Cel");
        assert_eq!(reading.value, Value::Scalar(21.5));
    }

    #[test]
    fn test_parse_vector_reading_without_unit() {
        let reading = parse_reading("s:acc=0,0.5,1").unwrap();
        assert_eq!(reading.unit, "");
        assert_eq!(reading.value, Value::Vector(vec![0.0, 0.5, 1.0]));
    }

    #[test]
    fn test_parse_reading_errors() {
        assert!(parse_reading("s:temp").is_err());
        assert!(parse_reading("s:temp=warm:Cel").is_err());
    }

    #[test]
    fn test_simulated_pack_shape() {
        let mut nodes = simulated_nodes(Some("urn:dev:mac:aed80806cc34"));
        assert_eq!(nodes.len(), 1);

        let pack = nodes[0].next_pack();
        assert_eq!(pack[0].bn.as_deref(), Some("urn:dev:mac:aed80806cc34"));
        assert_eq!(pack.len(), 4);
        assert!(matches!(&pack[1].v, Some(SenmlValue::Many(values)) if values.len() == 3));

        // Decodes like a real device pack
        let body = serde_json::to_vec(&pack).unwrap();
        let batch = sensorhub::api::dto::decode_senml(&body, "fd00::1").unwrap();
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn test_unknown_base_name_gets_climate_node() {
        let nodes = simulated_nodes(Some("urn:dev:test"));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].channels.len(), 2);
    }

    #[test]
    fn test_node_url_encodes_id() {
        assert_eq!(
            node_url("http://[::1]:12345", "urn:dev:mac:0103"),
            "http://[::1]:12345/api/v1/nodes/urn%3Adev%3Amac%3A0103"
        );
        assert_eq!(
            node_url("http://[::1]:12345", "lab/desk?1#a"),
            "http://[::1]:12345/api/v1/nodes/lab%2Fdesk%3F1%23a"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(3_700), "1h 1m");
    }
}
