//! Topology Loader Main Entry Point
//!
//! Imports a device CSV and a relationship CSV into the configured graph
//! store, or answers a related-node query against it.

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use tracing::{error, info};

use topology_graph_store::Direction;
use topology_loader::retrieval::{DEFAULT_LEVELS, DEFAULT_LIMIT};
use topology_loader::telemetry::init_tracing;
use topology_loader::{
    LoaderConfig, LoaderOrchestrator, NeighborRetriever, RelationSpec, RowSource, StoreConfig,
};

fn usage(program: &str) {
    error!("Usage: {} <device_csv> <relationship_csv>", program);
    error!(
        "       {} related <asset_id> [incoming|outgoing|both] [levels] [limit] \
         [--type TYPE]... [--relation TYPE[:levels[:direction]]]...",
        program
    );
    error!("Example: {} data/devices.csv data/relationships.csv", program);
}

async fn import(device_csv: &str, relationship_csv: &str) -> Result<ExitCode> {
    let loader_config = LoaderConfig::from_env().context("Invalid loader configuration")?;
    let store_config = StoreConfig::from_env().context("Invalid store configuration")?;

    let mut orchestrator = LoaderOrchestrator::new(store_config.connector(), loader_config)?;

    let cancel = orchestrator.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping at the next batch boundary");
            cancel.cancel();
        }
    });

    let result = orchestrator
        .run(RowSource::csv(device_csv), RowSource::csv(relationship_csv))
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn related(args: &[String]) -> Result<ExitCode> {
    let mut positional = Vec::new();
    let mut types = Vec::new();
    let mut relations: Vec<RelationSpec> = Vec::new();
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--type" => {
                let Some(value) = rest.next() else {
                    bail!("--type requires a relationship type");
                };
                types.push(value.trim().to_string());
            }
            "--relation" => {
                let Some(value) = rest.next() else {
                    bail!("--relation requires TYPE[:levels[:direction]]");
                };
                relations.push(value.parse()?);
            }
            _ => positional.push(arg),
        }
    }

    let Some(asset_id) = positional.first() else {
        bail!("related requires an asset id");
    };
    let loader_config = LoaderConfig::from_env().context("Invalid loader configuration")?;
    let store_config = StoreConfig::from_env().context("Invalid store configuration")?;
    let retriever = NeighborRetriever::new(store_config.connector(), loader_config.node_label);

    let limit = match positional.get(3) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("limit must be a positive integer, got {}", raw))?,
        None => DEFAULT_LIMIT,
    };

    let nodes = if relations.is_empty() {
        let mut query = retriever.query(asset_id.as_str());
        query.direction = positional
            .get(1)
            .map(|d| Direction::parse_lenient(d))
            .unwrap_or_default();
        query.max_depth = match positional.get(2) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("levels must be a positive integer, got {}", raw))?,
            None => DEFAULT_LEVELS,
        };
        query.relationship_types = types;
        query.limit = limit;
        retriever.related(&query).await?
    } else {
        retriever
            .related_by_relations(asset_id.as_str(), &relations, limit)
            .await?
    };

    println!("{}", serde_json::to_string_pretty(&nodes)?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("topology-loader");

    match args.get(1).map(String::as_str) {
        Some("related") => related(&args[2..]).await,
        Some(device_csv) if args.len() == 3 => import(device_csv, &args[2]).await,
        _ => {
            usage(program);
            Ok(ExitCode::from(2))
        }
    }
}
