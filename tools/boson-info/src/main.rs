//! Boson loader inspector.
//!
//! Builds a loader context the same way an application would (configuration
//! file, then environment overrides) and reports what it resolved: drivers
//! in policy order with their init status, and devices with their flat
//! identifiers. `order` runs the ordering engine on a made-up driver list.

mod cli;

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use boson_driver_api::Status;
use boson_loader::ordering::order_by_policy;
use boson_loader::{DriverView, LoaderBuilder, LoaderConfig, LoaderContext, ProcessEnv};
use clap::Parser;
use serde::Serialize;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        cli::Command::Drivers(ref args) => cmd_drivers(cli.config.as_deref(), args),
        cli::Command::Devices(ref args) => cmd_devices(cli.config.as_deref(), args),
        cli::Command::Order(ref args) => cmd_order(args),
    }
}

/// Loads the configuration, preferring an explicit file over `BOSON_LOADER_CONFIG`.
fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    let Some(path) = path else {
        return LoaderConfig::load(&ProcessEnv).context("loading loader configuration");
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut config = LoaderConfig::from_toml_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    config
        .apply_env(&ProcessEnv)
        .context("applying environment overrides")?;
    Ok(config)
}

fn build_context(path: Option<&Path>) -> Result<LoaderContext> {
    let config = load_config(path)?;
    log::debug!("effective configuration: {config:?}");
    Ok(LoaderBuilder::new(config).build())
}

fn status_error(status: Status, what: &str) -> anyhow::Error {
    anyhow::anyhow!("{what}: {} ({status})", status.description())
}

// ===========================================================================
// drivers
// ===========================================================================

#[derive(Serialize)]
struct DriverRow {
    index: u32,
    name: String,
    category: &'static str,
    source: String,
    status: String,
    selected: bool,
    devices: usize,
}

fn cmd_drivers(config: Option<&Path>, args: &cli::ListArgs) -> Result<()> {
    let ctx = build_context(config)?;
    let selected: Vec<_> = match ctx.init_drivers(args.device_type.flags()) {
        Ok(views) => views.into_iter().map(|v| v.index).collect(),
        Err(status) => {
            log::warn!("no driver selected: {}", status.description());
            Vec::new()
        }
    };
    let views = ctx
        .drivers()
        .map_err(|s| status_error(s, "listing drivers"))?;

    let rows: Vec<DriverRow> = views
        .iter()
        .map(|v: &DriverView| DriverRow {
            index: v.index.as_u32(),
            name: v.name.clone(),
            category: v.category.name(),
            source: v.source.to_string(),
            status: v.init_status.to_string(),
            selected: selected.contains(&v.index),
            devices: v.devices,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no drivers found");
        return Ok(());
    }
    println!(
        "{:>3}  {:<20} {:<15} {:<8} {:<26} SOURCE",
        "#", "NAME", "CATEGORY", "DEVICES", "STATUS"
    );
    for row in &rows {
        let marker = if row.selected { "*" } else { " " };
        println!(
            "{:>3}{marker} {:<20} {:<15} {:<8} {:<26} {}",
            row.index, row.name, row.category, row.devices, row.status, row.source
        );
    }
    Ok(())
}

// ===========================================================================
// devices
// ===========================================================================

#[derive(Serialize)]
struct DeviceRow {
    id: u32,
    driver: String,
    name: String,
    vendor_id: u32,
    device_id: u32,
}

fn cmd_devices(config: Option<&Path>, args: &cli::ListArgs) -> Result<()> {
    let ctx = build_context(config)?;
    ctx.init_drivers(args.device_type.flags())
        .map_err(|s| status_error(s, "initializing drivers"))?;
    let registry = ctx
        .registry()
        .map_err(|s| status_error(s, "reading registry"))?;
    let core = ctx.core().map_err(|s| status_error(s, "core layer"))?;

    let mut rows = Vec::new();
    for device in core
        .device_get()
        .map_err(|s| status_error(s, "enumerating devices"))?
    {
        let id = ctx.device_id(device);
        let driver = registry
            .devices()
            .driver_of(device)
            .and_then(|index| registry.record(index))
            .map(|record| record.name().to_string())
            .unwrap_or_default();
        match core.device_get_properties(device) {
            Ok(props) => rows.push(DeviceRow {
                id: id.as_u32(),
                driver,
                name: props.name,
                vendor_id: props.vendor_id,
                device_id: props.device_id,
            }),
            Err(status) => log::warn!("device {id}: {}", status.description()),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    println!("{:>4}  {:<20} {:<32} VENDOR:DEVICE", "ID", "DRIVER", "NAME");
    for row in &rows {
        println!(
            "{:>4}  {:<20} {:<32} {:04x}:{:04x}",
            row.id, row.driver, row.name, row.vendor_id, row.device_id
        );
    }
    Ok(())
}

// ===========================================================================
// order
// ===========================================================================

fn cmd_order(args: &cli::OrderArgs) -> Result<()> {
    if args.drivers.is_empty() {
        bail!("no drivers given");
    }
    let ordered = order_by_policy(args.drivers.clone(), &args.policy, |d| d.1);
    for (position, (name, category)) in ordered.iter().enumerate() {
        println!("{position:>3}  {name:<20} {}", category.name());
    }
    Ok(())
}
