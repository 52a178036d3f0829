//! Command-line interface definitions for boson-info.

use std::path::PathBuf;

use boson_driver_api::{DriverCategory, InitFlags};
use clap::{Parser, Subcommand, ValueEnum};

/// Inspect what the Boson loader resolves on this machine.
#[derive(Parser)]
#[command(name = "boson-info", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Loader configuration file (overrides `BOSON_LOADER_CONFIG`).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Show only errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log loader decisions (repeat for more detail).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// List discovered drivers in resolved order.
    Drivers(ListArgs),
    /// List devices with their flat identifiers.
    Devices(ListArgs),
    /// Show how a policy orders a hypothetical driver list.
    Order(OrderArgs),
}

/// Device types to initialize.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum DeviceType {
    /// Every supported type.
    #[default]
    All,
    /// GPU drivers.
    Gpu,
    /// NPU drivers.
    Npu,
}

impl DeviceType {
    /// The matching initialization flags.
    pub fn flags(self) -> InitFlags {
        match self {
            Self::All => InitFlags::empty(),
            Self::Gpu => InitFlags::GPU_ONLY,
            Self::Npu => InitFlags::NPU_ONLY,
        }
    }
}

/// Arguments for `drivers` and `devices`.
#[derive(Parser)]
pub struct ListArgs {
    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Device types to initialize.
    #[arg(long = "type", short = 't', value_enum, default_value_t)]
    pub device_type: DeviceType,
}

/// Arguments for the `order` subcommand.
#[derive(Parser)]
pub struct OrderArgs {
    /// Ordering policy, e.g. `NPU,DISCRETE_GPU_ONLY:1,0`.
    #[arg(long, short = 'p')]
    pub policy: String,

    /// Drivers in discovery order, as `NAME:CATEGORY`.
    #[arg(required = true, value_parser = parse_driver_arg)]
    pub drivers: Vec<(String, DriverCategory)>,
}

fn parse_driver_arg(s: &str) -> Result<(String, DriverCategory), String> {
    let (name, category) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:CATEGORY, got {s:?}"))?;
    if name.is_empty() {
        return Err(format!("empty driver name in {s:?}"));
    }
    let category = category.parse().map_err(|e| format!("{e}"))?;
    Ok((name.to_string(), category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_arg_parsing() {
        assert_eq!(
            parse_driver_arg("disc0:discrete_gpu").unwrap(),
            ("disc0".to_string(), DriverCategory::DiscreteGpu)
        );
        assert!(parse_driver_arg("nocategory").is_err());
        assert!(parse_driver_arg(":GPU").is_err());
        assert!(parse_driver_arg("x:TPU").is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn order_arguments() {
        let cli = Cli::parse_from(["boson-info", "order", "-p", "NPU", "a:GPU", "b:NPU"]);
        let Command::Order(args) = cli.command else {
            panic!("expected order");
        };
        assert_eq!(args.policy, "NPU");
        assert_eq!(args.drivers.len(), 2);
    }
}
