use clap::{Parser, Subcommand, ValueEnum};
use common::{Grade, Variety};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coffeex")]
#[command(about = "CoffeeX - coffee market price aggregation and alerting")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the fetch worker until Ctrl+C
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config/market.yaml")]
        config: PathBuf,
    },

    /// Run a single fetch cycle and print prices and market conditions
    Fetch {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config/market.yaml")]
        config: PathBuf,

        /// Also push the fetched prices to the ledger
        #[arg(long)]
        sync: bool,
    },

    /// Check a proposed price against the current market
    CheckPrice {
        #[arg(short, long, value_enum)]
        variety: VarietyArg,

        #[arg(short, long, default_value_t = 1)]
        grade: u8,

        /// Proposed price in USD/kg
        #[arg(short, long, allow_negative_numbers = true)]
        price: f64,

        /// Path to the configuration file
        #[arg(short, long, default_value = "config/market.yaml")]
        config: PathBuf,
    },

    /// Validate configuration without fetching anything
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config/market.yaml")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "config/market.yaml")]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarietyArg {
    Arabica,
    Robusta,
    Specialty,
    Organic,
}

impl From<VarietyArg> for Variety {
    fn from(arg: VarietyArg) -> Self {
        match arg {
            VarietyArg::Arabica => Variety::Arabica,
            VarietyArg::Robusta => Variety::Robusta,
            VarietyArg::Specialty => Variety::Specialty,
            VarietyArg::Organic => Variety::Organic,
        }
    }
}

impl Commands {
    /// Grade argument of `check-price`
    pub fn grade(&self) -> Option<Grade> {
        match self {
            Commands::CheckPrice { grade, .. } => Some(Grade::new(*grade)),
            _ => None,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
