//! Server configuration: command line arguments and the plain config struct
//! the library consumes.

use crate::level::LevelLayout;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the kitchen server binary.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,

    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "30")]
    pub tick_rate: u32,

    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "8")]
    pub max_clients: usize,

    /// Seconds without any frame before a client is dropped
    #[clap(long, default_value = "5")]
    pub client_timeout: u64,

    /// Level layout JSON file; the built-in kitchen is used when omitted
    #[clap(short, long)]
    pub level: Option<PathBuf>,

    /// Seconds between new orders at each window
    #[clap(long, default_value = "15.0")]
    pub order_interval: f32,

    /// Seconds a customer waits before an order expires
    #[clap(long, default_value = "60.0")]
    pub order_time_limit: f32,

    /// Maximum concurrent orders per window
    #[clap(long, default_value = "3")]
    pub max_orders: u32,

    /// Seed for order generation
    #[clap(long)]
    pub seed: Option<u64>,

    /// Accept client-computed `move` positions instead of recomputing movement
    #[clap(long)]
    pub trust_client_positions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderConfig {
    pub spawn_interval: f32,
    pub time_limit: f32,
    pub max_concurrent: u32,
    pub max_required: u32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            spawn_interval: 15.0,
            time_limit: 60.0,
            max_concurrent: 3,
            max_required: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub trust_client_positions: bool,
    pub orders: OrderConfig,
    pub seed: Option<u64>,
    pub level: LevelLayout,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_secs_f32(1.0 / 30.0),
            max_clients: 8,
            client_timeout: Duration::from_secs(5),
            trust_client_positions: false,
            orders: OrderConfig::default(),
            seed: None,
            level: LevelLayout::default_kitchen(),
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error>> {
        if args.tick_rate == 0 {
            return Err("tick rate must be positive".into());
        }

        let level = match &args.level {
            Some(path) => LevelLayout::load(path)?,
            None => LevelLayout::default_kitchen(),
        };

        Ok(Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate as f32),
            max_clients: args.max_clients,
            client_timeout: Duration::from_secs(args.client_timeout),
            trust_client_positions: args.trust_client_positions,
            orders: OrderConfig {
                spawn_interval: args.order_interval,
                time_limit: args.order_time_limit,
                max_concurrent: args.max_orders,
                ..OrderConfig::default()
            },
            seed: args.seed,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_produce_default_config() {
        let args = Args::parse_from(["server"]);
        let config = ServerConfig::from_args(&args).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_clients, 8);
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert!(!config.trust_client_positions);
        assert_eq!(config.orders, OrderConfig::default());
    }

    #[test]
    fn test_flags_are_applied() {
        let args = Args::parse_from([
            "server",
            "--port",
            "9000",
            "--tick-rate",
            "60",
            "--trust-client-positions",
            "--seed",
            "7",
            "--max-orders",
            "1",
        ]);
        let config = ServerConfig::from_args(&args).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert!(config.tick_duration < Duration::from_millis(17));
        assert!(config.trust_client_positions);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.orders.max_concurrent, 1);
    }

    #[test]
    fn test_zero_tick_rate_is_rejected() {
        let args = Args::parse_from(["server", "--tick-rate", "0"]);
        assert!(ServerConfig::from_args(&args).is_err());
    }
}
