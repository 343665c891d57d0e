//! Command-line configuration of the crowdsim binary.

use std::net::IpAddr;

use clap::Parser;

/// Agent-based market simulator driven by composed directional forces.
#[derive(Debug, Parser)]
#[command(name = "crowdsim", version, about)]
pub struct Cli {
    /// Address the HTTP control surface binds to.
    #[arg(long, default_value = "127.0.0.1")]
    pub interface_address: IpAddr,

    /// Port the HTTP control surface binds to.
    #[arg(long, default_value_t = 18080)]
    pub interface_port: u16,

    /// Steps executed contiguously before the engine services external
    /// commands again.
    #[arg(long, default_value_t = 1000)]
    pub iter_block: u64,

    /// Milliseconds between subscriber-manager scans; a non-positive value
    /// disables the manager permanently.
    #[arg(long, default_value_t = 5000)]
    pub subscriber_poll_interval: i64,

    /// Maximum records packed into a single outgoing datagram.
    #[arg(long, default_value_t = 1000)]
    pub subscriber_max_records: usize,

    /// Log verbosity: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    #[arg(long, default_value_t = 1)]
    pub verbosity: u8,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["crowdsim"]);
        assert_eq!(cli.interface_address.to_string(), "127.0.0.1");
        assert_eq!(cli.interface_port, 18080);
        assert_eq!(cli.iter_block, 1000);
        assert_eq!(cli.subscriber_poll_interval, 5000);
        assert_eq!(cli.subscriber_max_records, 1000);
        assert_eq!(cli.log_filter(), "info");
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "crowdsim",
            "--interface-port",
            "9000",
            "--iter-block",
            "50",
            "--verbosity",
            "3",
        ]);
        assert_eq!(cli.interface_port, 9000);
        assert_eq!(cli.iter_block, 50);
        assert_eq!(cli.log_filter(), "trace");
    }
}
