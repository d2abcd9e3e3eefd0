use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use medicare::topic::DEFAULT_NAMESPACE;

use crate::fanout::DEFAULT_CAPACITY;
use crate::policy::Policy;
use crate::relay::RelayOptions;

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<u64>()
        .map_err(|e| format!("`{value}` is not a number of seconds: {e}"))?;
    if seconds == 0 {
        return Err("The number of seconds must be greater than zero.".into());
    }
    Ok(Duration::from_secs(seconds))
}

fn parse_capacity(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("The capacity must be greater than zero.".into()),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(format!("`{value}` is not a capacity: {e}")),
    }
}

/// Backend configuration.
///
/// Every option can also be set through a `MEDICARE_*` environment
/// variable.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(version, about)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "MEDICARE_ADDRESS", default_value = "0.0.0.0:5000")]
    pub address: SocketAddr,

    /// Broker host.
    #[arg(long, env = "MEDICARE_MQTT_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    /// Broker port.
    #[arg(long, env = "MEDICARE_MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// Client identifier used on the broker.
    #[arg(long, env = "MEDICARE_MQTT_CLIENT_ID", default_value = "medicare-backend")]
    pub mqtt_client_id: String,

    /// Namespace of the device topics.
    #[arg(long, env = "MEDICARE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Seconds a command waits for its result before being forgotten.
    #[arg(
        long,
        env = "MEDICARE_CORRELATION_TTL",
        default_value = "300",
        value_parser = parse_seconds
    )]
    pub correlation_ttl: Duration,

    /// Seconds between two evictions of the forgotten commands.
    #[arg(
        long,
        env = "MEDICARE_SWEEP_INTERVAL",
        default_value = "30",
        value_parser = parse_seconds
    )]
    pub sweep_interval: Duration,

    /// Number of events buffered for each real-time client.
    #[arg(
        long,
        env = "MEDICARE_FANOUT_CAPACITY",
        default_value_t = DEFAULT_CAPACITY,
        value_parser = parse_capacity
    )]
    pub fanout_capacity: usize,

    /// Accept actions and parameters defined for other device types.
    #[arg(long, env = "MEDICARE_ALLOW_FOREIGN_ACTIONS")]
    pub allow_foreign_actions: bool,

    /// Do not register the default device types at startup.
    #[arg(long, env = "MEDICARE_NO_SEED")]
    pub no_seed: bool,
}

impl Config {
    /// Returns the broker connection options.
    #[must_use]
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions::new(
            self.mqtt_host.as_str(),
            self.mqtt_port,
            self.mqtt_client_id.as_str(),
        )
    }

    /// Returns the command [`Policy`].
    #[must_use]
    pub const fn policy(&self) -> Policy {
        if self.allow_foreign_actions {
            Policy::permissive()
        } else {
            Policy::strict()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use crate::policy::Policy;

    use super::Config;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["medicare-backend"]).unwrap();

        assert_eq!(config.address.to_string(), "0.0.0.0:5000");
        assert_eq!(config.namespace, "medicare");
        assert_eq!(config.correlation_ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.policy(), Policy::strict());
        assert!(!config.no_seed);

        let options = config.relay_options();
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 1883);
        assert_eq!(options.client_id, "medicare-backend");
    }

    #[test]
    fn overrides() {
        let config = Config::try_parse_from([
            "medicare-backend",
            "--mqtt-host",
            "broker.local",
            "--mqtt-port",
            "8883",
            "--namespace",
            "clinic",
            "--correlation-ttl",
            "60",
            "--allow-foreign-actions",
            "--no-seed",
        ])
        .unwrap();

        assert_eq!(config.relay_options().host, "broker.local");
        assert_eq!(config.relay_options().port, 8883);
        assert_eq!(config.namespace, "clinic");
        assert_eq!(config.correlation_ttl, Duration::from_secs(60));
        assert_eq!(config.policy(), Policy::permissive());
        assert!(config.no_seed);
    }

    #[test]
    fn invalid_values() {
        for args in [
            ["medicare-backend", "--correlation-ttl", "0"],
            ["medicare-backend", "--sweep-interval", "soon"],
            ["medicare-backend", "--fanout-capacity", "0"],
            ["medicare-backend", "--mqtt-port", "70000"],
        ] {
            assert!(Config::try_parse_from(args).is_err(), "{args:?}");
        }
    }
}
