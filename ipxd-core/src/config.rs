#![forbid(unsafe_code)]

//! ipxd configuration handling. Parses a TOML file into a strongly-typed
//! structure. Durations are stored as plain integer fields and exposed
//! through accessor methods so callers never juggle raw seconds.

use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use tracing::debug;

use crate::error::{Error, Result};

/// Primary configuration structure shared across ipxd components.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpxdConfig {
    /// Logging verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: Option<String>,

    /// UDP listen port for incoming IPX traffic.
    pub listen_port: u16,

    /// Seconds of client silence before the client is evicted.
    pub client_timeout_secs: u64,

    /// Seconds of egress silence before a keepalive ping is sent.
    pub keepalive_secs: u64,

    /// Forward Windows NetBIOS traffic instead of filtering it out.
    pub allow_netbios: bool,
}

impl Default for IpxdConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            listen_port: default_listen_port(),
            client_timeout_secs: 600,
            keepalive_secs: 5,
            allow_netbios: false,
        }
    }
}

fn default_listen_port() -> u16 {
    10000
}

impl IpxdConfig {
    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path)?;
        let cfg = toml::from_str::<IpxdConfig>(&data)?;
        cfg.validate()?;
        debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(cfg)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.client_timeout_secs == 0 {
            return Err(Error::config("client_timeout_secs must be non-zero"));
        }
        if self.keepalive_secs == 0 {
            return Err(Error::config("keepalive_secs must be non-zero"));
        }
        Ok(())
    }

    /// Client inactivity timeout as a Duration (default 10 minutes)
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// Keepalive interval as a Duration (default 5 seconds)
    pub fn keepalive_time(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_protocol_expectations() {
        let cfg = IpxdConfig::default();
        assert_eq!(cfg.listen_port, 10000);
        assert_eq!(cfg.client_timeout(), Duration::from_secs(600));
        assert_eq!(cfg.keepalive_time(), Duration::from_secs(5));
        assert!(!cfg.allow_netbios);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_port = 213\nkeepalive_secs = 2").unwrap();
        let cfg = IpxdConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.listen_port, 213);
        assert_eq!(cfg.keepalive_time(), Duration::from_secs(2));
        assert_eq!(cfg.client_timeout_secs, 600);
    }

    #[test]
    fn zero_durations_rejected() {
        let cfg = IpxdConfig {
            keepalive_secs: 0,
            ..IpxdConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
