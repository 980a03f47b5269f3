//! Configuration sources: the shared TOML config file and the process
//! environment.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use crate::utils::CoronetError;

use serde::Deserialize;

/// One ip + port endpoint entry in the cluster config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddrConf {
    pub ip: IpAddr,
    pub port: u16,
}

impl AddrConf {
    /// Combines the entry into a socket address.
    pub fn to_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Cluster config document shared by the registrar and all peers: where the
/// registrar listens, and which local address peers bind their service on
/// (peer port 0 means an ephemeral port, reported to the registrar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClusterConf {
    pub register: AddrConf,
    pub peer: AddrConf,
}

impl FromStr for ClusterConf {
    type Err = CoronetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

impl ClusterConf {
    /// Reads and parses the config file at the given path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoronetError> {
        std::fs::read_to_string(path)?.parse()
    }
}

/// Fills a `Default`-able config struct from environment variables. Each
/// listed field is looked up by its upper-cased name through the given
/// lookup closure; present values are parsed with `FromStr` into the field
/// type, absent ones keep their defaults.
#[macro_export]
macro_rules! env_config {
    ($lookup:expr => $conftype:ty; $($field:ident),+ $(,)?) => {{
        (|| -> Result<$conftype, $crate::CoronetError> {
            let mut config: $conftype = Default::default();
            $(
                let var = stringify!($field).to_uppercase();
                if let Some(raw) = $lookup(var.as_str()) {
                    config.$field = raw.trim().parse().map_err(|e| {
                        $crate::CoronetError::msg(format!(
                            "invalid value '{}' for env {}: {:?}",
                            raw, var, e
                        ))
                    })?;
                }
            )+
            Ok(config)
        })()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_cluster_conf() {
        let conf: ClusterConf = "[register]\n\
                                 ip = \"127.0.0.1\"\n\
                                 port = 8470\n\
                                 \n\
                                 [peer]\n\
                                 ip = \"127.0.0.1\"\n\
                                 port = 0\n"
            .parse()
            .unwrap();
        assert_eq!(conf.register.to_addr(), "127.0.0.1:8470".parse().unwrap());
        assert_eq!(conf.peer.port, 0);
    }

    #[test]
    fn parse_cluster_conf_invalid() {
        assert!("[register]\nip = \"nonsense\"\nport = 1\n"
            .parse::<ClusterConf>()
            .is_err());
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TestConf {
        count: u8,
        name: String,
    }

    impl Default for TestConf {
        fn default() -> Self {
            TestConf {
                count: 7,
                name: "anon".into(),
            }
        }
    }

    #[test]
    fn env_config_fills_fields() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("COUNT", "3"), ("NAME", "reg")]);
        let conf = env_config!(|var| vars.get(var).map(|v| v.to_string())
                                     => TestConf; count, name)
        .unwrap();
        assert_eq!(
            conf,
            TestConf {
                count: 3,
                name: "reg".into()
            }
        );
    }

    #[test]
    fn env_config_keeps_defaults() {
        let vars: HashMap<&str, &str> = HashMap::new();
        let conf = env_config!(|var| vars.get(var).map(|v| v.to_string())
                                     => TestConf; count, name)
        .unwrap();
        assert_eq!(conf, TestConf::default());
    }

    #[test]
    fn env_config_rejects_malformed() {
        let vars: HashMap<&str, &str> = HashMap::from([("COUNT", "many")]);
        assert!(env_config!(|var| vars.get(var).map(|v| v.to_string())
                                  => TestConf; count, name)
        .is_err());
    }
}
