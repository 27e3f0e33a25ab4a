//! Address-family scope for compiled databases.

use std::fmt;
use std::str::FromStr;

use ipnet::IpNet;

use crate::Error;

/// Which address families end up in the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum IpScope {
    /// Both IPv4 and IPv6
    #[default]
    Any,
    /// IPv4 prefixes only
    V4Only,
    /// IPv6 prefixes only
    V6Only,
}

impl IpScope {
    /// Get the configuration string of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            IpScope::Any => "",
            IpScope::V4Only => "ipv4",
            IpScope::V6Only => "ipv6",
        }
    }

    /// Whether prefixes of this network's family are kept.
    pub fn allows(&self, net: &IpNet) -> bool {
        match (self, net) {
            (IpScope::Any, _) => true,
            (IpScope::V4Only, IpNet::V4(_)) => true,
            (IpScope::V6Only, IpNet::V6(_)) => true,
            _ => false,
        }
    }

    pub fn includes_v4(&self) -> bool {
        !matches!(self, IpScope::V6Only)
    }

    pub fn includes_v6(&self) -> bool {
        !matches!(self, IpScope::V4Only)
    }
}

impl FromStr for IpScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(IpScope::Any),
            "ipv4" => Ok(IpScope::V4Only),
            "ipv6" => Ok(IpScope::V6Only),
            other => Err(Error::Config(format!(
                "invalid onlyIPType {:?}: expected \"ipv4\" or \"ipv6\"",
                other
            ))),
        }
    }
}

impl TryFrom<String> for IpScope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for IpScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpScope::Any => write!(f, "ipv4+ipv6"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
