use std::fmt::{Debug, Display};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

/// Address the HTTP server binds to, written as `host:port` in the config.
/// Host names are resolved once at load time and the first address wins.
#[derive(Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenEndpoint(SocketAddr);

impl ListenEndpoint {
    pub const fn all_interfaces(port: u16) -> Self {
        Self(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
    }

    pub fn address(&self) -> SocketAddr {
        self.0
    }
}

impl TryFrom<String> for ListenEndpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .to_socket_addrs()
            .map_err(|e| format!("cannot listen on {value}: {e}"))?
            .next()
            .map(Self)
            .ok_or_else(|| format!("{value} resolved to no addresses"))
    }
}

impl From<ListenEndpoint> for String {
    fn from(value: ListenEndpoint) -> Self {
        value.0.to_string()
    }
}

impl Display for ListenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ListenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}
