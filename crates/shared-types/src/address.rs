//! # Rendezvous Address
//!
//! A normalized URL naming the host-local port where participants meet.
//!
//! Addresses are interned: parsing `ws://localhost:51799` and
//! `ws://localhost:51799/` yields the same instance, so `==` and hashing
//! are pointer operations. Interned addresses live for the whole process.

use crate::errors::AddressError;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use url::{Host, Url};

/// Address used when the caller does not name one.
pub const DEFAULT_RENDEZVOUS_URL: &str = "ws://localhost:51799";

static INTERNED: OnceLock<Mutex<HashMap<String, RendezvousAddress>>> = OnceLock::new();

struct AddressInner {
    url: Url,
    host: String,
    port: u16,
}

/// Canonical identity of a rendezvous point.
#[derive(Clone)]
pub struct RendezvousAddress(Arc<AddressInner>);

impl RendezvousAddress {
    /// Parse and intern an address.
    ///
    /// # Errors
    ///
    /// - `AddressError::InvalidUrl` - not a URL
    /// - `AddressError::MissingHost` - no host component
    /// - `AddressError::MissingPort` - no port and no scheme default
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let url = Url::parse(input).map_err(|e| AddressError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;
        Self::of_url(url)
    }

    /// Intern an already parsed URL.
    pub fn of_url(url: Url) -> Result<Self, AddressError> {
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(AddressError::MissingHost(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AddressError::MissingPort(url.to_string()))?;

        let key = url.as_str().to_string();
        let table = INTERNED.get_or_init(|| Mutex::new(HashMap::new()));
        let mut table = table.lock();
        let address = table
            .entry(key)
            .or_insert_with(|| Self(Arc::new(AddressInner { url, host, port })));
        Ok(address.clone())
    }

    /// Loopback address on `port`, mostly for tests and tools.
    pub fn localhost(port: u16) -> Self {
        let url = format!("ws://127.0.0.1:{port}");
        match Self::parse(&url) {
            Ok(address) => address,
            // A literal loopback URL with a numeric port always parses.
            Err(e) => unreachable!("{e}"),
        }
    }

    /// The normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.url.as_str()
    }

    /// Host name or IP literal (IPv6 without brackets).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.0.host
    }

    /// Explicit port, or the scheme's default.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port
    }

    /// URL to present in the WebSocket client handshake.
    ///
    /// Always `ws://`: the relay only ever speaks plain TCP on the local host.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let host = match self.0.url.host() {
            Some(Host::Ipv6(ip)) => format!("[{ip}]"),
            _ => self.0.host.clone(),
        };
        format!("ws://{}:{}{}", host, self.0.port, self.0.url.path())
    }
}

impl Default for RendezvousAddress {
    fn default() -> Self {
        match Self::parse(DEFAULT_RENDEZVOUS_URL) {
            Ok(address) => address,
            Err(e) => unreachable!("default rendezvous URL must parse: {e}"),
        }
    }
}

impl PartialEq for RendezvousAddress {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RendezvousAddress {}

impl Hash for RendezvousAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Display for RendezvousAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RendezvousAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RendezvousAddress")
            .field(&self.as_str())
            .finish()
    }
}

impl FromStr for RendezvousAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RendezvousAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RendezvousAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
