//! Per-call metadata shared by the interzept interceptors.
//!
//! The RPC framework resolves the transport (addresses, TLS handshake) before
//! an interceptor ever runs. What it hands over is captured here as a
//! [`CallContext`]: the peer that opened the connection, the fully-qualified
//! method being invoked, and the request metadata (headers).
//!
//! Both the authorization gate and the accounting recorder read from this
//! type; neither of them performs any transport work of its own.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Everything an interceptor may inspect about a single inbound call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContext {
    /// The connected peer. `None` when the framework did not attach one.
    #[serde(default)]
    pub peer: Option<Peer>,
    /// Full method name, e.g. `/pkg.Service/Method`.
    #[serde(default)]
    pub full_method: Option<String>,
    /// Request metadata keyed by lower-cased header name.
    #[serde(default)]
    pub metadata: BTreeMap<String, Vec<String>>,
}

impl CallContext {
    /// A context for `full_method` with no peer and no metadata.
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            peer: None,
            full_method: Some(full_method.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach peer information, consuming and returning `self`.
    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Append a metadata value. Header names are case-insensitive and stored
    /// lower-cased.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.metadata
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// All values recorded for header `key` (case-insensitive).
    pub fn header(&self, key: &str) -> &[String] {
        self.metadata
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The remote end of a call as seen by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Peer {
    /// Remote address.
    #[serde(default)]
    pub addr: Option<PeerAddr>,
    /// Local address the call arrived on.
    #[serde(default)]
    pub local_addr: Option<PeerAddr>,
    /// Authentication state established by the transport.
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

/// A transport address: a network name (`tcp`, `udp`, `ip6`, ...) and the
/// textual `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    pub network: String,
    pub address: String,
}

impl PeerAddr {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new("tcp", addr.to_string())
    }
}

/// Authentication information resolved by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthInfo {
    /// Mutually authenticated TLS.
    Tls(TlsInfo),
    /// Plaintext or otherwise unauthenticated transport.
    Insecure,
}

impl AuthInfo {
    /// The short transport name, matching what RPC frameworks report.
    pub fn auth_type(&self) -> &'static str {
        match self {
            AuthInfo::Tls(_) => "tls",
            AuthInfo::Insecure => "insecure",
        }
    }
}

/// Identity attributes taken from the verified peer certificate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsInfo {
    /// SPIFFE ID (`spiffe://trust-domain/path`) if the certificate has one.
    #[serde(default)]
    pub spiffe_id: Option<String>,
    #[serde(default)]
    pub uri_sans: Vec<String>,
    #[serde(default)]
    pub dns_sans: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl TlsInfo {
    /// Every name the peer may be identified by, most specific first:
    /// SPIFFE ID, URI SANs, DNS SANs, then the subject.
    pub fn principal_names(&self) -> impl Iterator<Item = &str> {
        self.spiffe_id
            .iter()
            .chain(self.uri_sans.iter())
            .chain(self.dns_sans.iter())
            .chain(self.subject.iter())
            .map(String::as_str)
    }
}
