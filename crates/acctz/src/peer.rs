use call_context::{AuthInfo, Peer, PeerAddr};
use thiserror::Error;
use tracing::warn;

pub const UNKNOWN_HOST: &str = "unknown-host";
pub const UNKNOWN_USER: &str = "unknown-user";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("peer is not a TLS peer (auth type {0})")]
    NotTls(&'static str),
    #[error("peer information is not TLS")]
    NoAuthInfo,
}

/// The peer's SPIFFE ID, if it authenticated over TLS with one.
pub fn spiffe_id(peer: &Peer) -> Result<Option<&str>, IdentityError> {
    match &peer.auth {
        Some(AuthInfo::Tls(tls)) => Ok(tls.spiffe_id.as_deref()),
        Some(other) => Err(IdentityError::NotTls(other.auth_type())),
        None => Err(IdentityError::NoAuthInfo),
    }
}

/// IANA protocol number for the address' network; 0 if unknown.
pub fn ip_proto(addr: Option<&PeerAddr>) -> u32 {
    let Some(addr) = addr else {
        return 0;
    };
    match addr.network.as_str() {
        "tcp" => 6,
        "udp" => 17,
        "ip4" | "ipv4" => 4,
        "ip6" | "ipv6" => 41,
        _ => 0,
    }
}

/// Host and port of an address.
///
/// A missing address yields [`UNKNOWN_HOST`] and port 0; an address that
/// cannot be parsed yields an empty host and port 0.
pub fn split_host_port(addr: Option<&PeerAddr>) -> (String, u32) {
    let Some(addr) = addr else {
        return (UNKNOWN_HOST.to_string(), 0);
    };
    let (host, port) = match parse_host_port(&addr.address) {
        Ok(parts) => parts,
        Err(reason) => {
            warn!(address = %addr.address, reason, "unable to parse address");
            return (String::new(), 0);
        }
    };
    match port.parse::<u32>() {
        Ok(port) => (host.to_string(), port),
        Err(err) => {
            warn!(address = %addr.address, %err, "unable to parse port");
            (String::new(), 0)
        }
    }
}

/// Split `host:port` or `[v6-host]:port`.
fn parse_host_port(address: &str) -> Result<(&str, &str), &'static str> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or("missing ']' in address")?;
        let port = after.strip_prefix(':').ok_or("missing port in address")?;
        return Ok((host, port));
    }
    let (host, port) = address.rsplit_once(':').ok_or("missing port in address")?;
    if host.contains(':') {
        return Err("too many colons in address");
    }
    Ok((host, port))
}
