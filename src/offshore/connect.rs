//! CONNECT target resolution and dialing.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Port used when a CONNECT target names none.
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("empty CONNECT target")]
    Empty,

    #[error("invalid port in CONNECT target {0:?}")]
    InvalidPort(String),

    #[error("unterminated IPv6 literal in CONNECT target {0:?}")]
    UnclosedBracket(String),

    #[error("could not reach {host}:{port}: {source}")]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {host}:{port} timed out")]
    Timeout { host: String, port: u16 },
}

/// Split `host[:port]` into its parts. IPv6 literals must be bracketed
/// when a port is given; the brackets are removed from the host.
pub fn parse_target(target: &str) -> Result<(String, u16), TargetError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(TargetError::Empty);
    }

    if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| TargetError::UnclosedBracket(target.to_string()))?;
        if host.is_empty() {
            return Err(TargetError::Empty);
        }
        let port = match after.strip_prefix(':') {
            Some(port) => parse_port(port, target)?,
            None if after.is_empty() => DEFAULT_TUNNEL_PORT,
            None => return Err(TargetError::InvalidPort(target.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match target.rsplit_once(':') {
        // A bare IPv6 literal has several colons and no port.
        Some((host, _)) if host.contains(':') => Ok((target.to_string(), DEFAULT_TUNNEL_PORT)),
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), parse_port(port, target)?)),
        Some(_) => Err(TargetError::Empty),
        None => Ok((target.to_string(), DEFAULT_TUNNEL_PORT)),
    }
}

fn parse_port(port: &str, target: &str) -> Result<u16, TargetError> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(TargetError::InvalidPort(target.to_string())),
    }
}

/// Dial the tunnel target within `connect_timeout`.
pub async fn open_target(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, TargetError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TargetError::Timeout {
            host: host.to_string(),
            port,
        })?
        .map_err(|source| TargetError::Unreachable {
            host: host.to_string(),
            port,
            source,
        })?;

    let _ = stream.set_nodelay(true);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port() {
        assert_eq!(parse_target("example.com:8443").unwrap(), ("example.com".to_string(), 8443));
    }

    #[test]
    fn port_defaults_to_443() {
        assert_eq!(parse_target("example.com").unwrap(), ("example.com".to_string(), 443));
    }

    #[test]
    fn ipv6_forms() {
        assert_eq!(parse_target("[::1]:8443").unwrap(), ("::1".to_string(), 8443));
        assert_eq!(parse_target("[2001:db8::1]").unwrap(), ("2001:db8::1".to_string(), 443));
        assert_eq!(parse_target("2001:db8::1").unwrap(), ("2001:db8::1".to_string(), 443));
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(matches!(parse_target(""), Err(TargetError::Empty)));
        assert!(matches!(parse_target(":443"), Err(TargetError::Empty)));
        assert!(matches!(parse_target("example.com:http"), Err(TargetError::InvalidPort(_))));
        assert!(matches!(parse_target("example.com:0"), Err(TargetError::InvalidPort(_))));
        assert!(matches!(parse_target("[::1:443"), Err(TargetError::UnclosedBracket(_))));
    }

    #[tokio::test]
    async fn unreachable_target_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = open_target("127.0.0.1", port, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, TargetError::Unreachable { .. }));
    }
}
