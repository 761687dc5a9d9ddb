//! `opc.tcp://host[:port][/path]` endpoint URLs.

use std::fmt;

use crate::error::EndpointError;

/// The only scheme this transport speaks.
pub const SCHEME: &str = "opc.tcp";

/// Port used when the URL has none.
pub const DEFAULT_PORT: u16 = 4840;

/// A parsed endpoint URL.
///
/// The original string is kept verbatim: it is what goes into `HEL` and is
/// compared byte for byte by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse an endpoint URL.
    pub fn parse(url: &str) -> Result<Self, EndpointError> {
        let (scheme, rest) =
            url.split_once("://").ok_or_else(|| EndpointError::MissingScheme(url.to_string()))?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(EndpointError::UnsupportedScheme(scheme.to_string()));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| EndpointError::InvalidHost(url.to_string()))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| EndpointError::InvalidHost(url.to_string()))?;
                    (host, Some(port))
                },
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(EndpointError::InvalidHost(url.to_string()));
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| EndpointError::InvalidPort(url.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self { url: url.to_string(), host: host.to_string(), port, path: path.to_string() })
    }

    /// The URL exactly as given.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host name or address, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, defaulted to 4840.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path including the leading slash, or empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port`, with IPv6 hosts bracketed, ready for a socket connect.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_path() {
        let ep = Endpoint::parse("opc.tcp://plc.local:4841/UA/Server").unwrap();
        assert_eq!(ep.host(), "plc.local");
        assert_eq!(ep.port(), 4841);
        assert_eq!(ep.path(), "/UA/Server");
        assert_eq!(ep.authority(), "plc.local:4841");
        assert_eq!(ep.url(), "opc.tcp://plc.local:4841/UA/Server");
    }

    #[test]
    fn port_defaults_to_4840() {
        let ep = Endpoint::parse("opc.tcp://x/y").unwrap();
        assert_eq!(ep.authority(), "x:4840");
        assert_eq!(ep.path(), "/y");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep = Endpoint::parse("opc.tcp://[::1]:4850").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), 4850);
        assert_eq!(ep.authority(), "[::1]:4850");

        let ep = Endpoint::parse("opc.tcp://[fe80::1]/p").unwrap();
        assert_eq!(ep.port(), DEFAULT_PORT);
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(Endpoint::parse("localhost:4840"), Err(EndpointError::MissingScheme(_))));
        assert!(matches!(
            Endpoint::parse("http://localhost"),
            Err(EndpointError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(Endpoint::parse("opc.tcp://:4840"), Err(EndpointError::InvalidHost(_))));
        assert!(matches!(Endpoint::parse("opc.tcp://h:99999"), Err(EndpointError::InvalidPort(_))));
        assert!(matches!(Endpoint::parse("opc.tcp://[::1"), Err(EndpointError::InvalidHost(_))));
    }
}
