//! Jammer and BTS connection setup

use std::fmt;

use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::chain::SessionChain;
use crate::error::SessionError;
use crate::event::ChainEvent;
use crate::session::SessionConfig;

/// Host and TCP port of a jammer or BTS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Pair whitespace-separated addresses with ports, position by position.
///
/// Counts must match; nothing is connected if they do not.
pub fn parse_endpoints(addresses: &str, ports: &str) -> Result<Vec<Endpoint>, SessionError> {
    let hosts: Vec<&str> = addresses.split_whitespace().collect();
    let ports: Vec<&str> = ports.split_whitespace().collect();

    if hosts.len() != ports.len() {
        return Err(SessionError::EndpointCountMismatch {
            addresses: hosts.len(),
            ports: ports.len(),
        });
    }

    hosts
        .into_iter()
        .zip(ports)
        .map(|(host, port)| {
            let port = port
                .parse::<u16>()
                .map_err(|_| SessionError::InvalidPort(port.to_string()))?;
            Ok(Endpoint::new(host, port))
        })
        .collect()
}

/// Open one TCP connection with send coalescing disabled
pub async fn connect(endpoint: &Endpoint, nodelay: bool) -> Result<TcpStream, SessionError> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|source| SessionError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;

    if nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle on {}: {}", endpoint, e);
        }
    }
    Ok(stream)
}

/// Connect every jammer in order and start the chain.
///
/// Unreachable jammers are logged and left out; the rest keep their
/// relative order. Fails with [`SessionError::NoSessions`] only if
/// endpoints were given and none connected.
pub async fn connect_chain(
    endpoints: &[Endpoint],
    config: &SessionConfig,
) -> Result<(SessionChain, UnboundedReceiver<ChainEvent>), SessionError> {
    let mut streams = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        match connect(endpoint, config.nodelay).await {
            Ok(stream) => {
                info!("Connected to jammer {}", endpoint);
                streams.push(stream);
            }
            Err(e) => error!("Skipping jammer: {}", e),
        }
    }

    if !endpoints.is_empty() && streams.is_empty() {
        return Err(SessionError::NoSessions);
    }

    SessionChain::start(streams, config)
}

/// Connect to the BTS control port
pub async fn connect_bts(endpoint: &Endpoint) -> Result<TcpStream, SessionError> {
    let stream = connect(endpoint, true).await?;
    info!("Connected to BTS {}", endpoint);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_pairs_in_order() {
        let endpoints = parse_endpoints("10.0.0.1  10.0.0.2", "4000 4001").unwrap();
        assert_eq!(
            endpoints,
            vec![Endpoint::new("10.0.0.1", 4000), Endpoint::new("10.0.0.2", 4001)]
        );
        assert_eq!(endpoints[1].to_string(), "10.0.0.2:4001");
    }

    #[test]
    fn test_parse_count_mismatch() {
        match parse_endpoints("a b c", "1 2") {
            Err(SessionError::EndpointCountMismatch { addresses, ports }) => {
                assert_eq!((addresses, ports), (3, 2));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bad_port() {
        assert!(matches!(
            parse_endpoints("a", "70000"),
            Err(SessionError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_endpoints("", "  ").unwrap().is_empty());
    }

    /// Port that nothing listens on
    async fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_unreachable_jammers_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap().port();
        let dead = dead_port().await;

        let endpoints = vec![
            Endpoint::new("127.0.0.1", dead),
            Endpoint::new("127.0.0.1", live),
        ];
        let (chain, _events) = connect_chain(&endpoints, &SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(chain.len(), 1);
        let primary = chain.primary().unwrap();
        assert_eq!(primary.ordinal(), 1);
        assert_eq!(primary.peer().port(), live);
    }

    #[tokio::test]
    async fn test_all_unreachable_is_error() {
        let endpoints = vec![Endpoint::new("127.0.0.1", dead_port().await)];
        assert!(matches!(
            connect_chain(&endpoints, &SessionConfig::default()).await,
            Err(SessionError::NoSessions)
        ));
    }

    #[tokio::test]
    async fn test_no_jammers_gives_empty_chain() {
        let (chain, _events) = connect_chain(&[], &SessionConfig::default()).await.unwrap();
        assert!(chain.is_empty());
        assert!(chain.primary().is_none());
    }

    #[tokio::test]
    async fn test_bts_connect_failure_reported() {
        let endpoint = Endpoint::new("127.0.0.1", dead_port().await);
        assert!(matches!(
            connect_bts(&endpoint).await,
            Err(SessionError::Connect { .. })
        ));
    }
}
