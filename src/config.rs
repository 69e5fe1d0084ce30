//! Loading the peer list from a YAML file: an ordered list of network
//! addresses, one per cluster member, indexed by node number.

use serde::Deserialize;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    nodes: Vec<SocketAddr>,
}

/// The cluster's peer list, in peer-index order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub nodes: Vec<SocketAddr>,
}

/// Reads and parses a YAML config file of the form:
///
/// ```yaml
/// nodes:
///   - "127.0.0.1:3000"
///   - "127.0.0.1:3001"
///   - "127.0.0.1:3002"
/// ```
pub async fn read(path: &Path) -> io::Result<Config> {
    let contents = fs::read_to_string(path).await?;
    parse(&contents)
}

fn parse(contents: &str) -> io::Result<Config> {
    let raw: RawConfig = serde_yaml::from_str(contents)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    Ok(Config { nodes: raw.nodes })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    #[test]
    fn parse_empty() {
        let config = parse("nodes: []").unwrap();
        assert_eq!(config.nodes, Vec::<SocketAddr>::new());
    }

    #[test]
    fn parse_multiple() {
        let config = parse(
            r#"
nodes:
  - "127.0.0.1:3000"
  - "127.0.0.1:3001"
  - "127.0.0.1:3002"
"#,
        )
        .unwrap();
        assert_eq!(
            config.nodes,
            vec![
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000)),
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3001)),
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3002)),
            ]
        );
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let result = parse("nodes: []\nbogus: true");
        assert!(result.is_err());
    }
}
