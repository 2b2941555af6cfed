// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

//! Node descriptors.

use std::fmt::{self, Debug, Display, Formatter};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

/// Position of a node in the configured node list.
///
/// The ordering of ids is the enumeration order used to break ties when more
/// than one node could serve as the source of a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport protocol of a node's RPC endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcProtocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl RpcProtocol {
    fn scheme(self) -> &'static str {
        match self {
            RpcProtocol::Http => "http",
            RpcProtocol::Https => "https",
        }
    }
}

/// Connection info for a single node
#[derive(Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human readable name. Defaults to `host:port`.
    #[serde(default)]
    pub name: Option<String>,
    /// Host name or IP address
    pub host: String,
    /// RPC port
    pub port: u16,
    /// RPC protocol
    #[serde(default)]
    pub protocol: RpcProtocol,
    /// RPC user name
    #[serde(default)]
    pub username: String,
    /// RPC password
    #[serde(default)]
    pub password: String,
}

impl NodeConfig {
    /// Name used for this node in logs and events
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// RPC endpoint URL. Credentials are not embedded in the URL.
    pub fn url(&self) -> anyhow::Result<Url> {
        let raw = format!("{}://{}:{}/", self.protocol.scheme(), self.host, self.port);
        Url::parse(&raw).with_context(|| format!("invalid rpc url for node {}", self.display_name()))
    }
}

impl Debug for NodeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_list() {
        let nodes: Vec<NodeConfig> = serde_json::from_str(
            r#"[
                {"protocol": "http", "host": "10.0.0.1", "port": 8332, "username": "u", "password": "p"},
                {"name": "backup", "protocol": "https", "host": "node.example.com", "port": 443}
            ]"#,
        )
        .unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].display_name(), "10.0.0.1:8332");
        assert_eq!(nodes[0].url().unwrap().as_str(), "http://10.0.0.1:8332/");
        assert_eq!(nodes[1].display_name(), "backup");
        assert_eq!(nodes[1].protocol, RpcProtocol::Https);
        assert_eq!(nodes[1].username, "");
        assert_eq!(nodes[1].url().unwrap().as_str(), "https://node.example.com/");
    }

    #[test]
    fn test_debug_redacts_password() {
        let node = NodeConfig {
            name: None,
            host: "localhost".to_string(),
            port: 18443,
            protocol: RpcProtocol::Http,
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{node:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let res = serde_json::from_str::<NodeConfig>(
            r#"{"protocol": "ftp", "host": "h", "port": 1}"#,
        );
        assert!(res.is_err());
    }
}
