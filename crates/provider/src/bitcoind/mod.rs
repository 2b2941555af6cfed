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

//! JSON-RPC client for bitcoind-compatible nodes

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::Context;
use poolsync_types::{NodeConfig, RawTransaction, TxId};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use url::Url;

use crate::{NodeRpc, ProviderError, ProviderResult};

mod json_rpc;
use json_rpc::{Request, Response};

/// Settings for the HTTP client used to talk to a node
#[derive(Clone, Copy, Debug)]
pub struct ClientSettings {
    /// Upper bound on a whole request, including reading the response
    pub request_timeout: Duration,
    /// Upper bound on establishing the connection
    pub connect_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// [`NodeRpc`] implementation over bitcoind's JSON-RPC interface
#[derive(Debug)]
pub struct BitcoindClient {
    name: String,
    url: Url,
    username: String,
    password: String,
    client: reqwest::Client,
    id: AtomicU64,
}

impl BitcoindClient {
    /// Create a client for the given node
    pub fn new(config: &NodeConfig, settings: ClientSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            name: config.display_name(),
            url: config.url()?,
            username: config.username.clone(),
            password: config.password.clone(),
            client,
            id: AtomicU64::new(1),
        })
    }

    /// Name of the node this client talks to
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request<P, R>(&self, method: &str, params: P) -> ProviderResult<R>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let id = self.id.fetch_add(1, Ordering::Relaxed);
        let payload = Request::new(id, method, params);

        let mut builder = self.client.post(self.url.clone()).json(&payload);
        if !self.username.is_empty() {
            builder = builder.basic_auth(&self.username, Some(&self.password));
        }
        let res = builder.send().await?;

        // bitcoind reports RPC errors with a non-2xx status and a JSON body,
        // so the body is decoded before the status is looked at.
        let status = res.status();
        let body = res.bytes().await?;
        let response: Response = serde_json::from_slice(&body).map_err(|err| {
            ProviderError::InvalidResponse(format!(
                "{method} returned status {status}: {err}: {}",
                String::from_utf8_lossy(&body)
            ))
        })?;

        if let Some(error) = response.error {
            tracing::debug!(
                "{method} on {} failed with {}: {}",
                self.name,
                error.code,
                error.message
            );
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(response.result).map_err(|err| {
            ProviderError::InvalidResponse(format!("{method} result could not be decoded: {err}"))
        })
    }
}

#[async_trait::async_trait]
impl NodeRpc for BitcoindClient {
    async fn get_raw_mempool(&self) -> ProviderResult<Vec<TxId>> {
        self.request("getrawmempool", json!([])).await
    }

    async fn get_raw_transaction(&self, txid: TxId) -> ProviderResult<RawTransaction> {
        self.request("getrawtransaction", (txid,)).await
    }

    async fn send_raw_transaction(&self, tx: RawTransaction) -> ProviderResult<TxId> {
        self.request("sendrawtransaction", (tx,)).await
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use poolsync_types::RpcProtocol;
    use serde_json::Value;
    use tiny_http::{Response as HttpResponse, Server, StatusCode};

    use super::*;
    use crate::Rejection;

    /// Serve JSON-RPC requests with the given handler on a background thread,
    /// returning the port it listens on.
    fn serve<F>(handler: F) -> u16
    where
        F: Fn(&str, &Value, bool) -> (u16, String) + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let authorized = request
                    .headers()
                    .iter()
                    .any(|h| h.field.equiv("Authorization"));
                let mut body = String::new();
                request.as_reader().read_to_string(&mut body).unwrap();
                let body: Value = serde_json::from_str(&body).unwrap();
                let method = body["method"].as_str().unwrap().to_string();
                let (status, reply) = handler(&method, &body["params"], authorized);
                let _ = request
                    .respond(HttpResponse::from_string(reply).with_status_code(StatusCode(status)));
            }
        });
        port
    }

    fn client(port: u16, request_timeout: Duration) -> BitcoindClient {
        let config = NodeConfig {
            name: Some("test".to_string()),
            host: "127.0.0.1".to_string(),
            port,
            protocol: RpcProtocol::Http,
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let settings = ClientSettings {
            request_timeout,
            ..Default::default()
        };
        BitcoindClient::new(&config, settings).unwrap()
    }

    #[tokio::test]
    async fn test_get_raw_mempool() {
        let port = serve(|method, params, authorized| {
            assert_eq!(method, "getrawmempool");
            assert_eq!(params, &json!([]));
            assert!(authorized);
            (200, r#"{"result": ["aa", "bb"], "error": null, "id": 1}"#.to_string())
        });

        let mempool = client(port, Duration::from_secs(5))
            .get_raw_mempool()
            .await
            .unwrap();
        assert_eq!(mempool, vec![TxId::from("aa"), TxId::from("bb")]);
    }

    #[tokio::test]
    async fn test_get_and_send_raw_transaction() {
        let port = serve(|method, params, _| match method {
            "getrawtransaction" => {
                assert_eq!(params, &json!(["aa"]));
                (200, r#"{"result": "0200", "error": null, "id": 1}"#.to_string())
            }
            "sendrawtransaction" => {
                assert_eq!(params, &json!(["0200"]));
                (200, r#"{"result": "aa", "error": null, "id": 2}"#.to_string())
            }
            _ => panic!("unexpected method {method}"),
        });

        let client = client(port, Duration::from_secs(5));
        let tx = client.get_raw_transaction(TxId::from("aa")).await.unwrap();
        assert_eq!(tx.as_bytes(), &[0x02, 0x00]);
        let txid = client.send_raw_transaction(tx).await.unwrap();
        assert_eq!(txid, TxId::from("aa"));
    }

    #[tokio::test]
    async fn test_rpc_error_with_500_status() {
        let port = serve(|_, _, _| {
            (
                500,
                r#"{"result": null, "error": {"code": -25, "message": "Missing inputs"}, "id": 1}"#
                    .to_string(),
            )
        });

        let err = client(port, Duration::from_secs(5))
            .send_raw_transaction(RawTransaction::new(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rpc { code: -25, .. }));
        assert_eq!(err.rejection(), Rejection::MissingInputs);
    }

    #[tokio::test]
    async fn test_unauthorized_is_invalid_response() {
        let port = serve(|_, _, _| (401, String::new()));

        let err = client(port, Duration::from_secs(5))
            .get_raw_mempool()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let port = serve(|_, _, _| {
            thread::sleep(Duration::from_secs(2));
            (200, r#"{"result": [], "error": null, "id": 1}"#.to_string())
        });

        let err = client(port, Duration::from_millis(200))
            .get_raw_mempool()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = client(port, Duration::from_secs(5))
            .get_raw_mempool()
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }
}
