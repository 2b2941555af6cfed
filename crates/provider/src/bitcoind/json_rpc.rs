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

//! JSON-RPC 1.0 envelope as spoken by bitcoind and compatible nodes

use serde::{Deserialize, Serialize};

/// A JSON-RPC request
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a, T> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: T,
}

impl<'a, T> Request<'a, T> {
    pub(crate) fn new(id: u64, method: &'a str, params: T) -> Self {
        Self {
            jsonrpc: "1.0",
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC response.
///
/// bitcoind sends both fields on every response, with the unused one set to
/// null. Either may be absent when talking to a 2.0 server.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    #[serde(default)]
    pub(crate) result: serde_json::Value,
    #[serde(default)]
    pub(crate) error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorObject {
    pub(crate) code: i64,
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_envelope() {
        let req = Request::new(7, "getrawtransaction", ("abcd",));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"jsonrpc": "1.0", "id": 7, "method": "getrawtransaction", "params": ["abcd"]})
        );
    }

    #[test]
    fn test_error_response() {
        let res: Response = serde_json::from_str(
            r#"{"result": null, "error": {"code": -25, "message": "Missing inputs"}, "id": 1}"#,
        )
        .unwrap();
        let error = res.error.unwrap();
        assert_eq!(error.code, -25);
        assert_eq!(error.message, "Missing inputs");
    }

    #[test]
    fn test_success_response_without_error_field() {
        let res: Response =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "result": ["aa"], "id": 1}"#).unwrap();
        assert!(res.error.is_none());
        assert_eq!(res.result, json!(["aa"]));
    }
}
