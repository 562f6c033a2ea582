//! RPC method names and message bodies.

use serde::{Deserialize, Serialize};

/// The two session RPC methods.
///
/// The wire strings keep the `CommandServer.` service prefix; no third
/// party speaks this protocol, but the names are part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Register a process group with the attribution engine.
    #[serde(rename = "CommandServer.StartTrace")]
    StartTrace,
    /// Close a session and return its canonicalized contents.
    #[serde(rename = "CommandServer.EndTrace")]
    EndTrace,
}

/// A single RPC request. Both methods take only the process group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRequest {
    /// The method being invoked.
    pub method: Method,
    /// Process group of the traced command.
    #[serde(rename = "PGID")]
    pub pgid: i32,
}

/// A single RPC response.
///
/// `StartTrace` answers with an empty response; the remaining fields are
/// populated only for `EndTrace`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceResponse {
    /// In-band error; when set, all other fields are meaningless.
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// The closed session's ID.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Server-side directory the client writes the record into.
    #[serde(rename = "DepDir", default)]
    pub dep_dir: String,
    /// Paths read, ascending and unique.
    #[serde(rename = "Read", default)]
    pub read: Vec<String>,
    /// Paths created, ascending and unique.
    #[serde(rename = "Create", default)]
    pub create: Vec<String>,
    /// Paths updated, ascending and unique.
    #[serde(rename = "Update", default)]
    pub update: Vec<String>,
    /// Paths deleted, ascending and unique.
    #[serde(rename = "Delete", default)]
    pub delete: Vec<String>,
}

impl TraceResponse {
    /// An error response carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_wire_names() {
        let start = serde_json::to_string(&Method::StartTrace).unwrap();
        let end = serde_json::to_string(&Method::EndTrace).unwrap();
        assert_eq!(start, "\"CommandServer.StartTrace\"");
        assert_eq!(end, "\"CommandServer.EndTrace\"");
    }

    #[test]
    fn test_request_roundtrip() {
        let req = TraceRequest {
            method: Method::StartTrace,
            pgid: 1234,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"PGID\":1234"));
        let back: TraceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, Method::StartTrace);
        assert_eq!(back.pgid, 1234);
    }

    #[test]
    fn test_empty_response_omits_err() {
        let json = serde_json::to_string(&TraceResponse::default()).unwrap();
        assert!(!json.contains("Err"));
        // Arrays are always present, never null.
        assert!(json.contains("\"Read\":[]"));
    }

    #[test]
    fn test_error_response() {
        let resp = TraceResponse::error("no such session");
        let json = serde_json::to_string(&resp).unwrap();
        let back: TraceResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.err.as_deref(), Some("no such session"));
    }
}
