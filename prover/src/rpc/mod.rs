//! JSON-RPC wire types for the node and the coin-flip contract.
//!
//! Every node method gets an explicit response schema. Responses are decoded
//! with [`serde_path_to_error`] so a malformed response is reported as a
//! [`TransportError`] that names the offending field instead of surfacing as
//! a type mismatch deep inside the caller.

use std::future::Future;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub mod http;
pub mod retry;

pub const JSON_RPC_VERSION: &str = "2.0";

pub const METHOD_ESTIMATE_CALL: &str = "contract_estimateCall";
pub const METHOD_CALL: &str = "contract_call";
pub const METHOD_SYNCING: &str = "bcn_syncing";
pub const METHOD_BLOCK_AT: &str = "bcn_blockAt";

/// Delivers one encoded request to the node and returns the raw response
/// body.
pub trait RpcTransport {
    fn send(
        &self,
        request: &RpcRequest,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

/// Failure to reach the node or to make sense of what it answered.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to node failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("node answered with HTTP status {0}")]
    Status(u16),
    #[error("could not encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed `{method}` response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    #[error("`{method}` response carried no result")]
    MissingResult { method: String },
    #[error("invalid hex in `{field}`: {source}")]
    Hex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },
}

impl TransportError {
    /// Whether sending the same request again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => !e.is_builder(),
            TransportError::Status(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rpc error {code}: {message}")]
    Application { code: i64, message: String },
    #[error("contract call `{method}` failed: {message}")]
    ContractExecution { method: String, message: String },
    #[error("proof submission for block {height} failed after a successful estimate: {source}")]
    Submission {
        height: u64,
        #[source]
        source: Box<RpcError>,
    },
    #[error("invalid contract argument: {0}")]
    InvalidArgument(String),
    #[error("contract call `{method}` returned {len} bytes, expected {expected}")]
    InvalidOutput {
        method: String,
        len: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcRequest {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: String,
    pub key: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcErrorPayload>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcErrorPayload {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl<T: DeserializeOwned> RpcResponse<T> {
    pub fn decode(method: &str, body: &[u8]) -> Result<Self, TransportError> {
        let de = &mut serde_json::Deserializer::from_slice(body);
        serde_path_to_error::deserialize(de).map_err(|source| TransportError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// A non-zero error code is a failure whatever else the envelope holds.
    pub fn into_result(self, method: &str) -> Result<T, RpcError> {
        if let Some(error) = self.error.filter(|e| e.code != 0) {
            return Err(RpcError::Application {
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or_else(|| {
            TransportError::MissingResult {
                method: method.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgFormat {
    /// Signed 64-bit integer as decimal text.
    Int64,
    /// Raw bytes as `0x`-prefixed hex text.
    Hex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractArg {
    pub index: usize,
    pub format: ArgFormat,
    pub value: String,
}

impl ContractArg {
    pub fn as_int64(&self) -> Option<i64> {
        match self.format {
            ArgFormat::Int64 => self.value.parse().ok(),
            ArgFormat::Hex => None,
        }
    }

    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self.format {
            ArgFormat::Hex => hex::decode(self.value.strip_prefix("0x")?).ok(),
            ArgFormat::Int64 => None,
        }
    }
}

/// Ordered contract arguments. Indices are assigned in push order, so they
/// always cover `0..len` exactly once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ContractArgs(Vec<ContractArg>);

impl ContractArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int64(self, value: i64) -> Self {
        self.push(ArgFormat::Int64, value.to_string())
    }

    /// Block heights travel as `int64`; heights past `i64::MAX` are rejected.
    pub fn height(self, height: u64) -> Result<Self, RpcError> {
        let value = i64::try_from(height).map_err(|_| {
            RpcError::InvalidArgument(format!(
                "block height {height} does not fit the int64 argument format"
            ))
        })?;
        Ok(self.int64(value))
    }

    pub fn hex(self, bytes: &[u8]) -> Self {
        self.push(ArgFormat::Hex, format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_slice(&self) -> &[ContractArg] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(mut self, format: ArgFormat, value: String) -> Self {
        let index = self.0.len();
        self.0.push(ContractArg {
            index,
            format,
            value,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub contract: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "ContractArgs::is_empty")]
    pub args: ContractArgs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee: Option<u64>,
}

/// `contract_estimateCall` result.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub action_result: Option<ActionResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    #[serde(default)]
    pub output_data: Option<String>,
}

/// Decoded dry-run result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateOutcome {
    pub succeeded: bool,
    pub error: Option<String>,
    /// `None` when the contract produced no output bytes.
    pub output: Option<Vec<u8>>,
}

impl TryFrom<EstimateResult> for EstimateOutcome {
    type Error = TransportError;

    fn try_from(result: EstimateResult) -> Result<Self, Self::Error> {
        let output = match result.action_result.and_then(|it| it.output_data) {
            Some(data) => {
                let digits = data.strip_prefix("0x").unwrap_or(&data);
                let bytes = hex::decode(digits).map_err(|source| TransportError::Hex {
                    field: "actionResult.outputData",
                    source,
                })?;
                Some(bytes).filter(|it| !it.is_empty())
            }
            None => None,
        };
        Ok(Self {
            succeeded: result.success,
            error: result.error.filter(|it| !it.is_empty()),
            output,
        })
    }
}

impl EstimateOutcome {
    pub fn into_output(self, method: &str) -> Result<Option<Vec<u8>>, RpcError> {
        if !self.succeeded {
            return Err(RpcError::ContractExecution {
                method: method.to_string(),
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(self.output)
    }
}

/// `bcn_syncing` result.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub syncing: bool,
    #[serde(default)]
    pub current_block: u64,
    pub highest_block: u64,
}

/// `bcn_blockAt` result, reduced to the fields the prover reads.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub hash: Option<String>,
    pub seed: String,
}
