use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::endpoint::EndpointConfig;
use crate::rpc::{
    BlockSummary, ContractArgs, ContractCall, EstimateOutcome, EstimateResult, RpcError,
    RpcRequest, RpcResponse, RpcTransport, SyncStatus, TransportError, JSON_RPC_VERSION,
    METHOD_BLOCK_AT, METHOD_CALL, METHOD_ESTIMATE_CALL, METHOD_SYNCING,
};

/// Fee ceiling for proof submissions unless configured otherwise.
pub const DEFAULT_MAX_FEE: u64 = 10_000;

const NEED_PROOF: &str = "needProof";
const FLIP_COIN: &str = "flipCoin";
const PROOF_SUBMISSION_WINDOW: &str = "proofSubmissionWindow";

/// Chain reads shared by the polling engine and the simulation.
pub trait BlockSeedSource {
    fn latest_block_height(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn block_seed(&self, height: u64) -> impl Future<Output = Result<Vec<u8>, RpcError>> + Send;
}

/// Contract operations the polling engine needs to settle rounds.
pub trait RoundProvider: BlockSeedSource {
    /// Number of blocks after a round during which a proof is accepted.
    fn submission_window(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Seed of the round at `height` if it still waits for a proof.
    fn provable_seed(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, RpcError>> + Send;

    /// Returns the transaction hash of the accepted submission.
    fn submit_proof(
        &self,
        height: u64,
        proof: &[u8],
    ) -> impl Future<Output = Result<String, RpcError>> + Send;
}

/// Client for the coin-flip contract and the node it is deployed on.
pub struct ContractClient<TransportT> {
    transport: TransportT,
    endpoint: EndpointConfig,
    max_fee: u64,
    next_id: AtomicU64,
}

impl<TransportT> ContractClient<TransportT>
where
    TransportT: RpcTransport + Sync,
{
    pub fn new(transport: TransportT, endpoint: EndpointConfig) -> Self {
        Self {
            transport,
            endpoint,
            max_fee: DEFAULT_MAX_FEE,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_max_fee(mut self, max_fee: u64) -> Self {
        self.max_fee = max_fee;
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// Dry-runs `method` without changing state or paying a fee.
    ///
    /// Returns `None` when the call succeeded but produced no output bytes.
    pub async fn estimate_call(
        &self,
        method: &str,
        args: ContractArgs,
        sender: Option<&str>,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let call = self.contract_call(method, args, sender, None);
        let result: EstimateResult = self.request(METHOD_ESTIMATE_CALL, &call).await?;
        EstimateOutcome::try_from(result)?.into_output(method)
    }

    /// Executes `method` on chain, paying at most `max_fee`.
    pub async fn execute_call(
        &self,
        method: &str,
        args: ContractArgs,
        sender: Option<&str>,
        max_fee: u64,
    ) -> Result<String, RpcError> {
        let call = self.contract_call(method, args, sender, Some(max_fee));
        let tx_hash: String = self.request(METHOD_CALL, &call).await?;
        if tx_hash.is_empty() {
            return Err(TransportError::MissingResult {
                method: METHOD_CALL.to_string(),
            }
            .into());
        }
        Ok(tx_hash)
    }

    pub async fn submission_window(&self) -> Result<u64, RpcError> {
        let output = self
            .estimate_call(PROOF_SUBMISSION_WINDOW, ContractArgs::new(), Some(self.sender()))
            .await?
            .unwrap_or_default();
        let window: [u8; 4] = output
            .get(..4)
            .and_then(|it| it.try_into().ok())
            .ok_or_else(|| RpcError::InvalidOutput {
                method: PROOF_SUBMISSION_WINDOW.to_string(),
                len: output.len(),
                expected: 4,
            })?;
        Ok(u32::from_le_bytes(window).into())
    }

    pub async fn latest_block_height(&self) -> Result<u64, RpcError> {
        let status: SyncStatus = self.raw_request(METHOD_SYNCING, Vec::new()).await?;
        Ok(status.highest_block)
    }

    pub async fn block_seed(&self, height: u64) -> Result<Vec<u8>, RpcError> {
        let block: BlockSummary = self
            .raw_request(METHOD_BLOCK_AT, vec![serde_json::Value::from(height)])
            .await?;
        let digits = block.seed.strip_prefix("0x").unwrap_or(&block.seed);
        Ok(hex::decode(digits).map_err(|source| TransportError::Hex {
            field: "seed",
            source,
        })?)
    }

    /// Fails while `height` has not been mined yet.
    pub async fn provable_seed(&self, height: u64) -> Result<Option<Vec<u8>>, RpcError> {
        let args = ContractArgs::new().height(height)?;
        self.estimate_call(NEED_PROOF, args, Some(self.sender()))
            .await
    }

    /// Dry-runs the submission first so a proof the contract would reject
    /// never costs a fee.
    pub async fn submit_proof(&self, height: u64, proof: &[u8]) -> Result<String, RpcError> {
        let args = ContractArgs::new().height(height)?.hex(proof);

        self.estimate_call(FLIP_COIN, args.clone(), Some(self.sender()))
            .await?;
        debug!(height, "proof accepted by estimate, submitting");

        let tx_hash = self
            .execute_call(FLIP_COIN, args, Some(self.sender()), self.max_fee)
            .await
            .map_err(|source| RpcError::Submission {
                height,
                source: Box::new(source),
            })?;
        info!(height, %tx_hash, "submitted proof");
        Ok(tx_hash)
    }

    fn sender(&self) -> &str {
        &self.endpoint.sender
    }

    fn contract_call(
        &self,
        method: &str,
        args: ContractArgs,
        sender: Option<&str>,
        max_fee: Option<u64>,
    ) -> ContractCall {
        ContractCall {
            from: sender.map(str::to_string),
            contract: self.endpoint.contract.clone(),
            method: method.to_string(),
            args,
            max_fee,
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        call: &ContractCall,
    ) -> Result<R, RpcError> {
        let params = serde_json::to_value(call).map_err(TransportError::Encode)?;
        self.raw_request(method, vec![params]).await
    }

    async fn raw_request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<R, RpcError> {
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            jsonrpc: JSON_RPC_VERSION,
            method: method.to_string(),
            key: self.endpoint.rpc_key.clone(),
            params,
        };
        let body = self.transport.send(&request).await?;
        RpcResponse::<R>::decode(method, &body)?.into_result(method)
    }
}

impl<TransportT> BlockSeedSource for ContractClient<TransportT>
where
    TransportT: RpcTransport + Sync,
{
    async fn latest_block_height(&self) -> Result<u64, RpcError> {
        ContractClient::latest_block_height(self).await
    }

    async fn block_seed(&self, height: u64) -> Result<Vec<u8>, RpcError> {
        ContractClient::block_seed(self, height).await
    }
}

impl<TransportT> RoundProvider for ContractClient<TransportT>
where
    TransportT: RpcTransport + Sync,
{
    async fn submission_window(&self) -> Result<u64, RpcError> {
        ContractClient::submission_window(self).await
    }

    async fn provable_seed(&self, height: u64) -> Result<Option<Vec<u8>>, RpcError> {
        ContractClient::provable_seed(self, height).await
    }

    async fn submit_proof(&self, height: u64, proof: &[u8]) -> Result<String, RpcError> {
        ContractClient::submit_proof(self, height, proof).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde::Serialize;
    use serde_json::{json, Value};

    use super::*;

    const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
    const SENDER: &str = "0x2222222222222222222222222222222222222222";

    /// Fixed ("canned") responses to JSON-RPC methods, served in order per
    /// method. Every request is recorded.
    #[derive(Default)]
    struct Canned {
        method2responses: Mutex<BTreeMap<String, VecDeque<Value>>>,
        requests: Mutex<Vec<RpcRequest>>,
    }

    impl Canned {
        fn new() -> Self {
            Self::default()
        }

        fn respond(self, method: &str, response: impl Serialize) -> Self {
            self.method2responses
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(serde_json::to_value(response).expect("serialization failure"));
            self
        }

        fn estimate(self, success: bool, error: &str, output: &str) -> Self {
            self.respond(
                METHOD_ESTIMATE_CALL,
                json!({
                    "id": 1,
                    "jsonrpc": "2.0",
                    "result": {
                        "success": success,
                        "error": error,
                        "actionResult": {"outputData": output},
                    },
                }),
            )
        }

        fn calls(&self, method: &str) -> Vec<ContractCall> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|it| it.method == method)
                .map(|it| serde_json::from_value(it.params[0].clone()).unwrap())
                .collect()
        }

        fn into_client(self) -> ContractClient<Canned> {
            ContractClient::new(
                self,
                EndpointConfig::new(
                    "http://localhost:9009".parse().unwrap(),
                    "node-key".into(),
                    SENDER.into(),
                    CONTRACT.into(),
                )
                .unwrap(),
            )
        }
    }

    impl RpcTransport for Canned {
        async fn send(&self, request: &RpcRequest) -> Result<Bytes, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            let response = self
                .method2responses
                .lock()
                .unwrap()
                .get_mut(&request.method)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| panic!("method {} not implemented", request.method));
            Ok(Bytes::from(serde_json::to_vec(&response).unwrap()))
        }
    }

    #[tokio::test]
    async fn request_envelope_carries_key_and_call() {
        let client = Canned::new().estimate(true, "", "0x").into_client();
        client.provable_seed(95).await.unwrap();

        let requests = client.transport.requests.lock().unwrap();
        let request = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(
            request,
            json!({
                "id": 1,
                "jsonrpc": "2.0",
                "method": "contract_estimateCall",
                "key": "node-key",
                "params": [{
                    "from": SENDER,
                    "contract": CONTRACT,
                    "method": "needProof",
                    "args": [{"index": 0, "format": "int64", "value": "95"}],
                }],
            })
        );
    }

    #[tokio::test]
    async fn provable_seed_is_none_without_output() {
        let client = Canned::new().estimate(true, "", "0x").into_client();
        assert_eq!(client.provable_seed(95).await.unwrap(), None);
    }

    #[tokio::test]
    async fn provable_seed_returns_seed_bytes() {
        let client = Canned::new().estimate(true, "", "0xc0ffee").into_client();
        assert_eq!(
            client.provable_seed(96).await.unwrap(),
            Some(vec![0xc0, 0xff, 0xee])
        );
    }

    #[tokio::test]
    async fn provable_seed_fails_for_unmined_block() {
        let client = Canned::new()
            .estimate(false, "Block height must be in the past", "")
            .into_client();
        assert!(matches!(
            client.provable_seed(1_000).await,
            Err(RpcError::ContractExecution { .. })
        ));
    }

    #[tokio::test]
    async fn provable_seed_fails_on_application_error() {
        let client = Canned::new()
            .respond(
                METHOD_ESTIMATE_CALL,
                json!({"error": {"code": -32000, "message": "contract not found"}}),
            )
            .into_client();
        assert!(matches!(
            client.provable_seed(96).await,
            Err(RpcError::Application { code: -32000, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_output_is_a_transport_error() {
        let client = Canned::new().estimate(true, "", "0xzz").into_client();
        assert!(matches!(
            client.provable_seed(96).await,
            Err(RpcError::Transport(TransportError::Hex { .. }))
        ));
    }

    #[tokio::test]
    async fn submission_window_is_little_endian_u32() {
        let client = Canned::new().estimate(true, "", "0x64000000").into_client();
        assert_eq!(client.submission_window().await.unwrap(), 100);

        let calls = client.transport.calls(METHOD_ESTIMATE_CALL);
        assert_eq!(calls[0].method, "proofSubmissionWindow");
        assert!(calls[0].args.is_empty());
    }

    #[tokio::test]
    async fn short_submission_window_output_is_rejected() {
        let client = Canned::new().estimate(true, "", "0x64").into_client();
        assert!(matches!(
            client.submission_window().await,
            Err(RpcError::InvalidOutput { len: 1, .. })
        ));
    }

    #[tokio::test]
    async fn latest_block_height_reads_highest_block() {
        let client = Canned::new()
            .respond(
                METHOD_SYNCING,
                json!({"result": {"syncing": false, "currentBlock": 99, "highestBlock": 100}}),
            )
            .into_client();
        assert_eq!(client.latest_block_height().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn block_seed_is_hex_decoded() {
        let client = Canned::new()
            .respond(
                METHOD_BLOCK_AT,
                json!({"result": {"height": 42, "hash": "0xaa", "seed": "0x0102"}}),
            )
            .into_client();
        assert_eq!(client.block_seed(42).await.unwrap(), vec![1, 2]);

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests[0].params, vec![json!(42)]);
    }

    #[tokio::test]
    async fn unknown_block_is_missing_result() {
        let client = Canned::new()
            .respond(METHOD_BLOCK_AT, json!({"result": null}))
            .into_client();
        assert!(matches!(
            client.block_seed(42).await,
            Err(RpcError::Transport(TransportError::MissingResult { .. }))
        ));
    }

    #[tokio::test]
    async fn submit_proof_estimates_then_executes() {
        let client = Canned::new()
            .estimate(true, "", "0x")
            .respond(METHOD_CALL, json!({"result": "0xdeadbeef"}))
            .into_client()
            .with_max_fee(2_500);

        let tx_hash = client.submit_proof(96, &[0xab; 4]).await.unwrap();
        assert_eq!(tx_hash, "0xdeadbeef");

        let estimates = client.transport.calls(METHOD_ESTIMATE_CALL);
        let executions = client.transport.calls(METHOD_CALL);
        assert_eq!(estimates.len(), 1);
        assert_eq!(executions.len(), 1);
        assert_eq!(estimates[0].args, executions[0].args);
        assert_eq!(estimates[0].max_fee, None);
        assert_eq!(executions[0].max_fee, Some(2_500));
        assert_eq!(executions[0].method, "flipCoin");
        assert_eq!(executions[0].args.as_slice()[1].value, "0xabababab");
    }

    #[tokio::test]
    async fn rejected_estimate_never_executes() {
        let client = Canned::new()
            .estimate(false, "Invalid VRF proof", "")
            .into_client();

        let err = client.submit_proof(96, &[0u8; 81]).await.unwrap_err();
        assert!(matches!(err, RpcError::ContractExecution { .. }));
        assert!(client.transport.calls(METHOD_CALL).is_empty());
    }

    #[tokio::test]
    async fn failed_execution_is_a_submission_error() {
        let client = Canned::new()
            .estimate(true, "", "0x")
            .respond(
                METHOD_CALL,
                json!({"error": {"code": -32000, "message": "insufficient funds"}}),
            )
            .into_client();

        assert!(matches!(
            client.submit_proof(96, &[0u8; 81]).await,
            Err(RpcError::Submission { height: 96, .. })
        ));
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let client = Canned::new()
            .estimate(true, "", "0x")
            .estimate(true, "", "0x")
            .into_client();
        client.provable_seed(1).await.unwrap();
        client.provable_seed(2).await.unwrap();

        let ids: Vec<_> = client
            .transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|it| it.id)
            .collect();
        assert_eq!(ids, [1, 2]);
    }
}
