use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use coinflip_prover::endpoint::EndpointConfig;
use coinflip_prover::rpc::{ContractCall, RpcRequest, RpcTransport, TransportError};
use coinflip_vrf::PublicKey;
use serde_json::{json, Value};

pub const RPC_KEY: &str = "node-key";
pub const CONTRACT: &str = "0x00000000000000000000000000000000000c0171";
pub const SENDER: &str = "0x000000000000000000000000000000000000a11c";

pub fn endpoint() -> EndpointConfig {
    EndpointConfig::new(
        "http://127.0.0.1:9009".parse().unwrap(),
        RPC_KEY.to_string(),
        SENDER.to_string(),
        CONTRACT.to_string(),
    )
    .unwrap()
}

/// Seed of block `height` on the fake chain.
pub fn seed_of(height: u64) -> Vec<u8> {
    let mut seed = height.to_be_bytes().to_vec();
    seed.extend_from_slice(b"coinflip");
    seed
}

#[derive(Debug, Default)]
pub struct Chain {
    pub head: u64,
    pub window: u32,
    /// Heights whose round waits for a proof.
    pub pending: BTreeSet<u64>,
    /// Accepted `flipCoin` executions as `(height, proof, max fee)`.
    pub settled: Vec<(u64, Vec<u8>, Option<u64>)>,
    pub rejected_estimates: usize,
}

/// In-process node running the coin-flip contract. Proofs are checked with
/// the real verifier against `oracle`.
#[derive(Clone)]
pub struct FakeNode {
    oracle: PublicKey,
    pub chain: Arc<Mutex<Chain>>,
}

impl FakeNode {
    pub fn new(oracle: PublicKey, head: u64, window: u32) -> Self {
        Self {
            oracle,
            chain: Arc::new(Mutex::new(Chain {
                head,
                window,
                ..Chain::default()
            })),
        }
    }

    pub fn with_pending(self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.chain.lock().unwrap().pending.extend(heights);
        self
    }

    pub fn mine(&self, pending: bool) -> u64 {
        let mut chain = self.chain.lock().unwrap();
        chain.head += 1;
        let head = chain.head;
        if pending {
            chain.pending.insert(head);
        }
        head
    }

    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, (i64, String)> {
        let mut chain = self.chain.lock().unwrap();
        match method {
            "bcn_syncing" => Ok(json!({
                "syncing": false,
                "currentBlock": chain.head,
                "highestBlock": chain.head,
            })),
            "bcn_blockAt" => {
                let height = params[0].as_u64().unwrap();
                if height > chain.head {
                    return Ok(Value::Null);
                }
                Ok(json!({
                    "height": height,
                    "seed": format!("0x{}", hex::encode(seed_of(height))),
                }))
            }
            "contract_estimateCall" => {
                let call: ContractCall = serde_json::from_value(params[0].clone()).unwrap();
                assert_eq!(call.contract, CONTRACT);
                assert!(call.max_fee.is_none());
                let outcome = self.estimate(&chain, &call);
                if !outcome["success"].as_bool().unwrap() {
                    chain.rejected_estimates += 1;
                }
                Ok(outcome)
            }
            "contract_call" => {
                let call: ContractCall = serde_json::from_value(params[0].clone()).unwrap();
                assert_eq!(call.method, "flipCoin");
                assert_eq!(call.from.as_deref(), Some(SENDER));
                let args = call.args.as_slice();
                let height = args[0].as_int64().unwrap() as u64;
                let proof = args[1].as_bytes().unwrap();
                chain.pending.remove(&height);
                chain.settled.push((height, proof, call.max_fee));
                Ok(json!(format!("0x{:064x}", height)))
            }
            other => Err((-32601, format!("method {other} not found"))),
        }
    }

    fn estimate(&self, chain: &Chain, call: &ContractCall) -> Value {
        let args = call.args.as_slice();
        match call.method.as_str() {
            "proofSubmissionWindow" => success(&chain.window.to_le_bytes()),
            "needProof" => {
                let height = args[0].as_int64().unwrap() as u64;
                if height > chain.head {
                    failure("block height must be in the past")
                } else if chain.pending.contains(&height) {
                    success(&seed_of(height))
                } else {
                    success(&[])
                }
            }
            "flipCoin" => {
                let height = args[0].as_int64().unwrap() as u64;
                let proof = args[1].as_bytes().unwrap();
                if !chain.pending.contains(&height) {
                    failure("no pending round")
                } else if !coinflip_vrf::verify(&self.oracle, &proof, &seed_of(height)) {
                    failure("invalid proof")
                } else {
                    success(&[])
                }
            }
            other => failure(&format!("unknown method {other}")),
        }
    }
}

fn success(output: &[u8]) -> Value {
    json!({
        "success": true,
        "actionResult": { "outputData": format!("0x{}", hex::encode(output)) },
    })
}

fn failure(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

impl RpcTransport for FakeNode {
    async fn send(&self, request: &RpcRequest) -> Result<Bytes, TransportError> {
        assert_eq!(request.jsonrpc, "2.0");
        let body = if request.key != RPC_KEY {
            json!({ "id": request.id, "error": { "code": -32600, "message": "access denied" } })
        } else {
            match self.handle(&request.method, &request.params) {
                Ok(result) => json!({ "id": request.id, "jsonrpc": "2.0", "result": result }),
                Err((code, message)) => {
                    json!({ "id": request.id, "error": { "code": code, "message": message } })
                }
            }
        };
        Ok(Bytes::from(body.to_string()))
    }
}
