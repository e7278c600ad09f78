mod common;

use coinflip_prover::provider::ContractClient;
use coinflip_prover::simulate::simulate;
use coinflip_vrf::KeyPair;
use common::{endpoint, seed_of, FakeNode};

#[tokio::test]
async fn records_a_verifiable_line_per_block() {
    let oracle = KeyPair::generate();
    let node = FakeNode::new(oracle.public_key(), 40, 5);
    let client = ContractClient::new(node, endpoint());

    let mut log = Vec::new();
    let tally = simulate(&client, &oracle, &mut log, 21).await.unwrap();
    assert_eq!(tally.total(), 20);
    assert_eq!(tally.outcome0 + tally.outcome1, 20);

    let log = String::from_utf8(log).unwrap();
    let mut heights = Vec::new();
    let mut zeros = 0;
    for line in log.lines() {
        let (fields, outcome) = line.split_once(" = ").unwrap();
        let fields: Vec<_> = fields.split(' ').collect();
        let height: u64 = fields[0].parse().unwrap();
        assert_eq!(fields[1], format!("0x{}", hex::encode(seed_of(height))));

        let proof = hex::decode(fields[2]).unwrap();
        assert!(coinflip_vrf::verify(&oracle.public_key(), &proof, &seed_of(height)));
        let hash = coinflip_vrf::proof_to_hash(&proof).unwrap();
        assert_eq!(outcome, coinflip_vrf::outcome(&hash).to_string());
        if outcome == "0" {
            zeros += 1;
        }
        heights.push(height);
    }
    assert_eq!(heights, (21..=40).rev().collect::<Vec<_>>());
    assert_eq!(tally.outcome0, zeros);
    assert_eq!(tally.percentage(), zeros as f64 / 20.0 * 100.0);
}
