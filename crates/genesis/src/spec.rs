//! Per-chain specifications and the built-in presets.

use crate::{Fork, ForkSchedule, SpecError, SpecResult};
use alloy_primitives::{b256, b64, hex, Bytes, B256, B64, U256};
use ember_primitives::Header;
use serde::{Deserialize, Serialize};

/// Wei per ether.
const ETHER: u64 = 1_000_000_000_000_000_000;

/// Genesis block parameters. Fields absent from the header (`parent_hash`,
/// roots of empty tries, zero bloom) are fixed by consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    /// Genesis difficulty.
    pub difficulty: U256,
    /// Genesis gas limit.
    pub gas_limit: u64,
    /// Genesis timestamp.
    pub timestamp: u64,
    /// Genesis extra data, at most 32 bytes.
    pub extra_data: Bytes,
    /// Genesis seal nonce.
    pub nonce: B64,
    /// Genesis seal mix hash.
    pub mix_hash: B256,
    /// Root of the allocated genesis state.
    pub state_root: B256,
}

/// Everything the node needs to know about a chain: identity, fork schedule,
/// genesis parameters, and where to find the first peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Human-readable chain name.
    pub name: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Fork activation table.
    pub forks: ForkSchedule,
    /// The floor the difficulty formula clamps to.
    pub min_difficulty: U256,
    /// Genesis parameters.
    pub genesis: Genesis,
    /// Bootstrap enode URLs.
    pub bootnodes: Vec<String>,
}

impl ChainSpec {
    /// Resolves a preset by name, the `--chain` contract.
    pub fn by_name(name: &str) -> SpecResult<Self> {
        match name {
            "mainnet" => Ok(Self::mainnet()),
            "ropsten" => Ok(Self::ropsten()),
            other => Err(SpecError::UnknownChain(other.to_string())),
        }
    }

    /// Parses a specification from JSON.
    pub fn from_json(json: &str) -> SpecResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The era in force at block `number`.
    pub fn fork_at(&self, number: u64) -> Fork {
        self.forks.fork_at(number)
    }

    /// The static block reward for a block governed by `fork`: 5 ether until
    /// Byzantium, 3 until Constantinople, 2 after.
    pub fn block_reward(&self, fork: Fork) -> U256 {
        let ether = U256::from(ETHER);
        if fork.at_least(Fork::Constantinople) {
            ether * U256::from(2u64)
        } else if fork.at_least(Fork::Byzantium) {
            ether * U256::from(3u64)
        } else {
            ether * U256::from(5u64)
        }
    }

    /// Materializes the genesis header.
    pub fn genesis_header(&self) -> Header {
        Header {
            state_root: self.genesis.state_root,
            difficulty: self.genesis.difficulty,
            gas_limit: self.genesis.gas_limit,
            timestamp: self.genesis.timestamp,
            extra_data: self.genesis.extra_data.clone(),
            mix_hash: self.genesis.mix_hash,
            nonce: self.genesis.nonce,
            ..Default::default()
        }
    }

    /// The Ethereum main network.
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            chain_id: 1,
            forks: ForkSchedule {
                homestead: Some(1_150_000),
                tangerine: Some(2_463_000),
                spurious_dragon: Some(2_675_000),
                byzantium: Some(4_370_000),
                constantinople: Some(7_280_000),
                petersburg: Some(7_280_000),
                istanbul: Some(9_069_000),
            },
            min_difficulty: U256::from(131_072u64),
            genesis: Genesis {
                difficulty: U256::from(17_179_869_184u64),
                gas_limit: 5000,
                timestamp: 0,
                extra_data: hex!(
                    "11bbe8db4e347b4e8c937c1c8370e4b5ed33adb3db69cbdb7a38e1e50b1b82fa"
                )
                .to_vec()
                .into(),
                nonce: b64!("0000000000000042"),
                mix_hash: B256::ZERO,
                state_root: b256!(
                    "d7f8974fb5ac78d9ac099b9ad5018bedc2ce0a72dad1827a1709da30580f0544"
                ),
            },
            bootnodes: vec![
                "enode://a979fb575495b8d6db44f750317d0f4622bf4c2aa3365d6af7c284339968eef29b69ad0dce72a4d8db5ebb4968de0e3bec910127f134779fbcb0cb6d3331163c@52.16.188.185:30303".to_string(),
                "enode://aa36fdf33dd030378a0168efe6ed7d5cc587fafa3cdd375854fe735a2e11ea3650ba29644e2db48368c46e1f60e716300ba49396cd63778bf8a818c09bded46f@13.93.211.84:30303".to_string(),
                "enode://78de8a0916848093c73790ead81d1928bec737d565119932b98c6b100d944b7a95e94f847f689fc723399d2e31129d182f7ef3863f2b4c820abbf3ab2722344d@191.235.84.50:30303".to_string(),
            ],
        }
    }

    /// The Ropsten proof-of-work test network.
    pub fn ropsten() -> Self {
        Self {
            name: "ropsten".to_string(),
            chain_id: 3,
            forks: ForkSchedule {
                homestead: Some(0),
                tangerine: Some(0),
                spurious_dragon: Some(10),
                byzantium: Some(1_700_000),
                constantinople: Some(4_230_000),
                petersburg: Some(4_939_394),
                istanbul: Some(6_485_846),
            },
            min_difficulty: U256::from(131_072u64),
            genesis: Genesis {
                difficulty: U256::from(1_048_576u64),
                gas_limit: 16_777_216,
                timestamp: 0,
                extra_data: hex!(
                    "3535353535353535353535353535353535353535353535353535353535353535"
                )
                .to_vec()
                .into(),
                nonce: b64!("0000000000000042"),
                mix_hash: B256::ZERO,
                state_root: b256!(
                    "217b0bbcfb72e2d57e28f33cb361b9983513177755dc3f33ce3e7022ed62b77b"
                ),
            },
            bootnodes: vec![
                "enode://30b7ab30a01c124a6cceca36863ece12c4f5fa68e3ba9b0b51407ccc002eeed3b3102d20a88f1c1d3c3154e2449317b8ef95090e77b312d5cc39354f86d5d606@52.176.7.10:30303".to_string(),
                "enode://865a63255b3bb68023b6bffd5095118fcc13e79dcf014fe4e47e065c350c7cc72af2e53eff895f11ba1bbb6a2b33271c1116ee870f266618eadfc2e78aa7349c@52.176.100.77:30303".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ember_primitives::{EMPTY_OMMERS_HASH, EMPTY_ROOT_HASH};

    #[test]
    fn test_mainnet_genesis_hash() {
        let header = ChainSpec::mainnet().genesis_header();
        assert_eq!(header.ommers_hash, EMPTY_OMMERS_HASH);
        assert_eq!(header.transactions_root, EMPTY_ROOT_HASH);
        assert_eq!(
            header.hash(),
            b256!("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3")
        );
    }

    #[test]
    fn test_ropsten_genesis_hash() {
        let header = ChainSpec::ropsten().genesis_header();
        assert_eq!(
            header.hash(),
            b256!("41941023680923e0fe4d74a34bdac8141f2540e3ae90623718e47d66d1ca4a2d")
        );
    }

    #[test]
    fn test_block_reward_eras() {
        let spec = ChainSpec::mainnet();
        assert_eq!(spec.block_reward(Fork::Homestead), U256::from(5u64) * U256::from(ETHER));
        assert_eq!(spec.block_reward(Fork::Byzantium), U256::from(3u64) * U256::from(ETHER));
        assert_eq!(spec.block_reward(Fork::Istanbul), U256::from(2u64) * U256::from(ETHER));
    }

    #[test]
    fn test_unknown_chain_rejected() {
        assert!(matches!(
            ChainSpec::by_name("goerli"),
            Err(SpecError::UnknownChain(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let spec = ChainSpec::ropsten();
        let json = serde_json::to_string(&spec).unwrap();
        let parsed = ChainSpec::from_json(&json).unwrap();
        assert_eq!(parsed.chain_id, spec.chain_id);
        assert_eq!(parsed.genesis_header().hash(), spec.genesis_header().hash());
    }
}
