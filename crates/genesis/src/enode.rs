//! Enode URLs, the bootstrap peer addressing format.

use crate::SpecError;
use alloy_primitives::{hex, B512};
use core::str::FromStr;
use std::net::SocketAddr;

/// A parsed `enode://<node-id-hex>@<host>:<port>` URL. The node id is the
/// 64-byte uncompressed secp256k1 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enode {
    /// The remote node's public key.
    pub id: B512,
    /// The remote node's UDP/TCP endpoint.
    pub addr: SocketAddr,
}

impl FromStr for Enode {
    type Err = SpecError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = || SpecError::InvalidEnode(url.to_string());

        let rest = url.strip_prefix("enode://").ok_or_else(invalid)?;
        let (id_hex, addr) = rest.split_once('@').ok_or_else(invalid)?;

        let id_bytes: [u8; 64] =
            hex::decode(id_hex).map_err(|_| invalid())?.try_into().map_err(|_| invalid())?;
        let addr = addr.parse().map_err(|_| invalid())?;

        Ok(Self { id: B512::new(id_bytes), addr })
    }
}

impl core::fmt::Display for Enode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "enode://{}@{}", hex::encode(self.id), self.addr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let url = "enode://a979fb575495b8d6db44f750317d0f4622bf4c2aa3365d6af7c284339968eef29b69ad0dce72a4d8db5ebb4968de0e3bec910127f134779fbcb0cb6d3331163c@52.16.188.185:30303";
        let enode: Enode = url.parse().unwrap();
        assert_eq!(enode.addr.port(), 30303);
        assert_eq!(enode.to_string(), url);
    }

    #[test]
    fn test_reject_malformed() {
        assert!("enode://deadbeef@1.2.3.4:30303".parse::<Enode>().is_err());
        assert!("http://example.com".parse::<Enode>().is_err());
        assert!("enode://zz@1.2.3.4:30303".parse::<Enode>().is_err());
    }

    #[test]
    fn test_presets_parse() {
        for spec in [crate::ChainSpec::mainnet(), crate::ChainSpec::ropsten()] {
            for url in &spec.bootnodes {
                url.parse::<Enode>().unwrap();
            }
        }
    }
}
