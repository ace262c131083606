//! Signed transactions: RLP layout, EIP-155 signing hashes, and sender
//! recovery.

use crate::{SignatureError, SignatureResult};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use ember_rlp::{encode, Decodable, Encodable, Item, RlpError, RlpResult};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// A signed transaction. `to = None` signals contract creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// Sender nonce at the time of signing.
    pub nonce: u64,
    /// Wei paid per unit of gas.
    pub gas_price: U256,
    /// Maximum gas the transaction may consume.
    pub gas_limit: u64,
    /// Recipient, or `None` to create a contract.
    pub to: Option<Address>,
    /// Wei transferred to the recipient or endowed to the new contract.
    pub value: U256,
    /// Call data, or initialization code for creations.
    pub data: Bytes,
    /// Signature recovery value, chain-id-folded per EIP-155.
    pub v: u64,
    /// Signature `r` scalar.
    pub r: U256,
    /// Signature `s` scalar.
    pub s: U256,
}

impl Transaction {
    /// True for contract-creation transactions.
    pub const fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// The transaction hash: Keccak-256 of the signed RLP.
    pub fn hash(&self) -> B256 {
        keccak256(self.rlp_bytes())
    }

    /// The hash covered by the signature: the first six fields, extended with
    /// `(chain_id, 0, 0)` when signing under EIP-155 replay protection.
    pub fn signing_hash(&self, chain_id: Option<u64>) -> B256 {
        let mut fields = self.unsigned_fields();
        if let Some(chain_id) = chain_id {
            fields.push(chain_id.to_rlp());
            fields.push(Item::empty());
            fields.push(Item::empty());
        }
        keccak256(encode(&Item::list(fields)))
    }

    /// The chain id folded into `v`, or `None` for pre-EIP-155 signatures.
    pub const fn chain_id(&self) -> Option<u64> {
        if self.v >= 35 {
            Some((self.v - 35) / 2)
        } else {
            None
        }
    }

    /// Recovers the sender address from the signature.
    pub fn recover_sender(&self) -> SignatureResult<Address> {
        let parity = match self.v {
            27 | 28 => (self.v - 27) as u8,
            v if v >= 35 => ((v - 35) % 2) as u8,
            v => return Err(SignatureError::InvalidV(v)),
        };
        let prehash = self.signing_hash(self.chain_id());

        let mut scalars = [0u8; 64];
        scalars[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        scalars[32..].copy_from_slice(&self.s.to_be_bytes::<32>());
        let signature =
            Signature::from_slice(&scalars).map_err(|_| SignatureError::InvalidSignature)?;
        let recovery_id =
            RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidSignature)?;

        let verifying_key =
            VerifyingKey::recover_from_prehash(prehash.as_slice(), &signature, recovery_id)
                .map_err(|_| SignatureError::RecoveryFailed)?;
        Ok(public_key_to_address(&verifying_key))
    }

    /// Signs the transaction in place with `key`, folding `chain_id` into `v`
    /// per EIP-155 when given.
    pub fn sign(&mut self, key: &SigningKey, chain_id: Option<u64>) -> SignatureResult<()> {
        let prehash = self.signing_hash(chain_id);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(prehash.as_slice())
            .map_err(|_| SignatureError::RecoveryFailed)?;

        let parity = recovery_id.to_byte() as u64;
        self.v = match chain_id {
            Some(chain_id) => parity + 35 + chain_id * 2,
            None => parity + 27,
        };
        self.r = U256::from_be_slice(&signature.r().to_bytes());
        self.s = U256::from_be_slice(&signature.s().to_bytes());
        Ok(())
    }

    fn unsigned_fields(&self) -> Vec<Item> {
        vec![
            self.nonce.to_rlp(),
            self.gas_price.to_rlp(),
            self.gas_limit.to_rlp(),
            self.to.map_or(Item::empty(), |to| to.to_rlp()),
            self.value.to_rlp(),
            self.data.to_rlp(),
        ]
    }
}

/// The address owning a public key: the low 20 bytes of the Keccak-256 of the
/// uncompressed point.
pub(crate) fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

impl Encodable for Transaction {
    fn to_rlp(&self) -> Item {
        let mut fields = self.unsigned_fields();
        fields.push(self.v.to_rlp());
        fields.push(self.r.to_rlp());
        fields.push(self.s.to_rlp());
        Item::list(fields)
    }
}

impl Decodable for Transaction {
    fn from_rlp(item: &Item) -> RlpResult<Self> {
        let fields = item.as_list()?;
        if fields.len() != 9 {
            return Err(RlpError::UnexpectedLength);
        }
        let to = if fields[3].is_empty_bytes() {
            None
        } else {
            Some(Address::from_rlp(&fields[3])?)
        };
        Ok(Self {
            nonce: u64::from_rlp(&fields[0])?,
            gas_price: U256::from_rlp(&fields[1])?,
            gas_limit: u64::from_rlp(&fields[2])?,
            to,
            value: U256::from_rlp(&fields[4])?,
            data: Bytes::from_rlp(&fields[5])?,
            v: u64::from_rlp(&fields[6])?,
            r: U256::from_rlp(&fields[7])?,
            s: U256::from_rlp(&fields[8])?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::{address, b256, uint};

    /// The worked example from the EIP-155 specification.
    fn eip155_example() -> Transaction {
        Transaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21000,
            to: Some(address!("3535353535353535353535353535353535353535")),
            value: U256::from(10u64.pow(18)),
            data: Bytes::new(),
            v: 0,
            r: U256::ZERO,
            s: U256::ZERO,
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        assert_eq!(
            eip155_example().signing_hash(Some(1)),
            b256!("daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53")
        );
    }

    #[test]
    fn test_eip155_recover() {
        let mut tx = eip155_example();
        tx.v = 37;
        tx.r = uint!(18515461264373351373200002665853028612451056578545711640558177340181847433846_U256);
        tx.s = uint!(46948507304638947509940763649030358759909902576025900602547168820602576006531_U256);
        assert_eq!(tx.chain_id(), Some(1));
        assert_eq!(
            tx.recover_sender().unwrap(),
            address!("9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f")
        );
    }

    #[test]
    fn test_sign_then_recover() {
        let key = SigningKey::from_slice(&[0x46u8; 32]).unwrap();
        let expected = public_key_to_address(key.verifying_key());

        let mut tx = eip155_example();
        tx.sign(&key, Some(1)).unwrap();
        assert_eq!(tx.recover_sender().unwrap(), expected);

        // Legacy (pre-EIP-155) signatures recover as well.
        let mut legacy = eip155_example();
        legacy.sign(&key, None).unwrap();
        assert!(matches!(legacy.v, 27 | 28));
        assert_eq!(legacy.recover_sender().unwrap(), expected);
    }

    #[test]
    fn test_roundtrip() {
        let mut tx = eip155_example();
        tx.v = 37;
        tx.r = U256::from(1);
        tx.s = U256::from(2);
        assert_eq!(Transaction::decode_bytes(&tx.rlp_bytes()).unwrap(), tx);

        let creation = Transaction { to: None, data: Bytes::from_static(&[0x60, 0x00]), ..tx };
        assert_eq!(Transaction::decode_bytes(&creation.rlp_bytes()).unwrap(), creation);
    }

    #[test]
    fn test_invalid_v_rejected() {
        let tx = eip155_example();
        assert_eq!(tx.recover_sender(), Err(SignatureError::InvalidV(0)));
    }
}
