//! Legacy (EIP-155) transaction encoding.
//!
//! A transaction is RLP-encoded with `(chain_id, 0, 0)` in place of the
//! signature to produce the signing hash, then re-encoded with `(v, r, s)`
//! for submission. The raw bytes are what `eth_sendRawTransaction` takes;
//! re-sending the same bytes is idempotent on the node.

use crate::record::Identity;

use super::keccak256;
use super::signer::RecoverableSignature;

/// An unsigned legacy transaction bound to a chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Identity,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// RLP payload that is hashed for signing.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.common_fields();
        rlp_uint(&mut fields, u128::from(self.chain_id));
        rlp_uint(&mut fields, 0);
        rlp_uint(&mut fields, 0);
        rlp_list(&fields)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    /// Raw signed transaction ready for submission.
    pub fn encode_signed(&self, signature: &RecoverableSignature) -> Vec<u8> {
        let v = u128::from(signature.recovery_id) + u128::from(self.chain_id) * 2 + 35;
        let mut fields = self.common_fields();
        rlp_uint(&mut fields, v);
        rlp_bytes(&mut fields, strip_leading_zeros(&signature.r));
        rlp_bytes(&mut fields, strip_leading_zeros(&signature.s));
        rlp_list(&fields)
    }

    fn common_fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.data.len());
        rlp_uint(&mut out, u128::from(self.nonce));
        rlp_uint(&mut out, self.gas_price);
        rlp_uint(&mut out, u128::from(self.gas_limit));
        rlp_bytes(&mut out, self.to.as_bytes());
        rlp_uint(&mut out, self.value);
        rlp_bytes(&mut out, &self.data);
        out
    }
}

/// Transaction hash of raw signed bytes, `0x`-prefixed.
pub fn transaction_hash(raw: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(raw)))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn rlp_uint(out: &mut Vec<u8>, value: u128) {
    let be = value.to_be_bytes();
    rlp_bytes(out, strip_leading_zeros(&be));
}

fn rlp_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    match bytes {
        [b] if *b < 0x80 => out.push(*b),
        _ => {
            rlp_length_prefix(out, 0x80, bytes.len());
            out.extend_from_slice(bytes);
        }
    }
}

fn rlp_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    rlp_length_prefix(&mut out, 0xc0, payload.len());
    out.extend_from_slice(payload);
    out
}

fn rlp_length_prefix(out: &mut Vec<u8>, offset: u8, len: usize) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let len_be = (len as u64).to_be_bytes();
        let len_bytes = strip_leading_zeros(&len_be);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}
