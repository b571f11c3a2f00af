//! Minimal Solidity ABI codec for the registry's call and return types.
//!
//! Only the types the registry uses are supported: `uint256` (values must fit
//! in a `u64`), `address`, `bool`, `string` and `uint256[]`.

use crate::error::{MedproofError, Result};
use crate::record::Identity;

use super::keccak256;

const WORD: usize = 32;

pub const UPLOAD_FILE: &str = "uploadFile(string,string,string,string,uint256,address,string)";
pub const GET_FILE: &str = "getFile(uint256)";
pub const VERIFY_FILE: &str = "verifyFile(uint256,string,string)";
pub const GET_VERIFICATION_LOG: &str = "getVerificationLog(uint256)";
pub const GET_USER_FILES: &str = "getUserFiles(address)";
pub const GET_TOTAL_FILES: &str = "getTotalFiles()";
pub const GET_TOTAL_VERIFICATIONS: &str = "getTotalVerifications()";
pub const INVALIDATE_FILE: &str = "invalidateFile(uint256)";

pub const FILE_UPLOADED_EVENT: &str = "FileUploaded(uint256,address,string)";
pub const FILE_VERIFIED_EVENT: &str = "FileVerified(uint256,uint256,bool)";

/// A decoded or to-be-encoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u64),
    Address(Identity),
    Bool(bool),
    String(String),
    UintArray(Vec<u64>),
}

/// Expected type of a return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uint,
    Address,
    Bool,
    String,
    UintArray,
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::String(_) | Self::UintArray(_))
    }

    pub fn into_uint(self) -> Result<u64> {
        match self {
            Self::Uint(v) => Ok(v),
            other => Err(unexpected("uint256", &other)),
        }
    }

    pub fn into_address(self) -> Result<Identity> {
        match self {
            Self::Address(a) => Ok(a),
            other => Err(unexpected("address", &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(unexpected("bool", &other)),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }

    pub fn into_uint_array(self) -> Result<Vec<u64>> {
        match self {
            Self::UintArray(v) => Ok(v),
            other => Err(unexpected("uint256[]", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Token) -> MedproofError {
    MedproofError::MalformedRecord(format!("expected {expected}, decoded {got:?}"))
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event with the given signature.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Calldata for `signature` applied to `tokens`.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

/// Head/tail encoding of a parameter tuple.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u64));
            tail.extend(encode_dynamic(token));
        } else {
            head.extend(encode_static(token));
        }
    }

    head.extend(tail);
    head
}

fn encode_static(token: &Token) -> [u8; WORD] {
    match token {
        Token::Uint(v) => uint_word(*v),
        Token::Bool(b) => uint_word(u64::from(*b)),
        Token::Address(a) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(a.as_bytes());
            word
        }
        Token::String(_) | Token::UintArray(_) => [0u8; WORD],
    }
}

fn encode_dynamic(token: &Token) -> Vec<u8> {
    match token {
        Token::String(s) => {
            let bytes = s.as_bytes();
            let mut out = uint_word(bytes.len() as u64).to_vec();
            out.extend_from_slice(bytes);
            out.resize(WORD + padded_len(bytes.len()), 0);
            out
        }
        Token::UintArray(values) => {
            let mut out = uint_word(values.len() as u64).to_vec();
            for v in values {
                out.extend(uint_word(*v));
            }
            out
        }
        other => encode_static(other).to_vec(),
    }
}

fn uint_word(v: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&v.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Decode return data into tokens of the given types.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let head = word_at(data, i * WORD)?;
            match ty {
                ParamType::Uint => Ok(Token::Uint(word_to_u64(head)?)),
                ParamType::Bool => Ok(Token::Bool(word_to_u64(head)? != 0)),
                ParamType::Address => {
                    let mut bytes = [0u8; 20];
                    bytes.copy_from_slice(&head[12..]);
                    Ok(Token::Address(Identity::from_bytes(bytes)))
                }
                ParamType::String => {
                    let offset = to_index(word_to_u64(head)?)?;
                    let len = to_index(word_to_u64(word_at(data, offset)?)?)?;
                    let start = offset + WORD;
                    let bytes = start.checked_add(len).and_then(|end| data.get(start..end)).ok_or_else(|| {
                        MedproofError::MalformedRecord("string runs past end of return data".into())
                    })?;
                    let s = String::from_utf8(bytes.to_vec()).map_err(|e| {
                        MedproofError::MalformedRecord(format!("string is not UTF-8: {e}"))
                    })?;
                    Ok(Token::String(s))
                }
                ParamType::UintArray => {
                    let offset = to_index(word_to_u64(head)?)?;
                    let len = to_index(word_to_u64(word_at(data, offset)?)?)?;
                    if len > data.len() / WORD {
                        return Err(MedproofError::MalformedRecord(format!(
                            "array length {len} exceeds return data"
                        )));
                    }
                    let values = (0..len)
                        .map(|j| word_to_u64(word_at(data, offset + WORD * (j + 1))?))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Token::UintArray(values))
                }
            }
        })
        .collect()
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
        MedproofError::MalformedRecord(format!(
            "return data too short: need word at {offset}, have {} bytes",
            data.len()
        ))
    })
}

/// Read a big-endian word that must fit in 64 bits.
pub fn word_to_u64(word: &[u8]) -> Result<u64> {
    let (high, low) = word.split_at(word.len().saturating_sub(8));
    if high.iter().any(|b| *b != 0) {
        return Err(MedproofError::MalformedRecord(
            "uint256 value exceeds 64 bits".into(),
        ));
    }
    let mut buf = [0u8; 8];
    buf[8 - low.len()..].copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}

fn to_index(v: u64) -> Result<usize> {
    usize::try_from(v)
        .map_err(|_| MedproofError::MalformedRecord(format!("offset {v} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("baz(uint32,bool)")), "cdcd77c0");
    }

    #[test]
    fn test_static_call_encoding() {
        let data = encode_call("baz(uint32,bool)", &[Token::Uint(69), Token::Bool(true)]);
        assert_eq!(
            hex::encode(data),
            concat!(
                "cdcd77c0",
                "0000000000000000000000000000000000000000000000000000000000000045",
                "0000000000000000000000000000000000000000000000000000000000000001"
            )
        );
    }

    #[test]
    fn test_dynamic_call_encoding() {
        // `bytes` and `string` share an encoding.
        let data = encode_call(
            "sam(bytes,bool,uint256[])",
            &[
                Token::String("dave".into()),
                Token::Bool(true),
                Token::UintArray(vec![1, 2, 3]),
            ],
        );
        assert_eq!(
            hex::encode(data),
            concat!(
                "a5643bf2",
                "0000000000000000000000000000000000000000000000000000000000000060",
                "0000000000000000000000000000000000000000000000000000000000000001",
                "00000000000000000000000000000000000000000000000000000000000000a0",
                "0000000000000000000000000000000000000000000000000000000000000004",
                "6461766500000000000000000000000000000000000000000000000000000000",
                "0000000000000000000000000000000000000000000000000000000000000003",
                "0000000000000000000000000000000000000000000000000000000000000001",
                "0000000000000000000000000000000000000000000000000000000000000002",
                "0000000000000000000000000000000000000000000000000000000000000003"
            )
        );
    }

    #[test]
    fn test_decode_mixed_return_tuple() {
        let uploader: Identity = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f".parse().unwrap();
        let tokens = vec![
            Token::String("patient_note.txt".into()),
            Token::Uint(2),
            Token::Address(uploader),
            Token::Bool(true),
            Token::String(String::new()),
            Token::UintArray(vec![4, 9]),
        ];
        let decoded = decode(
            &[
                ParamType::String,
                ParamType::Uint,
                ParamType::Address,
                ParamType::Bool,
                ParamType::String,
                ParamType::UintArray,
            ],
            &encode(&tokens),
        )
        .unwrap();
        assert_eq!(decoded, tokens);
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        let data = encode(&[Token::String("a longer string than one word, certainly".into())]);
        let err = decode(&[ParamType::String], &data[..80]).unwrap_err();
        assert!(matches!(err, MedproofError::MalformedRecord(_)));
    }

    #[test]
    fn test_oversized_uint_is_malformed() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(word_to_u64(&word).is_err());
    }
}
