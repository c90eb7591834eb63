//! Calldata layouts for the agent economy precompiles.
//!
//! Every field occupies exactly one 32-byte slot. Strings and addresses are
//! left-padded with zeros so they share the padding rule of the big-endian
//! integers, which lets a decoder recover a string by trimming the leading
//! zero bytes of its slot.
//!
//! ```text
//! register         name | modelHash | capCount | cap_0 .. cap_n
//! heartbeat        (empty, the caller is the agent)
//! verifyInference  agent | modelHash | inputHash | outputHash | tokensProcessed
//! claimReward      (empty, the caller is the claimant)
//! ```

use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use thiserror::Error;

/// Width of a calldata field
pub const SLOT_SIZE: usize = 32;

/// Number of fixed slots in a register call, before the capability slots
pub const REGISTER_HEAD_SLOTS: usize = 3;

/// Number of slots in a verify-inference call
pub const VERIFY_INFERENCE_SLOTS: usize = 5;

const ADDRESS_SIZE: usize = 20;

/// Local precondition failures, raised before anything reaches the network
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} is {len} bytes once encoded, a slot holds at most 32")]
    FieldTooLong { field: &'static str, len: usize },
    #[error("{field} contains a NUL byte and could not be recovered from its slot")]
    NulByte { field: &'static str },
    #[error("capability count {declared} does not match the {supplied} capabilities supplied")]
    CapabilityCountMismatch { declared: u64, supplied: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("calldata is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("calldata is {0} bytes, which is not a whole number of slots")]
    Unaligned(usize),
    #[error("capability count does not fit in a u64")]
    CountOverflow,
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("agent slot carries nonzero bytes in its padding")]
    DirtyAddressPadding,
}

/// The exact byte payload submitted with a precompile call.
///
/// Built once per action, never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct CallEnvelope(Bytes);

impl CallEnvelope {
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    fn from_slots(slots: Vec<[u8; SLOT_SIZE]>) -> Self {
        let mut data = Vec::with_capacity(slots.len() * SLOT_SIZE);
        for slot in &slots {
            data.extend_from_slice(slot);
        }
        Self(Bytes::from(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn slot_count(&self) -> usize {
        self.0.len() / SLOT_SIZE
    }
}

impl fmt::Display for CallEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for CallEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallEnvelope({} slots, {})", self.slot_count(), self)
    }
}

/// Logical fields of a register call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterArgs {
    pub name: String,
    pub model_hash: B256,
    pub capabilities: Vec<String>,
}

/// Logical fields of a verify-inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyInferenceArgs {
    pub agent: Address,
    pub model_hash: B256,
    pub input_hash: B256,
    pub output_hash: B256,
    pub tokens_processed: U256,
}

/// Pack a UTF-8 string into a left-padded slot
pub fn string_slot(field: &'static str, value: &str) -> Result<[u8; SLOT_SIZE], EncodeError> {
    let raw = value.as_bytes();
    if raw.len() > SLOT_SIZE {
        return Err(EncodeError::FieldTooLong {
            field,
            len: raw.len(),
        });
    }
    if raw.contains(&0) {
        return Err(EncodeError::NulByte { field });
    }

    let mut slot = [0u8; SLOT_SIZE];
    slot[SLOT_SIZE - raw.len()..].copy_from_slice(raw);
    Ok(slot)
}

pub fn uint_slot(value: U256) -> [u8; SLOT_SIZE] {
    value.to_be_bytes::<SLOT_SIZE>()
}

pub fn address_slot(address: &Address) -> [u8; SLOT_SIZE] {
    let mut slot = [0u8; SLOT_SIZE];
    slot[SLOT_SIZE - ADDRESS_SIZE..].copy_from_slice(address.as_slice());
    slot
}

/// Encode a register call, deriving the capability count from the list
pub fn encode_register<S: AsRef<str>>(
    name: &str,
    model_hash: &B256,
    capabilities: &[S],
) -> Result<CallEnvelope, EncodeError> {
    encode_register_with_count(name, model_hash, capabilities.len() as u64, capabilities)
}

/// Encode a register call with an explicitly declared capability count.
///
/// The declared count must match the number of capability slots, otherwise
/// the precompile would read past (or short of) the end of the payload.
pub fn encode_register_with_count<S: AsRef<str>>(
    name: &str,
    model_hash: &B256,
    declared_count: u64,
    capabilities: &[S],
) -> Result<CallEnvelope, EncodeError> {
    if declared_count != capabilities.len() as u64 {
        return Err(EncodeError::CapabilityCountMismatch {
            declared: declared_count,
            supplied: capabilities.len(),
        });
    }

    let mut slots = Vec::with_capacity(REGISTER_HEAD_SLOTS + capabilities.len());
    slots.push(string_slot("name", name)?);
    slots.push(model_hash.0);
    slots.push(uint_slot(U256::from(declared_count)));
    for capability in capabilities {
        slots.push(string_slot("capability", capability.as_ref())?);
    }

    Ok(CallEnvelope::from_slots(slots))
}

pub fn encode_heartbeat() -> CallEnvelope {
    CallEnvelope::empty()
}

pub fn encode_verify_inference(args: &VerifyInferenceArgs) -> CallEnvelope {
    CallEnvelope::from_slots(vec![
        address_slot(&args.agent),
        args.model_hash.0,
        args.input_hash.0,
        args.output_hash.0,
        uint_slot(args.tokens_processed),
    ])
}

pub fn encode_claim_reward() -> CallEnvelope {
    CallEnvelope::empty()
}

fn slot_at(data: &[u8], index: usize) -> &[u8] {
    &data[index * SLOT_SIZE..(index + 1) * SLOT_SIZE]
}

fn decode_string_slot(field: &'static str, slot: &[u8]) -> Result<String, DecodeError> {
    let start = slot.iter().position(|b| *b != 0).unwrap_or(slot.len());
    String::from_utf8(slot[start..].to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field })
}

/// Recover the logical fields of a register call
pub fn decode_register(data: &[u8]) -> Result<RegisterArgs, DecodeError> {
    if data.len() % SLOT_SIZE != 0 {
        return Err(DecodeError::Unaligned(data.len()));
    }
    let head = REGISTER_HEAD_SLOTS * SLOT_SIZE;
    if data.len() < head {
        return Err(DecodeError::Length {
            expected: head,
            actual: data.len(),
        });
    }

    let count = U256::from_be_slice(slot_at(data, 2));
    let count: u64 = count.try_into().map_err(|_| DecodeError::CountOverflow)?;
    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(SLOT_SIZE))
        .and_then(|len| len.checked_add(head))
        .ok_or(DecodeError::CountOverflow)?;
    if data.len() != expected {
        return Err(DecodeError::Length {
            expected,
            actual: data.len(),
        });
    }

    let capabilities = (0..count as usize)
        .map(|i| decode_string_slot("capability", slot_at(data, REGISTER_HEAD_SLOTS + i)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RegisterArgs {
        name: decode_string_slot("name", slot_at(data, 0))?,
        model_hash: B256::from_slice(slot_at(data, 1)),
        capabilities,
    })
}

/// Recover the logical fields of a verify-inference call
pub fn decode_verify_inference(data: &[u8]) -> Result<VerifyInferenceArgs, DecodeError> {
    let expected = VERIFY_INFERENCE_SLOTS * SLOT_SIZE;
    if data.len() != expected {
        return Err(DecodeError::Length {
            expected,
            actual: data.len(),
        });
    }

    let agent_slot = slot_at(data, 0);
    let padding = SLOT_SIZE - ADDRESS_SIZE;
    if agent_slot[..padding].iter().any(|b| *b != 0) {
        return Err(DecodeError::DirtyAddressPadding);
    }

    Ok(VerifyInferenceArgs {
        agent: Address::from_slice(&agent_slot[padding..]),
        model_hash: B256::from_slice(slot_at(data, 1)),
        input_hash: B256::from_slice(slot_at(data, 2)),
        output_hash: B256::from_slice(slot_at(data, 3)),
        tokens_processed: U256::from_be_slice(slot_at(data, 4)),
    })
}
