// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use executor_config::ExecutorPublicKey;
use serde::{
    de::{SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Declares a 32-byte opaque identifier. Key-shaped and hash-shaped
/// identifiers share the representation but are distinct types, so a call id
/// can never be passed where a drive key is expected.
macro_rules! identifier_32 {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn into_inner(self) -> [u8; 32] {
                self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Eight bytes are plenty to tell identifiers apart in logs.
                write!(f, "{}({}..)", stringify!($name), hex::encode(&self.0[..8]))
            }
        }
    };
}

identifier_32!(
    /// Public key of a deployed contract.
    ContractKey
);
identifier_32!(
    /// Public key of the contract's persistent storage identity.
    DriveKey
);
identifier_32!(
    /// Public key identifying one executor of a cohort.
    ExecutorKey
);
identifier_32!(
    /// Public key of the account that submitted a manual call.
    CallerKey
);
identifier_32!(
    /// Hash identifying a single contract call.
    CallId
);
identifier_32!(
    /// Hash identifying a storage modification round.
    ModificationId
);
identifier_32!(BlockHash);
identifier_32!(TransactionHash);
identifier_32!(RequestId);
identifier_32!(
    /// Root hash of the drive state as evaluated by the storage service.
    StorageHash
);

impl From<&ExecutorPublicKey> for ExecutorKey {
    fn from(key: &ExecutorPublicKey) -> Self {
        Self(key.to_bytes())
    }
}

/// Detached Ed25519 signature bytes as they travel on the wire.
#[derive(Clone, Copy)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0; 64])
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

// 64-byte arrays have no derived serde impls; encode as a fixed-size tuple so
// bcs lays the signature out as raw bytes without a length prefix.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(64)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("64 signature bytes")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = [0u8; 64];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(Signature(bytes))
            }
        }

        deserializer.deserialize_tuple(64, SignatureVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_ordering_is_bytewise() {
        let low = ContractKey::new([1; 32]);
        let high = ContractKey::new([2; 32]);
        assert!(low < high);
        assert_eq!(low, ContractKey::new([1; 32]));
    }

    #[test]
    fn signature_bcs_is_raw_bytes() {
        let signature = Signature::new([0xAB; 64]);
        let encoded = bcs::to_bytes(&signature).unwrap();
        assert_eq!(encoded, vec![0xAB; 64]);

        let decoded: Signature = bcs::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, signature);
    }
}
