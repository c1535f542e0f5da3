// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic types used by the executor node.
//! The whole code base should only refer to these aliases and not use the
//! individual scheme implementations, so a scheme can be swapped in one place.

use fastcrypto::{
    ed25519,
    error::FastCryptoError,
    traits::{KeyPair as _, Signer as _, ToFromBytes as _, VerifyingKey as _},
};
use serde::{Deserialize, Serialize};

/// Executor key identifies this node within a contract cohort. It signs
/// end-batch opinions and verifies the opinions of peer executors.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutorPublicKey(ed25519::Ed25519PublicKey);
pub struct ExecutorPrivateKey(ed25519::Ed25519PrivateKey);
pub struct ExecutorKeyPair(ed25519::Ed25519KeyPair);
pub struct ExecutorKeySignature(ed25519::Ed25519Signature);

impl ExecutorPublicKey {
    pub fn new(key: ed25519::Ed25519PublicKey) -> Self {
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FastCryptoError> {
        Ok(Self(ed25519::Ed25519PublicKey::from_bytes(bytes)?))
    }

    pub fn verify(
        &self,
        message: &[u8],
        signature: &ExecutorKeySignature,
    ) -> Result<(), FastCryptoError> {
        self.0.verify(message, &signature.0)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0 .0.to_bytes()
    }
}

impl ExecutorPrivateKey {
    pub fn into_inner(self) -> ed25519::Ed25519PrivateKey {
        self.0
    }
}

impl ExecutorKeyPair {
    pub fn new(keypair: ed25519::Ed25519KeyPair) -> Self {
        Self(keypair)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FastCryptoError> {
        Ok(Self(ed25519::Ed25519KeyPair::from_bytes(bytes)?))
    }

    pub fn generate<R: rand::Rng + fastcrypto::traits::AllowedRng>(rng: &mut R) -> Self {
        Self(ed25519::Ed25519KeyPair::generate(rng))
    }

    pub fn public(&self) -> ExecutorPublicKey {
        ExecutorPublicKey(self.0.public().clone())
    }

    pub fn sign(&self, message: &[u8]) -> ExecutorKeySignature {
        ExecutorKeySignature(self.0.sign(message))
    }

    pub fn private_key(self) -> ExecutorPrivateKey {
        ExecutorPrivateKey(self.0.copy().private())
    }
}

impl Clone for ExecutorKeyPair {
    fn clone(&self) -> Self {
        Self(self.0.copy())
    }
}

impl ExecutorKeySignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FastCryptoError> {
        Ok(Self(ed25519::Ed25519Signature::from_bytes(bytes)?))
    }

    pub fn to_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}
