// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Edwards curve group arithmetic backing the proof-of-execution chain.
//! Points travel as 32-byte compressed encodings, scalars as 32-byte values
//! reduced modulo the group order.

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
    traits::Identity as _,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest as _, Sha3_512};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint(EdwardsPoint);

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CurveScalar(Scalar);

impl CurvePoint {
    pub fn identity() -> Self {
        Self(EdwardsPoint::identity())
    }

    pub fn base_point() -> Self {
        Self(ED25519_BASEPOINT_POINT)
    }

    pub fn mul_base(scalar: &CurveScalar) -> Self {
        Self(EdwardsPoint::mul_base(&scalar.0))
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        CompressedEdwardsY(*bytes).decompress().map(Self)
    }
}

impl Default for CurvePoint {
    fn default() -> Self {
        Self::identity()
    }
}

impl CurveScalar {
    pub fn zero() -> Self {
        Self(Scalar::ZERO)
    }

    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        Self(Scalar::from_bytes_mod_order_wide(&wide))
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(Scalar::from_bytes_mod_order(*bytes))
    }
}

impl Default for CurveScalar {
    fn default() -> Self {
        Self::zero()
    }
}

/// Reduces SHA3-512 over the concatenated inputs into a scalar, the
/// Fiat-Shamir derivation used everywhere in the proof-of-execution scheme.
pub fn sha3_512_scalar(inputs: &[&[u8]]) -> CurveScalar {
    let mut hasher = Sha3_512::new();
    for input in inputs {
        hasher.update(input);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    CurveScalar(Scalar::from_bytes_mod_order_wide(&wide))
}

impl Add for CurvePoint {
    type Output = CurvePoint;

    fn add(self, rhs: CurvePoint) -> CurvePoint {
        CurvePoint(self.0 + rhs.0)
    }
}

impl AddAssign for CurvePoint {
    fn add_assign(&mut self, rhs: CurvePoint) {
        self.0 += rhs.0;
    }
}

impl Sub for CurvePoint {
    type Output = CurvePoint;

    fn sub(self, rhs: CurvePoint) -> CurvePoint {
        CurvePoint(self.0 - rhs.0)
    }
}

impl Neg for CurvePoint {
    type Output = CurvePoint;

    fn neg(self) -> CurvePoint {
        CurvePoint(-self.0)
    }
}

impl Sum for CurvePoint {
    fn sum<I: Iterator<Item = CurvePoint>>(iter: I) -> CurvePoint {
        iter.fold(CurvePoint::identity(), Add::add)
    }
}

impl Add for CurveScalar {
    type Output = CurveScalar;

    fn add(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 + rhs.0)
    }
}

impl AddAssign for CurveScalar {
    fn add_assign(&mut self, rhs: CurveScalar) {
        self.0 += rhs.0;
    }
}

impl Sub for CurveScalar {
    type Output = CurveScalar;

    fn sub(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 - rhs.0)
    }
}

impl SubAssign for CurveScalar {
    fn sub_assign(&mut self, rhs: CurveScalar) {
        self.0 -= rhs.0;
    }
}

impl Mul for CurveScalar {
    type Output = CurveScalar;

    fn mul(self, rhs: CurveScalar) -> CurveScalar {
        CurveScalar(self.0 * rhs.0)
    }
}

impl Mul<CurvePoint> for CurveScalar {
    type Output = CurvePoint;

    fn mul(self, rhs: CurvePoint) -> CurvePoint {
        CurvePoint(self.0 * rhs.0)
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint({}..)", hex::encode(&self.to_bytes()[..8]))
    }
}

impl fmt::Debug for CurveScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurveScalar({}..)", hex::encode(&self.to_bytes()[..8]))
    }
}

impl Serialize for CurvePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        CurvePoint::from_bytes(&bytes)
            .ok_or_else(|| serde::de::Error::custom("invalid compressed Edwards point"))
    }
}

impl Serialize for CurveScalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurveScalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Ok(CurveScalar::from_bytes(&bytes))
    }
}
