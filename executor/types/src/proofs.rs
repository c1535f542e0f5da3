// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::{
    curve::{sha3_512_scalar, CurvePoint, CurveScalar},
    ContractKey,
};

/// Schnorr-style proof that the prover knows the discrete log of `T`, bound
/// to the contract key. `{F, k}` satisfy `F == k·G + d·T` for
/// `d = H(F ∥ T ∥ contract_key)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TProof {
    pub f: CurvePoint,
    pub k: CurveScalar,
}

/// Commitment linking consecutive batches: `T` accumulates the per-call
/// contributions since the chain start, blinded by the fresh nonce `r`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProof {
    pub t: CurvePoint,
    pub r: CurveScalar,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proofs {
    pub initial_batch: u64,
    pub t_proof: TProof,
    pub batch_proof: BatchProof,
}

/// Verifies `F == k·G + d·T` with `d = H(F ∥ T ∥ contract_key)`.
pub fn verify_t_proof(proofs: &Proofs, contract_key: &ContractKey) -> bool {
    let f = proofs.t_proof.f;
    let t = proofs.batch_proof.t;
    let d = sha3_512_scalar(&[&f.to_bytes(), &t.to_bytes(), contract_key.as_ref()]);
    f == CurvePoint::mul_base(&proofs.t_proof.k) + d * t
}

/// Verifies continuity from an earlier proof `m` to the later proof `n`:
/// `T_n − T_m == (r_n − r_m)·G + cY`, where `cY` is the weighted sum of the
/// per-call commitments issued between the two proofs.
pub fn verify_batch_proof(n: &Proofs, m: &Proofs, commitment: CurvePoint) -> bool {
    let t_diff = n.batch_proof.t - m.batch_proof.t;
    let r_diff = n.batch_proof.r - m.batch_proof.r;
    t_diff == CurvePoint::mul_base(&r_diff) + commitment
}

/// The Fiat-Shamir weight of one per-call contribution `Y`.
pub fn contribution_weight(y: &CurvePoint, contract_key: &ContractKey) -> CurveScalar {
    sha3_512_scalar(&[
        &CurvePoint::base_point().to_bytes(),
        &y.to_bytes(),
        contract_key.as_ref(),
    ])
}

/// Weighted sum `Σ H(G ∥ Y_i ∥ contract_key)·Y_i` over received per-call
/// contributions, as recomputed by peers verifying a batch proof.
pub fn combined_commitment<'a>(
    ys: impl IntoIterator<Item = &'a CurvePoint>,
    contract_key: &ContractKey,
) -> CurvePoint {
    ys.into_iter()
        .map(|y| contribution_weight(y, contract_key) * *y)
        .sum()
}
