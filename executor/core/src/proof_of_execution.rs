// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The accumulating proof-of-execution chain of one contract.
//!
//! Every executed call contributes `Y = H(secret ∥ contract_key)·G` to the
//! chain. Proofs built at batch boundaries commit to the running weighted sum
//! of contributions, so any two proofs of the same executor are linked by the
//! publicly computable difference of per-call commitments: peers can verify
//! the executor kept executing without learning the per-call secrets.

use executor_types::{
    contribution_weight, sha3_512_scalar, BatchProof, ContractKey, CurvePoint, CurveScalar, Proofs,
    TProof,
};

struct Contribution {
    y: CurvePoint,
    weight: CurveScalar,
}

pub(crate) struct ProofOfExecution {
    contract_key: ContractKey,
    initial_batch: u64,
    contributions: Vec<Contribution>,
    /// Running scalar `Σ H(G ∥ Y_i ∥ key)·H(secret_i ∥ key)`; the chain
    /// commitment is this scalar times the base point.
    secret_commitment: CurveScalar,
}

impl ProofOfExecution {
    pub(crate) fn new(contract_key: ContractKey, initial_batch: u64) -> Self {
        Self {
            contract_key,
            initial_batch,
            contributions: Vec::new(),
            secret_commitment: CurveScalar::zero(),
        }
    }

    /// Feeds one call's secret output into the chain and returns its public
    /// contribution `Y`.
    pub(crate) fn add_to_proof(&mut self, secret: u64) -> CurvePoint {
        let h = sha3_512_scalar(&[&secret.to_le_bytes(), self.contract_key.as_ref()]);
        let y = CurvePoint::mul_base(&h);
        let weight = contribution_weight(&y, &self.contract_key) * h;

        self.secret_commitment += weight;
        self.contributions.push(Contribution { y, weight });
        y
    }

    /// Retracts the most recent contribution; used when a tentative call's
    /// execution is not retained.
    pub(crate) fn pop_from_proof(&mut self) {
        if let Some(contribution) = self.contributions.pop() {
            self.secret_commitment -= contribution.weight;
        }
    }

    /// Forgets all contributions; called exactly once per successful batch
    /// after its proofs were constructed.
    pub(crate) fn reset(&mut self) {
        self.contributions.clear();
        self.secret_commitment = CurveScalar::zero();
    }

    pub(crate) fn len(&self) -> usize {
        self.contributions.len()
    }

    /// The weighted sum `Σ H(G ∥ Y_i ∥ key)·Y_i` over the current
    /// contributions, recorded per batch to verify later proofs.
    pub(crate) fn batch_commitment(&self) -> CurvePoint {
        CurvePoint::mul_base(&self.secret_commitment)
    }

    /// Builds the T-proof and batch proof bound to the current chain state.
    pub(crate) fn build_proof(&self) -> Proofs {
        let mut rng = rand::thread_rng();
        let r = CurveScalar::random(&mut rng);
        let nonce = CurveScalar::random(&mut rng);

        // T commits to the chain; its discrete log is blinded by r.
        let t_scalar = r + self.secret_commitment;
        let t = CurvePoint::mul_base(&t_scalar);

        // Schnorr proof of knowledge of T's discrete log.
        let f = CurvePoint::mul_base(&nonce);
        let d = sha3_512_scalar(&[&f.to_bytes(), &t.to_bytes(), self.contract_key.as_ref()]);
        let k = nonce - d * t_scalar;

        Proofs {
            initial_batch: self.initial_batch,
            t_proof: TProof { f, k },
            batch_proof: BatchProof { t, r },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use executor_types::{combined_commitment, verify_batch_proof, verify_t_proof};

    const CONTRACT_KEY: ContractKey = ContractKey::new([
        184, 250, 143, 132, 33, 57, 17, 65, 124, 25, 21, 253, 69, 10, 249, 252, 33, 5, 215, 81,
        76, 47, 150, 29, 221, 22, 161, 101, 16, 252, 247, 11,
    ]);

    fn add_secrets(poex: &mut ProofOfExecution, secrets: &[u64]) -> CurvePoint {
        let mut commitment = CurvePoint::identity();
        for secret in secrets {
            let y = poex.add_to_proof(*secret);
            commitment += contribution_weight(&y, &CONTRACT_KEY) * y;
        }
        commitment
    }

    #[test]
    fn proof_chain_links_batches() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 87);

        let m = poex.build_proof();
        assert!(verify_t_proof(&m, &CONTRACT_KEY));

        let c1 = add_secrets(&mut poex, &[13561546964161623, 1255621556321561123, 431614452611456511]);
        let m2 = poex.build_proof();
        assert!(verify_t_proof(&m2, &CONTRACT_KEY));

        let c2 = add_secrets(&mut poex, &[354625726501424, 7687354345387, 3546387643]);
        let n = poex.build_proof();
        assert!(verify_t_proof(&n, &CONTRACT_KEY));

        assert!(verify_batch_proof(&n, &m, c1 + c2));
        assert!(verify_batch_proof(&n, &m2, c2));
        assert!(verify_batch_proof(&m2, &m, c1));
    }

    #[test]
    fn mismatched_commitments_fail_verification() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 87);

        let m = poex.build_proof();
        let c1 = add_secrets(&mut poex, &[13561546964161623, 1255621556321561123, 431614452611456511]);
        let m2 = poex.build_proof();
        let c2 = add_secrets(&mut poex, &[354625726501424, 7687354345387, 3546387643]);
        let n = poex.build_proof();

        // Swapped commitments do not verify.
        assert!(!verify_batch_proof(&n, &m, c2));
        assert!(!verify_batch_proof(&n, &m2, c1));
    }

    #[test]
    fn popped_contribution_leaves_no_trace() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 87);

        let m = poex.build_proof();
        let c1 = add_secrets(&mut poex, &[13561546964161623, 1255621556321561123, 431614452611456511]);
        let m2 = poex.build_proof();
        assert!(verify_batch_proof(&m2, &m, c1));

        let commitment_before = poex.batch_commitment().to_bytes();
        poex.add_to_proof(354625726501424);
        poex.pop_from_proof();
        assert_eq!(poex.batch_commitment().to_bytes(), commitment_before);

        let n = poex.build_proof();
        assert!(verify_t_proof(&n, &CONTRACT_KEY));
        assert!(verify_batch_proof(&n, &m2, CurvePoint::identity()));
        assert!(verify_batch_proof(&n, &m, c1));
    }

    #[test]
    fn unpopped_contribution_shifts_the_chain() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 87);

        let m = poex.build_proof();
        let c1 = add_secrets(&mut poex, &[13561546964161623, 1255621556321561123, 431614452611456511]);
        let m2 = poex.build_proof();
        assert!(verify_batch_proof(&m2, &m, c1));

        poex.add_to_proof(354625726501424);
        let n = poex.build_proof();

        assert!(!verify_batch_proof(&n, &m2, CurvePoint::identity()));
        assert!(!verify_batch_proof(&n, &m, c1));
    }

    #[test]
    fn reset_restarts_the_chain() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 87);

        let m = poex.build_proof();
        add_secrets(&mut poex, &[13561546964161623, 1255621556321561123, 431614452611456511]);

        poex.reset();
        assert_eq!(poex.len(), 0);
        let n = poex.build_proof();
        assert!(verify_batch_proof(&n, &m, CurvePoint::identity()));
    }

    #[test]
    fn commitment_matches_peer_side_recomputation() {
        let mut poex = ProofOfExecution::new(CONTRACT_KEY, 0);
        let ys: Vec<CurvePoint> = [5u64, 17, 93]
            .iter()
            .map(|secret| poex.add_to_proof(*secret))
            .collect();

        assert_eq!(
            poex.batch_commitment(),
            combined_commitment(ys.iter(), &CONTRACT_KEY)
        );
    }
}
