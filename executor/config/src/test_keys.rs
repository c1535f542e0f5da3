// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use rand::{rngs::StdRng, SeedableRng as _};

use crate::ExecutorKeyPair;

/// Creates deterministic executor key pairs for local testing. The first key
/// conventionally belongs to the node under test, the rest to its peers.
pub fn local_executor_keys(count: usize) -> Vec<ExecutorKeyPair> {
    let mut rng = StdRng::from_seed([0; 32]);
    (0..count)
        .map(|_| ExecutorKeyPair::generate(&mut rng))
        .collect()
}
