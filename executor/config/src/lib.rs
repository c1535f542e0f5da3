// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod crypto;
mod parameters;
mod test_keys;

pub use crypto::*;
pub use parameters::*;
pub use test_keys::*;
