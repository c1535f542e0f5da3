// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod call;
mod curve;
mod identifiers;
mod messages;
mod opinion;
mod proofs;
mod requests;
mod transactions;

pub use call::*;
pub use curve::*;
pub use identifiers::*;
pub use messages::*;
pub use opinion::*;
pub use proofs::*;
pub use requests::*;
pub use transactions::*;
