// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::ExecutorKey;

/// Tags of messenger topics the executor subscribes to and publishes under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageTag {
    EndBatch,
}

impl MessageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTag::EndBatch => "END_BATCH",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "END_BATCH" => Some(MessageTag::EndBatch),
            _ => None,
        }
    }

    /// Every tag this node subscribes to on session start.
    pub fn all() -> &'static [MessageTag] {
        &[MessageTag::EndBatch]
    }
}

/// Message handed to the messenger service for delivery to one peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub receiver: ExecutorKey,
    pub tag: String,
    pub content: Vec<u8>,
}

/// Message delivered by the messenger service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub tag: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for tag in MessageTag::all() {
            assert_eq!(MessageTag::parse(tag.as_str()), Some(*tag));
        }
        assert_eq!(MessageTag::parse("UNKNOWN"), None);
    }
}
