// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use executor_types::BlockHash;
use tracing::debug;

use crate::{
    async_query::{spawn_query, QueryHandle},
    error::ExecutorResult,
    event_loop::EventLoopSender,
    metrics::Metrics,
};

/// A block as served by the blockchain gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub hash: BlockHash,
    pub block_time: u64,
}

/// The blockchain gateway, external to this node.
#[async_trait]
pub trait Blockchain: Send + Sync + 'static {
    async fn block(&self, height: u64) -> ExecutorResult<Block>;
}

pub(crate) type BlockCallback<S> = Box<dyn FnOnce(&mut S, ExecutorResult<Block>) + Send>;

struct PendingBlockQuery<S> {
    // Dropping the handle cancels the upstream RPC with the whole cache.
    _query: QueryHandle<S, Block>,
    callbacks: Vec<BlockCallback<S>>,
}

/// Bounded per-height block cache fronting the blockchain gateway.
///
/// At most one upstream query is in flight per height: concurrent requests
/// for an uncached height coalesce onto the pending query and all observe the
/// same reply. Eviction drops the oldest inserted height once the cache
/// exceeds its bound.
pub struct CachedBlockchain<S> {
    upstream: Arc<dyn Blockchain>,
    cache: BTreeMap<u64, Block>,
    queries: BTreeMap<u64, PendingBlockQuery<S>>,
    max_cache_size: usize,
    metrics: Arc<Metrics>,
}

impl<S: 'static> CachedBlockchain<S> {
    pub fn new(upstream: Arc<dyn Blockchain>, max_cache_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            upstream,
            cache: BTreeMap::new(),
            queries: BTreeMap::new(),
            max_cache_size,
            metrics,
        }
    }

    pub(crate) fn add_block(&mut self, height: u64, block: Block) {
        self.cache.insert(height, block);
        if self.cache.len() > self.max_cache_size {
            self.cache.pop_first();
        }
    }

    pub(crate) fn is_cached(&self, height: u64) -> bool {
        self.cache.contains_key(&height)
    }

    /// Requests a block by height. A cached block is delivered synchronously;
    /// otherwise the callback is attached to the in-flight upstream query for
    /// this height, issuing one if none exists.
    ///
    /// `project` locates this cache within the loop state, so the completion
    /// callback can find it again without holding a reference across the
    /// suspension.
    pub(crate) fn block(
        state: &mut S,
        sender: &EventLoopSender<S>,
        project: fn(&mut S) -> &mut CachedBlockchain<S>,
        height: u64,
        callback: BlockCallback<S>,
    ) {
        sender.on_event_loop();

        let this = project(state);
        if let Some(block) = this.cache.get(&height).cloned() {
            this.metrics.node_metrics.block_cache_hits.inc();
            callback(state, Ok(block));
            return;
        }

        let this = project(state);
        if let Some(pending) = this.queries.get_mut(&height) {
            pending.callbacks.push(callback);
            return;
        }

        debug!("Block {height} not cached, querying the blockchain gateway");
        this.metrics.node_metrics.block_cache_misses.inc();
        let upstream = this.upstream.clone();
        let query = spawn_query(
            sender,
            true,
            async move { upstream.block(height).await },
            move |state: &mut S, result| {
                let this = project(state);
                let Some(pending) = this.queries.remove(&height) else {
                    return;
                };
                if let Ok(block) = &result {
                    this.add_block(height, block.clone());
                }
                for callback in pending.callbacks {
                    callback(state, result.clone());
                }
            },
        );

        let this = project(state);
        this.queries.insert(
            height,
            PendingBlockQuery {
                _query: query,
                callbacks: vec![callback],
            },
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ExecutorError, event_loop, metrics::test_metrics};
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };
    use tokio::sync::oneshot;

    struct CacheState {
        blockchain: CachedBlockchain<CacheState>,
        sender: EventLoopSender<CacheState>,
        replies: Vec<ExecutorResult<Block>>,
    }

    impl CacheState {
        fn request(&mut self, height: u64) {
            let sender = self.sender.clone();
            CachedBlockchain::block(
                self,
                &sender,
                |state| &mut state.blockchain,
                height,
                Box::new(|state, result| state.replies.push(result)),
            );
        }
    }

    struct FakeBlockchain {
        calls: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl Blockchain for FakeBlockchain {
        async fn block(&self, height: u64) -> ExecutorResult<Block> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Let further requests pile onto the pending query.
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(ExecutorError::ServiceUnavailable {
                    service: "blockchain",
                    reason: "down".to_string(),
                });
            }
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&height.to_le_bytes());
            Ok(Block {
                hash: BlockHash::new(hash),
                block_time: height * 1000,
            })
        }
    }

    fn start_cache(
        upstream: Arc<FakeBlockchain>,
        max_cache_size: usize,
    ) -> (
        EventLoopSender<CacheState>,
        event_loop::EventLoopHandle<CacheState>,
    ) {
        event_loop::start("test-loop", move |sender| CacheState {
            blockchain: CachedBlockchain::new(upstream, max_cache_size, test_metrics()),
            sender,
            replies: Vec::new(),
        })
    }

    async fn replies(sender: &EventLoopSender<CacheState>) -> Vec<ExecutorResult<Block>> {
        let (tx, rx) = oneshot::channel();
        sender.post(move |state| tx.send(state.replies.clone()).unwrap());
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn concurrent_requests_coalesce_into_one_upstream_query() {
        let upstream = Arc::new(FakeBlockchain {
            calls: AtomicU64::new(0),
            fail: false,
        });
        let (sender, handle) = start_cache(upstream.clone(), 100);

        sender.post(|state| {
            for _ in 0..5 {
                state.request(42);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let replies = replies(&sender).await;

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(replies.len(), 5);
        let expected = replies[0].as_ref().unwrap();
        for reply in &replies {
            assert_eq!(reply.as_ref().unwrap(), expected);
        }
        handle.stop();
    }

    #[tokio::test]
    async fn cached_blocks_are_served_without_upstream_queries() {
        let upstream = Arc::new(FakeBlockchain {
            calls: AtomicU64::new(0),
            fail: false,
        });
        let (sender, handle) = start_cache(upstream.clone(), 100);

        sender.post(|state| state.request(7));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Served synchronously from the cache.
        sender.post(|state| {
            state.request(7);
            assert_eq!(state.replies.len(), 2);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(replies(&sender).await.len(), 2);
        handle.stop();
    }

    #[tokio::test]
    async fn upstream_failures_reach_every_waiter() {
        let upstream = Arc::new(FakeBlockchain {
            calls: AtomicU64::new(0),
            fail: true,
        });
        let (sender, handle) = start_cache(upstream, 100);

        sender.post(|state| {
            state.request(1);
            state.request(1);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let replies = replies(&sender).await;
        assert_eq!(replies.len(), 2);
        for reply in &replies {
            assert!(reply.is_err());
        }
        handle.stop();
    }

    #[tokio::test]
    async fn eviction_drops_the_oldest_height() {
        let upstream = Arc::new(FakeBlockchain {
            calls: AtomicU64::new(0),
            fail: false,
        });
        let (sender, handle) = start_cache(upstream, 2);

        let (tx, rx) = oneshot::channel();
        sender.post(move |state| {
            for height in [1, 2, 3] {
                state.blockchain.add_block(
                    height,
                    Block {
                        hash: BlockHash::default(),
                        block_time: 0,
                    },
                );
            }
            tx.send((
                state.blockchain.is_cached(1),
                state.blockchain.is_cached(2),
                state.blockchain.is_cached(3),
            ))
            .unwrap();
        });

        assert_eq!(rx.await.unwrap(), (false, true, true));
        handle.stop();
    }
}
