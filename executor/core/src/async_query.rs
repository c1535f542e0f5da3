// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cancellable one-shot callbacks marshalled through the event loop.
//!
//! Every asynchronous request yields a `(QueryHandle, QuerySink)` pair sharing
//! a small status cell. The sink side may complete the query from any thread;
//! the handle side, owned by the component that issued the request, can
//! terminate it. The callback fires at most once, on the event-loop thread,
//! and only while the query is still active, so a terminated component never
//! observes a stale reply.
//!
//! Callbacks hold no strong reference to their owner: they receive
//! `&mut S` (the loop state) and look their owner up by key, which makes
//! termination the point where any ownership cycle is broken.

use std::{future::Future, sync::Arc};

use parking_lot::Mutex;

use crate::{error::ExecutorResult, event_loop::EventLoopSender};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum QueryStatus {
    Active,
    Executed,
    Terminated,
}

type Callback<S, R> = Box<dyn FnOnce(&mut S, ExecutorResult<R>) + Send>;
type TerminateHook = Box<dyn FnOnce() + Send>;

struct QueryCell<S, R> {
    status: QueryStatus,
    callback: Option<Callback<S, R>>,
    terminate_hook: Option<TerminateHook>,
}

/// Producer-side handle of an async query. Terminating drops the stored
/// callback and runs the terminate hook, which cancels the underlying work.
///
/// Auto-terminating handles (the default) terminate when dropped, so a query
/// held as a member dies with its owner. Manual handles survive drops and
/// must be terminated explicitly.
pub(crate) struct QueryHandle<S, R> {
    cell: Arc<Mutex<QueryCell<S, R>>>,
    terminate_on_drop: bool,
}

impl<S, R> QueryHandle<S, R> {
    /// Terminates the query if it is still active: the callback will never
    /// fire, and the registered terminate hook runs for producer-side cleanup.
    pub(crate) fn terminate(&self) {
        let hook = {
            let mut cell = self.cell.lock();
            if cell.status != QueryStatus::Active {
                return;
            }
            cell.status = QueryStatus::Terminated;
            cell.callback = None;
            cell.terminate_hook.take()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Registers producer-side cleanup to run on termination. If the query
    /// was already terminated the hook runs immediately; if it already
    /// executed the hook is dropped.
    pub(crate) fn set_terminate_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut cell = self.cell.lock();
            match cell.status {
                QueryStatus::Active => {
                    cell.terminate_hook = Some(Box::new(hook));
                    return;
                }
                QueryStatus::Terminated => true,
                QueryStatus::Executed => false,
            }
        };
        if run_now {
            hook();
        }
    }
}

impl<S, R> Drop for QueryHandle<S, R> {
    fn drop(&mut self) {
        if self.terminate_on_drop {
            self.terminate();
        }
    }
}

/// Consumer-side sink of an async query.
pub(crate) struct QuerySink<S, R> {
    cell: Arc<Mutex<QueryCell<S, R>>>,
    sender: EventLoopSender<S>,
}

impl<S: 'static, R: Send + 'static> QuerySink<S, R> {
    /// Fast path for producers that can skip work on dead queries.
    pub(crate) fn is_terminated(&self) -> bool {
        self.cell.lock().status == QueryStatus::Terminated
    }

    /// Completes the query from any thread. Delivery is marshalled to the
    /// event loop; the callback fires iff the query is active both now and at
    /// delivery time.
    pub(crate) fn post_reply(self, reply: ExecutorResult<R>) {
        let callback = {
            let mut cell = self.cell.lock();
            if cell.status != QueryStatus::Active {
                return;
            }
            cell.callback.take()
        };
        let Some(callback) = callback else {
            return;
        };

        let cell = self.cell;
        self.sender.post(move |state| {
            {
                let mut locked = cell.lock();
                // Termination may have won the race; the callback is then
                // dropped without running.
                if locked.status != QueryStatus::Active {
                    return;
                }
                locked.status = QueryStatus::Executed;
            }
            callback(state, reply);
        });
    }

    /// Completes the query synchronously. Only valid on the event-loop
    /// thread, where the caller already holds the state; used for chaining
    /// replies without a round trip through the task queue.
    pub(crate) fn reply_now(self, state: &mut S, reply: ExecutorResult<R>) {
        self.sender.on_event_loop();
        let callback = {
            let mut cell = self.cell.lock();
            if cell.status != QueryStatus::Active {
                return;
            }
            cell.status = QueryStatus::Executed;
            cell.callback.take()
        };
        if let Some(callback) = callback {
            callback(state, reply);
        }
    }
}

/// Creates a query pair. `terminate_on_drop` selects the auto-terminating
/// handle variant.
pub(crate) fn new_query<S: 'static, R: Send + 'static>(
    sender: EventLoopSender<S>,
    terminate_on_drop: bool,
    callback: impl FnOnce(&mut S, ExecutorResult<R>) + Send + 'static,
) -> (QueryHandle<S, R>, QuerySink<S, R>) {
    let cell = Arc::new(Mutex::new(QueryCell {
        status: QueryStatus::Active,
        callback: Some(Box::new(callback)),
        terminate_hook: None,
    }));
    let handle = QueryHandle {
        cell: cell.clone(),
        terminate_on_drop,
    };
    let sink = QuerySink { cell, sender };
    (handle, sink)
}

/// Drives `future` on the runtime and delivers its output through a fresh
/// query. Terminating the returned handle aborts the task, cancelling any
/// in-flight RPC the future was awaiting.
pub(crate) fn spawn_query<S, R, F>(
    sender: &EventLoopSender<S>,
    terminate_on_drop: bool,
    future: F,
    callback: impl FnOnce(&mut S, ExecutorResult<R>) + Send + 'static,
) -> QueryHandle<S, R>
where
    S: 'static,
    R: Send + 'static,
    F: Future<Output = ExecutorResult<R>> + Send + 'static,
{
    let (handle, sink) = new_query(sender.clone(), terminate_on_drop, callback);
    let join_handle = sender.runtime().spawn(async move {
        let reply = future.await;
        sink.post_reply(reply);
    });
    handle.set_terminate_hook(move || join_handle.abort());
    handle
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ExecutorError, event_loop};
    use std::time::Duration;
    use tokio::sync::oneshot;

    type TestState = Vec<u64>;

    fn start_loop() -> (
        EventLoopSender<TestState>,
        crate::event_loop::EventLoopHandle<TestState>,
    ) {
        event_loop::start("test-loop", |_| TestState::new())
    }

    async fn snapshot(sender: &EventLoopSender<TestState>) -> TestState {
        let (tx, rx) = oneshot::channel();
        sender.post(move |state| tx.send(state.clone()).unwrap());
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn reply_fires_callback_exactly_once() {
        let (sender, handle) = start_loop();

        let (query, sink) = new_query(sender.clone(), true, |state: &mut TestState, reply| {
            state.push(reply.unwrap());
        });
        assert!(!sink.is_terminated());
        sink.post_reply(Ok(7));

        assert_eq!(snapshot(&sender).await, vec![7]);
        drop(query);
        handle.stop();
    }

    #[tokio::test]
    async fn terminated_query_never_fires() {
        let (sender, handle) = start_loop();

        let (query, sink) =
            new_query(sender.clone(), true, |state: &mut TestState, _: ExecutorResult<i32>| {
                state.push(1);
            });
        let (hook_tx, hook_rx) = oneshot::channel();
        query.set_terminate_hook(move || hook_tx.send(()).unwrap());

        query.terminate();
        assert!(sink.is_terminated());
        hook_rx.await.unwrap();

        // A late reply is silently discarded.
        sink.post_reply(Ok(1));
        assert!(snapshot(&sender).await.is_empty());
        handle.stop();
    }

    #[tokio::test]
    async fn auto_terminating_handle_cancels_on_drop() {
        let (sender, handle) = start_loop();

        let (query, sink) =
            new_query(sender.clone(), true, |state: &mut TestState, _: ExecutorResult<i32>| {
                state.push(1);
            });
        drop(query);

        assert!(sink.is_terminated());
        sink.post_reply(Err(ExecutorError::SessionClosed));
        assert!(snapshot(&sender).await.is_empty());
        handle.stop();
    }

    #[tokio::test]
    async fn manual_handle_survives_drop() {
        let (sender, handle) = start_loop();

        let (query, sink) = new_query(sender.clone(), false, |state: &mut TestState, reply| {
            state.push(reply.unwrap());
        });
        drop(query);

        sink.post_reply(Ok(3));
        assert_eq!(snapshot(&sender).await, vec![3]);
        handle.stop();
    }

    #[tokio::test]
    async fn spawned_query_delivers_future_output() {
        let (sender, handle) = start_loop();

        let query = spawn_query(
            &sender,
            true,
            async { Ok(11) },
            |state: &mut TestState, reply| state.push(reply.unwrap()),
        );

        // Poll until delivered; the future completes immediately.
        for _ in 0..100 {
            if snapshot(&sender).await == vec![11] {
                drop(query);
                handle.stop();
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("spawned query never delivered");
    }

    #[tokio::test]
    async fn terminating_spawned_query_aborts_the_future() {
        let (sender, handle) = start_loop();

        let query = spawn_query(
            &sender,
            true,
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(1)
            },
            |state: &mut TestState, _| state.push(1),
        );
        drop(query);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(snapshot(&sender).await.is_empty());
        handle.stop();
    }
}
