// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The per-node event loop. One dedicated worker thread owns all mutable
//! executor state; every component method runs as a task posted here, so no
//! locks are needed around contract or batch state.

use std::{
    sync::{Arc, OnceLock},
    thread,
    time::Duration,
};

use tokio::sync::mpsc;
use tracing::warn;

/// A unit of work executed on the event-loop thread with exclusive access to
/// the state.
pub(crate) type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Handle owning the event-loop thread. Dropping the strong sender via
/// [`EventLoopHandle::stop`] drains queued tasks and joins the thread; all
/// weak senders stop being able to upgrade from that point on.
pub(crate) struct EventLoopHandle<S> {
    sender: mpsc::UnboundedSender<Task<S>>,
    join_handle: thread::JoinHandle<()>,
}

impl<S> EventLoopHandle<S> {
    pub(crate) fn stop(self) {
        drop(self.sender);
        self.join_handle.join().ok();
    }
}

/// Cloneable entry point for posting tasks and scheduling timers onto the
/// event loop. Holds the sender weakly so outstanding timers and RPC
/// callbacks never keep a stopped loop alive.
pub(crate) struct EventLoopSender<S> {
    sender: mpsc::WeakUnboundedSender<Task<S>>,
    runtime: tokio::runtime::Handle,
    loop_thread: Arc<OnceLock<thread::ThreadId>>,
}

impl<S> Clone for EventLoopSender<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            runtime: self.runtime.clone(),
            loop_thread: self.loop_thread.clone(),
        }
    }
}

impl<S: 'static> EventLoopSender<S> {
    pub(crate) fn post(&self, task: impl FnOnce(&mut S) + Send + 'static) {
        if let Some(sender) = self.sender.upgrade() {
            if sender.send(Box::new(task)).is_err() {
                warn!("Couldn't post task to event loop, probably it is shutting down");
            }
        }
    }

    /// Schedules a one-shot task. The timer is cancelled by dropping the
    /// returned handle.
    pub(crate) fn schedule(
        &self,
        delay: Duration,
        task: impl FnOnce(&mut S) + Send + 'static,
    ) -> Timer {
        let sender = self.clone();
        Timer {
            join_handle: self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                sender.post(task);
            }),
        }
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    pub(crate) fn is_event_loop_thread(&self) -> bool {
        self.loop_thread.get() == Some(&thread::current().id())
    }

    /// Single-thread invariant check, used at entry of state-mutating code.
    pub(crate) fn on_event_loop(&self) {
        debug_assert!(
            self.is_event_loop_thread(),
            "must be called on the event-loop thread"
        );
    }
}

/// Cancellable one-shot timer; the scheduled task fires unless this handle is
/// dropped first.
pub(crate) struct Timer {
    join_handle: tokio::task::JoinHandle<()>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

/// Starts the event loop on a dedicated named thread. The state is built on
/// the loop thread itself via `init`, which receives a sender usable for
/// self-posting and timers. Must be called within a tokio runtime, which will
/// back the timers and RPC futures.
pub(crate) fn start<S, F>(thread_name: &str, init: F) -> (EventLoopSender<S>, EventLoopHandle<S>)
where
    S: 'static,
    F: FnOnce(EventLoopSender<S>) -> S + Send + 'static,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<Task<S>>();
    let loop_thread = Arc::new(OnceLock::new());

    let loop_sender = EventLoopSender {
        sender: sender.downgrade(),
        runtime: tokio::runtime::Handle::current(),
        loop_thread: loop_thread.clone(),
    };

    let init_sender = loop_sender.clone();
    let join_handle = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            loop_thread
                .set(thread::current().id())
                .expect("loop thread id is set exactly once");
            let mut state = init(init_sender);
            while let Some(task) = receiver.blocking_recv() {
                task(&mut state);
            }
        })
        .expect("failed to spawn the event-loop thread");

    let handle = EventLoopHandle {
        sender,
        join_handle,
    };
    (loop_sender, handle)
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn posted_tasks_run_in_order_on_the_loop_thread() {
        let (sender, handle) = start("test-loop", |_| Vec::<u32>::new());

        for i in 0..10 {
            sender.post(move |state| state.push(i));
        }

        let (tx, rx) = oneshot::channel();
        let probe = sender.clone();
        sender.post(move |state| {
            assert!(probe.is_event_loop_thread());
            tx.send(state.clone()).unwrap();
        });

        assert_eq!(rx.await.unwrap(), (0..10).collect::<Vec<_>>());
        handle.stop();
    }

    #[tokio::test]
    async fn stop_drains_queued_tasks() {
        let (sender, handle) = start("test-loop", |_| Vec::<u32>::new());

        let (tx, rx) = oneshot::channel();
        sender.post(|state| state.push(1));
        sender.post(move |state| {
            tx.send(state.len()).unwrap();
        });

        handle.stop();
        assert_eq!(rx.await.unwrap(), 1);

        // Posting after stop is a silent no-op.
        sender.post(|state| state.push(2));
    }

    #[tokio::test]
    async fn timer_fires_and_cancels() {
        let (sender, handle) = start("test-loop", |_| Vec::<u32>::new());

        let (tx, rx) = oneshot::channel();
        let fired = sender.schedule(Duration::from_millis(10), move |state| {
            state.push(1);
            tx.send(()).unwrap();
        });
        let cancelled = sender.schedule(Duration::from_millis(10), |state| state.push(2));
        drop(cancelled);

        rx.await.unwrap();

        let (tx, rx) = oneshot::channel();
        sender.post(move |state| tx.send(state.clone()).unwrap());
        assert_eq!(rx.await.unwrap(), vec![1]);

        drop(fired);
        handle.stop();
    }
}
