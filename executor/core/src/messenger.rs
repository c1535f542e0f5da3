// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reliable messenger session. Wraps the messenger service's bidirectional
//! stream with reconnection: one outstanding write at a time, a continuous
//! read loop, and a full session restart after any stream error. Queued
//! messages survive restarts; subscriptions are replayed on every reconnect.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use executor_types::{InputMessage, OutputMessage};
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::{
    async_query::{spawn_query, QueryHandle},
    error::ExecutorResult,
    event_loop::{EventLoopSender, Timer},
    metrics::Metrics,
};

/// Dialer for the messenger service stream.
#[async_trait]
pub trait MessengerTransport: Send + Sync + 'static {
    async fn connect(&self) -> ExecutorResult<Box<dyn MessengerSession>>;
}

/// One established messenger stream.
#[async_trait]
pub trait MessengerSession: Send + Sync {
    async fn subscribe(&self, tag: String) -> ExecutorResult<()>;
    async fn write(&self, message: OutputMessage) -> ExecutorResult<()>;
    async fn read(&self) -> ExecutorResult<InputMessage>;
}

type Project<S> = fn(&mut S) -> &mut MessengerAdapter<S>;

pub(crate) struct MessengerAdapter<S> {
    transport: Arc<dyn MessengerTransport>,
    sender: EventLoopSender<S>,
    /// Routes messages of subscribed tags back into the loop state.
    dispatch: fn(&mut S, InputMessage),
    metrics: Arc<Metrics>,
    restart_delay: Duration,

    session: Option<Arc<dyn MessengerSession>>,
    connect_query: Option<QueryHandle<S, Arc<dyn MessengerSession>>>,
    write_query: Option<QueryHandle<S, ()>>,
    read_query: Option<QueryHandle<S, InputMessage>>,

    subscriptions: BTreeSet<String>,
    queued_tags: VecDeque<String>,
    queued_messages: VecDeque<OutputMessage>,
    restart_timer: Option<Timer>,
}

impl<S: 'static> MessengerAdapter<S> {
    pub(crate) fn new(
        transport: Arc<dyn MessengerTransport>,
        sender: EventLoopSender<S>,
        dispatch: fn(&mut S, InputMessage),
        restart_delay: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            transport,
            sender,
            dispatch,
            metrics,
            restart_delay,
            session: None,
            connect_query: None,
            write_query: None,
            read_query: None,
            subscriptions: BTreeSet::new(),
            queued_tags: VecDeque::new(),
            queued_messages: VecDeque::new(),
            restart_timer: None,
        }
    }

    /// Registers a server-side subscription; replayed on every session start.
    pub(crate) fn subscribe(state: &mut S, project: Project<S>, tag: String) {
        let this = project(state);
        if this.subscriptions.insert(tag.clone()) {
            this.queued_tags.push_back(tag);
            Self::write(state, project);
        }
    }

    /// Queues a message for delivery to one peer. Messages to the same peer
    /// leave in the order they were queued.
    pub(crate) fn send(state: &mut S, project: Project<S>, message: OutputMessage) {
        let this = project(state);
        this.queued_messages.push_back(message);
        Self::write(state, project);
    }

    pub(crate) fn start(state: &mut S, project: Project<S>) {
        Self::start_session(state, project);
    }

    fn start_session(state: &mut S, project: Project<S>) {
        let this = project(state);
        this.restart_timer = None;

        let transport = this.transport.clone();
        let sender = this.sender.clone();
        this.connect_query = Some(spawn_query(
            &sender,
            true,
            async move {
                let session = transport.connect().await?;
                let session: Arc<dyn MessengerSession> = Arc::from(session);
                Ok(session)
            },
            move |state: &mut S, result| Self::on_session_initiated(state, project, result),
        ));
    }

    fn on_session_initiated(
        state: &mut S,
        project: Project<S>,
        result: ExecutorResult<Arc<dyn MessengerSession>>,
    ) {
        let this = project(state);
        this.connect_query = None;
        match result {
            Ok(session) => {
                debug!("Messenger session established");
                this.session = Some(session);
                Self::write(state, project);
                Self::read(state, project);
            }
            Err(err) => {
                warn!("Messenger session could not be established: {err}");
                Self::restart_session(state, project);
            }
        }
    }

    fn write(state: &mut S, project: Project<S>) {
        let this = project(state);
        if this.write_query.is_some() {
            return;
        }
        let Some(session) = this.session.clone() else {
            return;
        };

        // Pending subscriptions drain before outbound messages.
        let future: BoxFuture<'static, ExecutorResult<()>> =
            if let Some(tag) = this.queued_tags.pop_front() {
                Box::pin(async move { session.subscribe(tag).await })
            } else if let Some(message) = this.queued_messages.pop_front() {
                Box::pin(async move { session.write(message).await })
            } else {
                return;
            };

        let sender = this.sender.clone();
        this.write_query = Some(spawn_query(
            &sender,
            true,
            future,
            move |state: &mut S, result| Self::on_written(state, project, result),
        ));
    }

    fn on_written(state: &mut S, project: Project<S>, result: ExecutorResult<()>) {
        let this = project(state);
        this.write_query = None;
        match result {
            Ok(()) => Self::write(state, project),
            Err(err) => {
                warn!("Messenger write failed: {err}");
                Self::restart_session(state, project);
            }
        }
    }

    fn read(state: &mut S, project: Project<S>) {
        let this = project(state);
        let Some(session) = this.session.clone() else {
            return;
        };
        let sender = this.sender.clone();
        this.read_query = Some(spawn_query(
            &sender,
            true,
            async move { session.read().await },
            move |state: &mut S, result| Self::on_read(state, project, result),
        ));
    }

    fn on_read(state: &mut S, project: Project<S>, result: ExecutorResult<InputMessage>) {
        let this = project(state);
        this.read_query = None;
        match result {
            Ok(message) => {
                if this.subscriptions.contains(&message.tag) {
                    let dispatch = this.dispatch;
                    dispatch(state, message);
                } else {
                    warn!("Received message with unknown tag: {}", message.tag);
                }
                Self::read(state, project);
            }
            Err(err) => {
                warn!("Messenger read failed: {err}");
                Self::restart_session(state, project);
            }
        }
    }

    /// Tears the session down and schedules a reconnect. In-flight writes are
    /// dropped, queued messages are preserved, and all subscriptions are
    /// queued again for the next session.
    fn restart_session(state: &mut S, project: Project<S>) {
        let this = project(state);
        this.metrics.node_metrics.messenger_restarts.inc();

        this.session = None;
        this.connect_query = None;
        this.write_query = None;
        this.read_query = None;
        this.queued_tags = this.subscriptions.iter().cloned().collect();

        let sender = this.sender.clone();
        this.restart_timer = Some(sender.schedule(this.restart_delay, move |state: &mut S| {
            Self::start_session(state, project)
        }));
    }
}
