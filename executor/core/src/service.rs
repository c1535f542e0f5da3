// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Session with the hosting node. Inbound commands are decoded and dispatched
//! onto the event loop; outbound announcements go through a single write
//! pipeline. Unlike the messenger session there is no reconnect: a stream
//! error shuts this executor instance down, and the host re-establishes.

use std::{collections::VecDeque, sync::Arc};

use tracing::{debug, error};

use crate::{
    async_query::{spawn_query, QueryHandle},
    error::ExecutorResult,
    event_loop::EventLoopSender,
    host::{HostAnnouncement, HostCommand, HostLink, HostSession},
};

type Project<S> = fn(&mut S) -> &mut HostAdapter<S>;

pub(crate) struct HostAdapter<S> {
    link: Arc<dyn HostLink>,
    sender: EventLoopSender<S>,
    dispatch: fn(&mut S, HostCommand),
    on_failure: fn(&mut S),

    session: Option<Arc<dyn HostSession>>,
    connect_query: Option<QueryHandle<S, Arc<dyn HostSession>>>,
    read_query: Option<QueryHandle<S, HostCommand>>,
    write_query: Option<QueryHandle<S, ()>>,
    queued_announcements: VecDeque<HostAnnouncement>,
}

impl<S: 'static> HostAdapter<S> {
    pub(crate) fn new(
        link: Arc<dyn HostLink>,
        sender: EventLoopSender<S>,
        dispatch: fn(&mut S, HostCommand),
        on_failure: fn(&mut S),
    ) -> Self {
        Self {
            link,
            sender,
            dispatch,
            on_failure,
            session: None,
            connect_query: None,
            read_query: None,
            write_query: None,
            queued_announcements: VecDeque::new(),
        }
    }

    pub(crate) fn start(state: &mut S, project: Project<S>) {
        let this = project(state);
        let link = this.link.clone();
        let sender = this.sender.clone();
        this.connect_query = Some(spawn_query(
            &sender,
            true,
            async move {
                let session = link.connect().await?;
                let session: Arc<dyn HostSession> = Arc::from(session);
                Ok(session)
            },
            move |state: &mut S, result| Self::on_connected(state, project, result),
        ));
    }

    /// Queues an announcement for the hosting node.
    pub(crate) fn send(state: &mut S, project: Project<S>, announcement: HostAnnouncement) {
        let this = project(state);
        this.queued_announcements.push_back(announcement);
        Self::write(state, project);
    }

    fn on_connected(
        state: &mut S,
        project: Project<S>,
        result: ExecutorResult<Arc<dyn HostSession>>,
    ) {
        let this = project(state);
        this.connect_query = None;
        match result {
            Ok(session) => {
                debug!("Host session established");
                this.session = Some(session);
                Self::read(state, project);
                Self::write(state, project);
            }
            Err(err) => Self::fail(state, project, err),
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
            async move { session.recv().await },
            move |state: &mut S, result| Self::on_command(state, project, result),
        ));
    }

    fn on_command(state: &mut S, project: Project<S>, result: ExecutorResult<HostCommand>) {
        let this = project(state);
        this.read_query = None;
        match result {
            Ok(command) => {
                let dispatch = this.dispatch;
                dispatch(state, command);
                Self::read(state, project);
            }
            Err(err) => Self::fail(state, project, err),
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
        let Some(announcement) = this.queued_announcements.pop_front() else {
            return;
        };

        let sender = this.sender.clone();
        this.write_query = Some(spawn_query(
            &sender,
            true,
            async move { session.send(announcement).await },
            move |state: &mut S, result| Self::on_written(state, project, result),
        ));
    }

    fn on_written(state: &mut S, project: Project<S>, result: ExecutorResult<()>) {
        let this = project(state);
        this.write_query = None;
        match result {
            Ok(()) => Self::write(state, project),
            Err(err) => Self::fail(state, project, err),
        }
    }

    fn fail(state: &mut S, project: Project<S>, err: crate::error::ExecutorError) {
        error!("Host session failed, shutting the executor down: {err}");
        let this = project(state);
        this.session = None;
        this.connect_query = None;
        this.read_query = None;
        this.write_query = None;
        let on_failure = this.on_failure;
        on_failure(state);
    }
}
