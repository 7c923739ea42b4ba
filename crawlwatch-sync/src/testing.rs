//! Scripted transports for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use crawlwatch_client::{ClientError, EventStream, StreamFrame};
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::dto::StatusUpdate;
use futures::channel::mpsc;

use crate::transport::{StatusSource, StreamConnector};

pub type FrameSender = mpsc::UnboundedSender<Result<StreamFrame, ClientError>>;

pub fn frame(data: &str) -> StreamFrame {
    StreamFrame {
        event: "message".to_string(),
        data: data.to_string(),
    }
}

/// Scripted reply of a [`ScriptedStatus`]
#[derive(Debug, Clone)]
pub enum Reply {
    Update(StatusUpdate),
    Transient,
    Unauthorized,
    NotFound,
}

impl Reply {
    fn into_result(self) -> Result<StatusUpdate, ClientError> {
        match self {
            Reply::Update(update) => Ok(update),
            Reply::Transient => Err(ClientError::from_status(503, "unavailable")),
            Reply::Unauthorized => Err(ClientError::from_status(401, "bad token")),
            Reply::NotFound => Err(ClientError::from_status(404, "no such job")),
        }
    }
}

/// Status source replaying queued replies, repeating the last one
pub struct ScriptedStatus {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    calls: AtomicUsize,
}

impl ScriptedStatus {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(Reply::Transient),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn fetch_status(
        &self,
        _job_id: &JobId,
        _kind: JobKind,
    ) -> Result<StatusUpdate, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = reply;
        }
        last.clone().into_result()
    }
}

enum Session {
    Accept(mpsc::UnboundedReceiver<Result<StreamFrame, ClientError>>),
    Reject(u16),
}

/// Stream connector handing out queued sessions, rejecting once exhausted
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<Session>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        }
    }

    /// Queue an accepted connection, returning the server side of it
    pub fn accept(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded();
        self.sessions.lock().unwrap().push_back(Session::Accept(rx));
        tx
    }

    pub fn reject(&self) {
        self.reject_with_status(502);
    }

    pub fn reject_with_status(&self, status: u16) {
        self.sessions.lock().unwrap().push_back(Session::Reject(status));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, _job_id: &JobId) -> Result<EventStream, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.sessions.lock().unwrap().pop_front() {
            Some(Session::Accept(rx)) => Ok(Box::pin(rx)),
            Some(Session::Reject(status)) => Err(ClientError::from_status(status, "refused")),
            None => Err(ClientError::from_status(502, "bad gateway")),
        }
    }
}
