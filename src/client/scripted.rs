//! Scripted transport for unit tests.

use crate::client::transport::{BrokerRequest, BrokerTransport, TransportError, TransportResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;

type Reply = Result<TransportResponse, TransportError>;

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<BrokerRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, status: u16, body: Value) -> Self {
        self.replies
            .lock()
            .push_back(Ok(TransportResponse::new(status, body)));
        self
    }

    pub(crate) fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .push_back(Err(TransportError(message.to_string())));
        self
    }

    pub(crate) fn requests(&self) -> Vec<BrokerRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BrokerTransport for ScriptedTransport {
    async fn send(&self, request: BrokerRequest) -> Reply {
        self.requests.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted reply".to_string())))
    }
}
