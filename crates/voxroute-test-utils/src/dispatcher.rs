//! Scripted premium dispatcher.
//!
//! Outcomes are popped from a FIFO queue. When the queue is empty the
//! dispatcher accepts the call with a generated conversation id.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;
use voxroute_core::models::CallTask;
use voxroute_core::traits::{DispatchReceipt, PremiumDispatcher};
use voxroute_core::DispatchError;

pub struct ScriptedDispatcher {
    outcomes: Mutex<VecDeque<Result<DispatchReceipt, DispatchError>>>,
    dispatched: Mutex<Vec<Uuid>>,
}

impl ScriptedDispatcher {
    /// Accept every call.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Reject the first call with `error`, then accept.
    pub fn failing(error: DispatchError) -> Self {
        let dispatcher = Self::new();
        dispatcher.push(Err(error));
        dispatcher
    }

    /// Queue the outcome of the next dispatch.
    pub fn push(&self, outcome: Result<DispatchReceipt, DispatchError>) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Ids of the calls dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<Uuid> {
        self.dispatched.lock().clone()
    }
}

impl Default for ScriptedDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PremiumDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, call: &CallTask) -> Result<DispatchReceipt, DispatchError> {
        self.dispatched.lock().push(call.id);

        self.outcomes.lock().pop_front().unwrap_or_else(|| {
            Ok(DispatchReceipt {
                status: 200,
                conversation_id: Some(format!("conv-{}", call.id)),
                carrier_call_sid: None,
            })
        })
    }
}
