//! Shared fixtures for orchestrator tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tree_core::TreeConfig;
use tree_llm::{Completion, CompletionError, CompletionGateway, CompletionRequest};
use tree_state::TreeOrchestrator;

pub const DEFAULT_ANSWER: &str = "Default answer";

/// Holds completion calls until the test releases them
pub struct Gate {
    started: Semaphore,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    /// Wait until `n` calls have reached the gateway
    pub async fn wait_started(&self, n: u32) {
        self.started.acquire_many(n).await.unwrap().forget();
    }

    /// Let `n` waiting calls return
    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }
}

/// Gateway that replays scripted results in order and records every request
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<Completion, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(Completion::new(text)));
    }

    pub fn fail(&self, error: CompletionError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Hold every following call at `gate`
    pub fn set_gate(&self, gate: Arc<Gate>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests().pop().expect("no request recorded")
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, request: CompletionRequest) -> tree_llm::Result<Completion> {
        self.requests.lock().unwrap().push(request);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.started.add_permits(1);
            gate.release.acquire().await.unwrap().forget();
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::new(DEFAULT_ANSWER)))
    }
}

pub fn test_config() -> TreeConfig {
    TreeConfig {
        api_key: None,
        save_debounce_ms: 50,
        ..TreeConfig::default()
    }
}

pub fn orchestrator(gateway: &Arc<ScriptedGateway>) -> TreeOrchestrator {
    TreeOrchestrator::new(test_config(), gateway.clone())
}
