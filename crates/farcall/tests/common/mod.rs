#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use farcall::core::{DispatchError, RELEASE_METHOD, ReferenceId};
use farcall::transport::{Args, CancellationToken, DataStream, Dispatcher};
use farcall::RemoteReference;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum CallKind {
    Invoke,
    InvokeVoid,
    OpenStream { max_length: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub target: ReferenceId,
    pub method: String,
    pub args: Args,
}

/// Fake dispatcher that records every call reaching it.
///
/// Methods added with [`gate`](Self::gate) park until [`open_gate`](Self::open_gate).
pub struct RecordingDispatcher {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<HashMap<String, Value>>,
    gated: Mutex<HashSet<String>>,
    gate: CancellationToken,
    release_error: Mutex<Option<DispatchError>>,
    completed_releases: AtomicUsize,
    content: Bytes,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Self::with_content(Bytes::new())
    }

    pub fn with_content(content: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            gated: Mutex::new(HashSet::new()),
            gate: CancellationToken::new(),
            release_error: Mutex::new(None),
            completed_releases: AtomicUsize::new(0),
            content: content.into(),
        })
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(method.to_string(), value);
    }

    pub fn gate(&self, method: &str) {
        self.gated.lock().unwrap().insert(method.to_string());
    }

    pub fn open_gate(&self) {
        self.gate.cancel();
    }

    pub fn fail_release(&self, err: DispatchError) {
        *self.release_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Release notifications that reached the dispatcher.
    pub fn releases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.kind == CallKind::InvokeVoid && call.method == RELEASE_METHOD)
            .count()
    }

    /// Release notifications that ran to completion.
    pub fn completed_releases(&self) -> usize {
        self.completed_releases.load(Ordering::SeqCst)
    }

    /// Waits until a call to `method` has reached the dispatcher.
    pub async fn wait_for(&self, method: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.calls().iter().any(|call| call.method == method) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("call never reached the dispatcher");
    }

    fn record(&self, kind: CallKind, target: ReferenceId, method: &str, args: Args) {
        self.calls.lock().unwrap().push(RecordedCall {
            kind,
            target,
            method: method.to_string(),
            args,
        });
    }

    async fn pass_gate(&self, method: &str) {
        let gated = self.gated.lock().unwrap().contains(method);
        if gated {
            self.gate.cancelled().await;
        }
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn invoke(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        _cancel: Option<CancellationToken>,
    ) -> Result<Value, DispatchError> {
        self.record(CallKind::Invoke, target, method, args);
        self.pass_gate(method).await;
        let response = self.responses.lock().unwrap().get(method).cloned();
        response.ok_or_else(|| DispatchError::host_exception(format!("no response for '{method}'")))
    }

    async fn invoke_void(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        _cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        self.record(CallKind::InvokeVoid, target, method, args);
        tokio::task::yield_now().await;
        self.pass_gate(method).await;

        if method == RELEASE_METHOD {
            let failure = self.release_error.lock().unwrap().clone();
            self.completed_releases.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = failure {
                return Err(err);
            }
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        target: ReferenceId,
        max_length: u64,
        _cancel: Option<CancellationToken>,
    ) -> Result<DataStream, DispatchError> {
        self.record(CallKind::OpenStream { max_length }, target, "", Args::none());
        let chunks: Vec<Bytes> = (0..self.content.len())
            .step_by(7)
            .map(|start| self.content.slice(start..(start + 7).min(self.content.len())))
            .collect();
        // Deliberately ignores the requested budget.
        Ok(DataStream::from_chunks(chunks, u64::MAX))
    }
}

pub fn handle(recorder: &Arc<RecordingDispatcher>, id: u64) -> RemoteReference {
    let dispatcher: Arc<dyn Dispatcher> = recorder.clone();
    RemoteReference::new(dispatcher, ReferenceId(id))
}
