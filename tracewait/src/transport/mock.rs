//! Scripted in-memory transport for driving the receive loop in tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Transport;
use crate::error::TransportError;

/// How long an idle `read()` waits before reporting "no data".
const IDLE_POLL: Duration = Duration::from_millis(10);

enum Incoming {
    Line(String),
    Transient,
    Broken,
}

/// Transport whose receive side is fed by the test.
///
/// Commands registered with [`reply_to`](Self::reply_to) enqueue their
/// scripted output when sent, which lets a test register a filter, send,
/// and observe the response in a deterministic order.
pub(crate) struct ScriptedTransport {
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    sent: Mutex<Vec<(String, bool)>>,
    fail_sends: AtomicBool,
    connects: AtomicUsize,
    quits: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            replies: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            quits: AtomicUsize::new(0),
        })
    }

    pub(crate) fn push_line(&self, line: &str) {
        let _ = self.incoming_tx.send(Incoming::Line(line.to_string()));
    }

    pub(crate) fn push_lines(&self, lines: &[&str]) {
        for line in lines {
            self.push_line(line);
        }
    }

    pub(crate) fn push_transient_error(&self) {
        let _ = self.incoming_tx.send(Incoming::Transient);
    }

    pub(crate) fn push_broken(&self) {
        let _ = self.incoming_tx.send(Incoming::Broken);
    }

    /// Enqueue `lines` every time `command` is sent.
    pub(crate) fn reply_to(&self, command: &str, lines: &[&str]) {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Whether each sent command asked for a line terminator.
    pub(crate) fn terminators(&self) -> Vec<bool> {
        self.sent.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn quit_count(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, payload: &[u8], append_terminator: bool) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::other("write failed")));
        }
        let command = String::from_utf8_lossy(payload).into_owned();
        self.sent
            .lock()
            .unwrap()
            .push((command.clone(), append_terminator));
        if let Some(lines) = self.replies.lock().unwrap().get(&command) {
            for line in lines {
                let _ = self.incoming_tx.send(Incoming::Line(line.clone()));
            }
        }
        Ok(())
    }

    async fn read(&self) -> Result<Option<String>, TransportError> {
        let mut rx = self.incoming_rx.lock().await;
        match tokio::time::timeout(IDLE_POLL, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(Incoming::Line(line))) => Ok(Some(line)),
            Ok(Some(Incoming::Transient)) => {
                Err(TransportError::Io(io::Error::other("glitch on the wire")))
            }
            Ok(Some(Incoming::Broken)) | Ok(None) => Err(TransportError::broken("scripted")),
        }
    }

    async fn quit(&self) -> Result<(), TransportError> {
        self.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
