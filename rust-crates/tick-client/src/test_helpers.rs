//! In-memory backends for exercising the client without a game server.

use crate::{
    backend::{
        GameBackend,
        ReceiptSource,
    },
    command::Command,
    confirm::TickSource,
    error::{
        DispatchError,
        FetchError,
        TransportError,
    },
    messages::{
        Receipt,
        ReceiptBatch,
        Tick,
    },
    session::Session,
};
use chrono::Utc;
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};

#[derive(Clone, Debug)]
pub enum Scripted {
    Reply(Value),
    Fail { status: u16, body: String },
}

impl Scripted {
    pub fn reply(value: Value) -> Self {
        Scripted::Reply(value)
    }

    pub fn fail(status: u16, body: &str) -> Self {
        Scripted::Fail {
            status,
            body: body.to_string(),
        }
    }
}

pub fn accepted_persona(tag: &str) -> Value {
    json!({ "personaTag": tag, "status": "accepted", "tick": 1, "txHash": "0xpersona" })
}

pub fn receipt(tx_hash: &str, tick: Tick) -> Receipt {
    Receipt {
        tx_hash: tx_hash.to_string(),
        tick,
        result: json!({ "success": true }),
        errors: vec![],
    }
}

struct BackendState {
    calls: Vec<String>,
    invocations: Vec<(Command, Value)>,
    scripts: HashMap<Command, VecDeque<Scripted>>,
    session_ttl: chrono::Duration,
    issued: u64,
    fail_auth: bool,
    fail_channel: bool,
    fail_refresh: bool,
}

/// Scripted gateway. Each command answers from its own queue; the last entry
/// repeats once the queue is down to one. Unscripted commands answer 404.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                calls: vec![],
                invocations: vec![],
                scripts: HashMap::new(),
                session_ttl: chrono::Duration::hours(1),
                issued: 0,
                fail_auth: false,
                fail_channel: false,
                fail_refresh: false,
            })),
        }
    }

    pub fn failing_auth(self) -> Self {
        self.state.lock().unwrap().fail_auth = true;
        self
    }

    pub fn failing_channel(self) -> Self {
        self.state.lock().unwrap().fail_channel = true;
        self
    }

    pub fn with_session_ttl(self, ttl: chrono::Duration) -> Self {
        self.set_session_ttl(ttl);
        self
    }

    pub fn with_reply(self, command: Command, value: Value) -> Self {
        self.with_script(command, [Scripted::Reply(value)])
    }

    pub fn with_script(
        self,
        command: Command,
        responses: impl IntoIterator<Item = Scripted>,
    ) -> Self {
        self.script(command, responses);
        self
    }

    pub fn script(&self, command: Command, responses: impl IntoIterator<Item = Scripted>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(command, responses.into_iter().collect());
    }

    pub fn set_session_ttl(&self, ttl: chrono::Duration) {
        self.state.lock().unwrap().session_ttl = ttl;
    }

    pub fn fail_refresh(&self) {
        self.state.lock().unwrap().fail_refresh = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, command: Command) -> usize {
        self.invocations(command).len()
    }

    pub fn invocations(&self, command: Command) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .invocations
            .iter()
            .filter(|(c, _)| *c == command)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn issue(state: &mut BackendState) -> Session {
        state.issued += 1;
        Session::new(
            format!("token-{}", state.issued),
            Some(format!("refresh-{}", state.issued)),
            Utc::now() + state.session_ttl,
        )
    }
}

impl GameBackend for FakeBackend {
    async fn authenticate_email(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Session, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("authenticate".into());
        if state.fail_auth {
            return Err(TransportError::status(401, "invalid credentials"));
        }
        Ok(Self::issue(&mut state))
    }

    async fn refresh_session(&self, _session: &Session) -> Result<Session, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("refresh".into());
        if state.fail_refresh {
            return Err(TransportError::status(401, "refresh token expired"));
        }
        Ok(Self::issue(&mut state))
    }

    async fn open_channel(&self, _session: &Session) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("open-channel".into());
        if state.fail_channel {
            return Err(TransportError::status(503, "socket unavailable"));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        _session: &Session,
        command: Command,
        payload: Value,
    ) -> Result<Value, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(command.name().into());
        state.invocations.push((command, payload));
        let next = match state.scripts.get_mut(&command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match next {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail { status, body }) => Err(TransportError::status(status, body)),
            None => Err(TransportError::status(404, format!("no handler for {command}"))),
        }
    }
}

struct ReceiptState {
    batch: Result<ReceiptBatch, u16>,
    requests: Vec<Tick>,
}

#[derive(Clone)]
pub struct FakeReceiptSource {
    state: Arc<Mutex<ReceiptState>>,
}

impl FakeReceiptSource {
    pub fn new(batch: ReceiptBatch) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReceiptState {
                batch: Ok(batch),
                requests: vec![],
            })),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReceiptState {
                batch: Err(status),
                requests: vec![],
            })),
        }
    }

    /// Start ticks of every fetch, in order.
    pub fn requests(&self) -> Vec<Tick> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl ReceiptSource for FakeReceiptSource {
    async fn fetch_receipts(&self, start_tick: Tick) -> Result<ReceiptBatch, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(start_tick);
        match &state.batch {
            Ok(batch) => Ok(batch.clone()),
            Err(status) => Err(FetchError::Status {
                status: *status,
                body: "receipts unavailable".into(),
            }),
        }
    }
}

/// Tick clock that plays back a fixed sequence; `None` is a failed read.
/// The last reading repeats.
pub struct ScriptedTicks {
    readings: Mutex<VecDeque<Option<Tick>>>,
    reads: AtomicUsize,
}

impl ScriptedTicks {
    pub fn new(readings: impl IntoIterator<Item = Option<Tick>>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TickSource for ScriptedTicks {
    async fn read_tick(&self) -> Result<Tick, DispatchError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut readings = self.readings.lock().unwrap();
        let reading = if readings.len() > 1 {
            readings.pop_front().flatten()
        } else {
            readings.front().copied().flatten()
        };
        reading.ok_or_else(|| DispatchError::Transport {
            command: Command::CurrentTick,
            source: TransportError::status(503, "tick unavailable"),
        })
    }
}
