use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
    sync::{Arc, Condvar, Mutex, RwLock},
    time::Duration,
};

use crate::domain::rpc::protocol::RpcMessage;
use crate::domain::utils::id::SessionToken;
use crate::error::{Error, Result};

/// Internal state of one command gate.
#[derive(Debug, Default)]
struct GateState {
    reply: Option<RpcMessage>,
    /// Set when the session is torn down without a reply (connection loss,
    /// daemon shutdown); waiters fail with a channel error.
    closed: bool,
}

/// A synchronization helper letting the thread that issued an RPC command
/// wait for the matching response, delivered by the dispatcher under the
/// request token.
#[derive(Debug)]
pub struct CommandGate {
    pair: (Mutex<GateState>, Condvar),
}

impl CommandGate {
    fn new() -> Self {
        Self { pair: (Mutex::new(GateState::default()), Condvar::new()) }
    }

    /// Called by the dispatcher when the response arrives.
    pub fn notify(&self, reply: RpcMessage) {
        let (lock, cvar) = &self.pair;
        let mut state = lock.lock().expect("command gate lock poisoned");
        state.reply = Some(reply);
        cvar.notify_all();
    }

    /// Called when the session dies without a reply.
    pub fn close(&self) {
        let (lock, cvar) = &self.pair;
        let mut state = lock.lock().expect("command gate lock poisoned");
        state.closed = true;
        cvar.notify_all();
    }

    /// Blocks until the response arrives, the gate is closed, or the
    /// timeout elapses.
    pub fn wait_with_timeout(&self, timeout: Duration) -> Result<RpcMessage> {
        let (lock, cvar) = &self.pair;
        let mut state = lock.lock().expect("command gate lock poisoned");

        while state.reply.is_none() && !state.closed {
            let (next, wait) = cvar.wait_timeout(state, timeout).expect("command gate lock poisoned");
            state = next;
            if wait.timed_out() && state.reply.is_none() && !state.closed {
                return Err(Error::RpcTimeout(format!("no reply within {:?}", timeout)));
            }
        }
        if let Some(reply) = state.reply.take() {
            return Ok(reply);
        }
        Err(Error::RpcChannel("session closed before a reply arrived".to_string()))
    }
}

/// The state bundle map for outstanding RPC calls: sessions are registered
/// under their token on dispatch and released on completion or timeout.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    gates: Arc<RwLock<HashMap<SessionToken, Arc<CommandGate>>>>,
    next_token: Arc<AtomicU32>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { gates: Arc::new(RwLock::new(HashMap::new())), next_token: Arc::new(AtomicU32::new(1)) }
    }

    /// Allocates a fresh token and registers a gate for it.
    pub fn open(&self) -> (SessionToken, Arc<CommandGate>) {
        let token = SessionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let gate = Arc::new(CommandGate::new());
        self.gates.write().expect("session registry lock poisoned").insert(token, gate.clone());
        (token, gate)
    }

    /// Routes a response to its waiting gate. Returns false for an unknown
    /// (e.g. already timed-out) token.
    pub fn notify(&self, token: SessionToken, reply: RpcMessage) -> bool {
        let gate = self.gates.read().expect("session registry lock poisoned").get(&token).cloned();
        match gate {
            Some(gate) => {
                gate.notify(reply);
                true
            }
            None => false,
        }
    }

    pub fn release(&self, token: SessionToken) {
        self.gates.write().expect("session registry lock poisoned").remove(&token);
    }

    /// Closes every outstanding gate, failing their waiters.
    pub fn close_all(&self) {
        for gate in self.gates.read().expect("session registry lock poisoned").values() {
            gate.close();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.gates.read().expect("session registry lock poisoned").len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rpc::protocol::MessageHeader;
    use crate::domain::utils::id::AppUid;
    use std::thread;

    #[test]
    fn reply_wakes_the_waiter() {
        let registry = SessionRegistry::new();
        let (token, gate) = registry.open();

        let registry2 = registry.clone();
        let handle = thread::spawn(move || {
            let reply = RpcMessage::SyncChangeResp {
                header: MessageHeader::new(token, AppUid::new(1, 0)),
                result: crate::domain::rpc::protocol::RpcResult::Ok,
            };
            assert!(registry2.notify(token, reply));
        });

        let reply = gate.wait_with_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(reply.header().token, token);
        handle.join().unwrap();
        registry.release(token);
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn timeout_is_reported() {
        let registry = SessionRegistry::new();
        let (_token, gate) = registry.open();
        let err = gate.wait_with_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::RpcTimeout(_)));
    }

    #[test]
    fn unknown_token_is_dropped() {
        let registry = SessionRegistry::new();
        let reply = RpcMessage::SyncChangeResp {
            header: MessageHeader::new(SessionToken(99), AppUid::new(1, 0)),
            result: crate::domain::rpc::protocol::RpcResult::Ok,
        };
        assert!(!registry.notify(SessionToken(99), reply));
    }
}
