use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of one execution context: the owning process id plus
/// the execution context id within that process. An application may expose
/// several execution contexts, each is scheduled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppUid {
    pub pid: i32,
    pub exc_id: u8,
}

impl AppUid {
    pub fn new(pid: i32, exc_id: u8) -> Self {
        Self { pid, exc_id }
    }
}

impl fmt::Display for AppUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.exc_id)
    }
}

/// Correlation token of one outstanding RPC call. Every response echoes the
/// token of the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u32);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one candidate binding within a working mode's binding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingRef(pub u32);

impl fmt::Display for BindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}
