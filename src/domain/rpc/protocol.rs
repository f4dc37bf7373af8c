use serde::{Deserialize, Serialize};

use crate::domain::utils::id::{AppUid, SessionToken};

/// Fixed header carried by every message: the correlation token plus the
/// application/execution-context the message concerns. Every response
/// echoes the token of its request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct MessageHeader {
    pub token: SessionToken,
    pub app: AppUid,
}

impl MessageHeader {
    pub fn new(token: SessionToken, app: AppUid) -> Self {
        Self { token, app }
    }
}

/// Outcome carried by response messages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcResult {
    Ok,
    Failed,
}

/// One constraint assertion carried by a set-constraints request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ConstraintRequest {
    AwmLowerBound { awm_id: u8, add: bool },
    AwmUpperBound { awm_id: u8, add: bool },
    AwmExact { awm_id: u8, enable: bool },
    Resource { path: String, lower: Option<u64>, upper: Option<u64> },
}

/// Per-system resource quantities announced by a pre-change notification.
/// Accelerator fields are optional: not every platform exposes them.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreChangeSystem {
    pub sys_id: u32,
    pub cpu_ids: Vec<u32>,
    pub cpu_quota: u64,
    pub proc_elements: u64,
    pub memory: u64,
    pub gpu_bandwidth: Option<u64>,
    pub dev_id: Option<u32>,
}

/// Every record exchanged with the runtime library. Requests flow from
/// the application to the daemon; the `Sync*` commands flow the other way
/// as part of the four-phase protocol.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RpcMessage {
    // --- application -> daemon requests
    AppPair { header: MessageHeader, app_name: String },
    AppExit { header: MessageHeader },
    ExcRegister { header: MessageHeader, name: String, recipe: String, language: String },
    ExcUnregister { header: MessageHeader },
    ExcStart { header: MessageHeader },
    ExcStop { header: MessageHeader },
    ExcSchedule { header: MessageHeader },
    ExcSetConstraints { header: MessageHeader, constraints: Vec<ConstraintRequest> },
    ExcClearConstraints { header: MessageHeader },
    ExcRuntimeNotify { header: MessageHeader, goal_gap_percent: i32, cpu_usage: f32, cycle_time_ms: u32 },

    // --- daemon -> application commands
    StopExecution { header: MessageHeader, timeout_ms: u32 },
    GetProfile { header: MessageHeader },
    GetProfileResp { header: MessageHeader, goal_gap_percent: i32, cpu_usage: f32, cycle_time_ms: u32 },

    // --- synchronization protocol
    SyncPreChange { header: MessageHeader, sync_state: String, awm_id: u8, systems: Vec<PreChangeSystem> },
    SyncPreChangeResp { header: MessageHeader, result: RpcResult, sync_latency_ms: u32 },
    SyncChange { header: MessageHeader },
    SyncChangeResp { header: MessageHeader, result: RpcResult },
    SyncDoChange { header: MessageHeader },
    SyncPostChange { header: MessageHeader },
    SyncPostChangeResp { header: MessageHeader, result: RpcResult },
}

impl RpcMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            RpcMessage::AppPair { header, .. }
            | RpcMessage::AppExit { header }
            | RpcMessage::ExcRegister { header, .. }
            | RpcMessage::ExcUnregister { header }
            | RpcMessage::ExcStart { header }
            | RpcMessage::ExcStop { header }
            | RpcMessage::ExcSchedule { header }
            | RpcMessage::ExcSetConstraints { header, .. }
            | RpcMessage::ExcClearConstraints { header }
            | RpcMessage::ExcRuntimeNotify { header, .. }
            | RpcMessage::StopExecution { header, .. }
            | RpcMessage::GetProfile { header }
            | RpcMessage::GetProfileResp { header, .. }
            | RpcMessage::SyncPreChange { header, .. }
            | RpcMessage::SyncPreChangeResp { header, .. }
            | RpcMessage::SyncChange { header }
            | RpcMessage::SyncChangeResp { header, .. }
            | RpcMessage::SyncDoChange { header }
            | RpcMessage::SyncPostChange { header }
            | RpcMessage::SyncPostChangeResp { header, .. } => header,
        }
    }

    /// True for the replies matched to an outstanding command session.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            RpcMessage::SyncPreChangeResp { .. } | RpcMessage::SyncChangeResp { .. } | RpcMessage::SyncPostChangeResp { .. } | RpcMessage::GetProfileResp { .. }
        )
    }
}
