use serde::Deserialize;
use std::collections::HashMap;

/// JSON shape of the daemon configuration file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDto {
    /// Active scheduling policy, discovered by name.
    #[serde(default = "default_policy")]
    pub policy: String,

    /// Lowest (numerically highest) application priority.
    #[serde(default = "default_lowest_priority")]
    pub lowest_priority: u8,

    /// Timeout shared by all phases of the synchronization protocol, ms.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Bind address of the RPC endpoint.
    #[serde(default = "default_rpc_bind")]
    pub rpc_bind: String,

    /// Platform description file registered at startup.
    pub platform_path: String,

    /// Directory the recipe loader resolves recipe names in.
    #[serde(default = "default_recipe_dir")]
    pub recipe_dir: String,

    /// Optional CSV statistics output.
    #[serde(default)]
    pub stats_path: Option<String>,

    /// Contribution weights by name ("value", "reconfig", "fairness",
    /// "migration", "congestion"); normalized at load time.
    #[serde(default)]
    pub contrib_weights: HashMap<String, f32>,

    /// Base of the exponential penalty kernels.
    #[serde(default = "default_expbase")]
    pub expbase: f32,

    /// Maximum saturation level per resource type name, percent.
    #[serde(default)]
    pub max_saturation: HashMap<String, f32>,
}

fn default_policy() -> String {
    "metric".to_string()
}

fn default_lowest_priority() -> u8 {
    4
}

fn default_rpc_timeout_ms() -> u64 {
    500
}

fn default_rpc_bind() -> String {
    "127.0.0.1:5570".to_string()
}

fn default_recipe_dir() -> String {
    "recipes".to_string()
}

fn default_expbase() -> f32 {
    2.0
}
