use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed enumeration of the resource classes a platform can expose.
///
/// The textual forms are the ones used in resource path strings, e.g.
/// `sys0.cpu1.pe3` or `sys0.mem0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    System,
    Cpu,
    ProcessingElement,
    Memory,
    Gpu,
    Accelerator,
    Io,
    Network,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        ResourceType::System,
        ResourceType::Cpu,
        ResourceType::ProcessingElement,
        ResourceType::Memory,
        ResourceType::Gpu,
        ResourceType::Accelerator,
        ResourceType::Io,
        ResourceType::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::System => "sys",
            ResourceType::Cpu => "cpu",
            ResourceType::ProcessingElement => "pe",
            ResourceType::Memory => "mem",
            ResourceType::Gpu => "gpu",
            ResourceType::Accelerator => "acc",
            ResourceType::Io => "io",
            ResourceType::Network => "net",
        }
    }

    /// Parses the textual form (without a trailing id).
    pub fn parse(s: &str) -> Option<ResourceType> {
        match s {
            "sys" => Some(ResourceType::System),
            "cpu" => Some(ResourceType::Cpu),
            "pe" => Some(ResourceType::ProcessingElement),
            "mem" => Some(ResourceType::Memory),
            "gpu" => Some(ResourceType::Gpu),
            "acc" => Some(ResourceType::Accelerator),
            "io" => Some(ResourceType::Io),
            "net" => Some(ResourceType::Network),
            _ => None,
        }
    }

    /// True for the types policies use as binding domains, i.e. the types
    /// whose instances partition the hardware for locality purposes.
    pub fn is_binding_domain(&self) -> bool {
        matches!(self, ResourceType::Cpu | ResourceType::Gpu | ResourceType::Accelerator)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
