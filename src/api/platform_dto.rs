use serde::Deserialize;

/// JSON shape of the platform description loaded by the simulated
/// platform proxy.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformDto {
    pub name: String,
    pub resources: Vec<ResourceDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    /// Fully concrete path, e.g. `sys0.cpu0.pe3`.
    pub path: String,
    #[serde(default = "default_units")]
    pub units: String,
    pub total: u64,
}

fn default_units() -> String {
    "%".to_string()
}
