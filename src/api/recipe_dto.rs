use serde::Deserialize;
use std::collections::HashMap;

/// JSON shape of a recipe file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDto {
    pub name: String,
    #[serde(default)]
    pub priority: u8,
    pub working_modes: Vec<WorkingModeDto>,
    #[serde(default)]
    pub constraints: Vec<ResourceConstraintDto>,
    #[serde(default)]
    pub plugin_data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingModeDto {
    pub id: u8,
    pub name: String,
    pub value: f32,
    /// Resource requests, amount per path string (e.g. `"sys0.cpu*.pe*": 200`).
    pub requests: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConstraintDto {
    pub path: String,
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}
