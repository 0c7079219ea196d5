use serde::{Deserialize, Serialize};

use faas_manifest::{Affinity, Toleration};

fn default_replicas() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushRequest {
    pub registry_url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tag: Option<String>,
    pub app_dir: String,
    pub workspace_id: String,
    #[serde(default)]
    pub s3_source_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScaffoldRequest {
    pub image_ref: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Toleration entry as supplied by deploy callers; unset fields fall back to
/// the conventional defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TolerationInput {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl From<TolerationInput> for Toleration {
    fn from(input: TolerationInput) -> Self {
        Toleration {
            key: input.key,
            operator: input.operator.unwrap_or_else(|| "Exists".to_string()),
            effect: input.effect.unwrap_or_else(|| "NoSchedule".to_string()),
            value: input.value,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub app_name: Option<String>,
    pub namespace: String,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub cpu_request: Option<String>,
    #[serde(default)]
    pub memory_request: Option<String>,
    pub image_ref: String,
    #[serde(default = "default_true")]
    pub enable_autoscaling: bool,
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default = "default_true")]
    pub use_spot: bool,
    #[serde(default)]
    pub custom_tolerations: Option<Vec<TolerationInput>>,
    #[serde(default)]
    pub custom_affinity: Option<Affinity>,
    // Accepted for wire compatibility with older callers; no longer used.
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub target_port: Option<u16>,
}
