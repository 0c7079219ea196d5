use std::path::PathBuf;

use envconfig::Envconfig;

/// Process-wide settings, read once from the environment at startup and passed
/// into the services that need them.
#[derive(Clone, Debug, Envconfig)]
pub struct Settings {
    #[envconfig(from = "API_HOST", default = "0.0.0.0")]
    pub api_host: String,

    #[envconfig(from = "API_PORT", default = "8000")]
    pub api_port: u16,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "S3_BUCKET_NAME", default = "faas-functions-code")]
    pub s3_bucket: String,

    #[envconfig(from = "S3_SOURCE_PREFIX", default = "build-sources")]
    pub source_prefix: String,

    #[envconfig(from = "S3_ARTIFACT_PREFIX", default = "build-artifacts")]
    pub artifact_prefix: String,

    #[envconfig(from = "DYNAMODB_TABLE_NAME", default = "FaaSData")]
    pub dynamodb_table: String,

    #[envconfig(from = "AWS_REGION", default = "us-east-1")]
    pub aws_region: String,

    /// Remote compile service. When unset the process falls back to the mock
    /// client and is fully self-contained.
    #[envconfig(from = "CORE_SERVICE_ENDPOINT")]
    pub core_service_endpoint: Option<String>,

    #[envconfig(from = "CORE_SERVICE_TIMEOUT", default = "300")]
    pub core_service_timeout_secs: u64,

    /// Default registry for build-and-push requests that do not name one.
    #[envconfig(from = "REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Pre-baked tool tree with componentize-py and the spin SDK installed.
    #[envconfig(from = "VENV_TEMPLATE_PATH", default = "/opt/spin-python-venv")]
    pub venv_template_path: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    /// True when a remote compile service endpoint has been configured.
    pub fn core_service_configured(&self) -> bool {
        self.core_service_endpoint
            .as_deref()
            .map(|e| !e.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = Settings::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(settings.api_port, 8000);
        assert_eq!(settings.source_prefix, "build-sources");
        assert_eq!(settings.artifact_prefix, "build-artifacts");
        assert_eq!(settings.core_service_timeout_secs, 300);
        assert_eq!(
            settings.venv_template_path,
            PathBuf::from("/opt/spin-python-venv")
        );
        assert!(!settings.core_service_configured());
        assert!(settings.registry_url.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut env = HashMap::new();
        env.insert("S3_BUCKET_NAME".to_string(), "my-bucket".to_string());
        env.insert(
            "CORE_SERVICE_ENDPOINT".to_string(),
            "http://core:9000".to_string(),
        );
        env.insert("CORE_SERVICE_TIMEOUT".to_string(), "60".to_string());

        let settings = Settings::init_from_hashmap(&env).unwrap();
        assert_eq!(settings.s3_bucket, "my-bucket");
        assert_eq!(settings.core_service_timeout_secs, 60);
        assert!(settings.core_service_configured());
    }

    #[test]
    fn blank_endpoint_counts_as_unconfigured() {
        let mut env = HashMap::new();
        env.insert("CORE_SERVICE_ENDPOINT".to_string(), "  ".to_string());
        let settings = Settings::init_from_hashmap(&env).unwrap();
        assert!(!settings.core_service_configured());
    }
}
