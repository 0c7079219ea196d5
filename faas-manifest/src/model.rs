use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

pub const DEFAULT_API_VERSION: &str = "core.spinoperator.dev/v1alpha1";
pub const DEFAULT_KIND: &str = "SpinApp";

lazy_static! {
    /// Kubernetes resource quantity format: 100, 0.5, 100m, 128Mi, 1Gi, ...
    static ref RESOURCE_FORMAT: Regex =
        Regex::new(r"^[0-9]+(\.[0-9]+)?(m|Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap();
}

fn validate_resource(value: &str, field: &'static str) -> Result<(), ManifestError> {
    if !RESOURCE_FORMAT.is_match(value) {
        return Err(ManifestError::InvalidResourceFormat {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// enableAutoscaling=true and a static replicas count are mutually exclusive.
pub fn validate_autoscaling_config(
    enable_autoscaling: bool,
    replicas: Option<u32>,
) -> Result<(), ManifestError> {
    if enable_autoscaling && replicas.is_some() {
        return Err(ManifestError::AutoscalingConflict);
    }
    Ok(())
}

/// CPU and memory limits/requests. Values are validated against the
/// Kubernetes resource quantity format at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub cpu_request: Option<String>,
    pub memory_request: Option<String>,
}

impl ResourceLimits {
    pub fn new(
        cpu_limit: Option<String>,
        memory_limit: Option<String>,
        cpu_request: Option<String>,
        memory_request: Option<String>,
    ) -> Result<Self, ManifestError> {
        if let Some(v) = &cpu_limit {
            validate_resource(v, "cpu_limit")?;
        }
        if let Some(v) = &memory_limit {
            validate_resource(v, "memory_limit")?;
        }
        if let Some(v) = &cpu_request {
            validate_resource(v, "cpu_request")?;
        }
        if let Some(v) = &memory_request {
            validate_resource(v, "memory_request")?;
        }
        Ok(Self {
            cpu_limit,
            memory_limit,
            cpu_request,
            memory_request,
        })
    }

    pub fn has_limits(&self) -> bool {
        self.cpu_limit.is_some() || self.memory_limit.is_some()
    }

    pub fn has_requests(&self) -> bool {
        self.cpu_request.is_some() || self.memory_request.is_some()
    }

    pub fn has_any(&self) -> bool {
        self.has_limits() || self.has_requests()
    }
}

fn default_operator() -> String {
    "Exists".to_string()
}

fn default_effect() -> String {
    "NoSchedule".to_string()
}

/// A pod toleration in its wire shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Toleration {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: default_operator(),
            effect: default_effect(),
            value: None,
        }
    }

    /// The conventional toleration for the preemptible node class.
    pub fn default_spot() -> Self {
        Self::new("spot")
    }

    pub fn is_default_spot(&self) -> bool {
        self.key == "spot" && self.operator == "Exists" && self.effect == "NoSchedule"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredSchedulingTerm {
    pub weight: i32,
    #[serde(default)]
    pub preference: NodeSelectorTerm,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinity {
    #[serde(default)]
    pub preferred_during_scheduling_ignored_during_execution: Vec<PreferredSchedulingTerm>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,
}

impl Affinity {
    /// Prefer nodes labelled `spot=true` with weight 100.
    pub fn default_spot() -> Self {
        Self {
            node_affinity: Some(NodeAffinity {
                preferred_during_scheduling_ignored_during_execution: vec![
                    PreferredSchedulingTerm {
                        weight: 100,
                        preference: NodeSelectorTerm {
                            match_expressions: vec![NodeSelectorRequirement {
                                key: "spot".to_string(),
                                operator: "In".to_string(),
                                values: vec!["true".to_string()],
                            }],
                        },
                    },
                ],
            }),
        }
    }
}

fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "app.kubernetes.io/managed-by".to_string(),
        "faas-builder".to_string(),
    )])
}

fn default_pod_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("faas".to_string(), "true".to_string())])
}

/// A validated SpinApp custom resource configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinAppManifest {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: Option<u32>,
    pub service_account: Option<String>,
    pub resources: ResourceLimits,
    pub api_version: String,
    pub kind: String,
    pub enable_autoscaling: bool,
    pub use_spot: bool,
    pub tolerations: Vec<Toleration>,
    pub node_affinity: Option<Affinity>,
    pub labels: BTreeMap<String, String>,
    pub pod_labels: BTreeMap<String, String>,
}

impl SpinAppManifest {
    pub fn builder(name: impl Into<String>, image: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder::new(name, image)
    }
}

/// Builder enforcing every construction rule before a manifest exists.
#[derive(Clone, Debug)]
pub struct ManifestBuilder {
    name: String,
    namespace: String,
    image: String,
    replicas: Option<u32>,
    service_account: Option<String>,
    resources: ResourceLimits,
    api_version: String,
    kind: String,
    enable_autoscaling: bool,
    use_spot: bool,
    tolerations: Vec<Toleration>,
    node_affinity: Option<Affinity>,
    labels: BTreeMap<String, String>,
    pod_labels: BTreeMap<String, String>,
}

impl ManifestBuilder {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            image: image.into(),
            replicas: None,
            service_account: None,
            resources: ResourceLimits::default(),
            api_version: DEFAULT_API_VERSION.to_string(),
            kind: DEFAULT_KIND.to_string(),
            enable_autoscaling: true,
            use_spot: true,
            tolerations: Vec::new(),
            node_affinity: None,
            labels: default_labels(),
            pod_labels: default_pod_labels(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn replicas(mut self, replicas: Option<u32>) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn service_account(mut self, service_account: Option<String>) -> Self {
        self.service_account = service_account;
        self
    }

    pub fn resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn enable_autoscaling(mut self, enable_autoscaling: bool) -> Self {
        self.enable_autoscaling = enable_autoscaling;
        self
    }

    pub fn use_spot(mut self, use_spot: bool) -> Self {
        self.use_spot = use_spot;
        self
    }

    pub fn tolerations(mut self, tolerations: Vec<Toleration>) -> Self {
        self.tolerations = tolerations;
        self
    }

    pub fn node_affinity(mut self, node_affinity: Option<Affinity>) -> Self {
        self.node_affinity = node_affinity;
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn pod_labels(mut self, pod_labels: BTreeMap<String, String>) -> Self {
        self.pod_labels = pod_labels;
        self
    }

    pub fn build(self) -> Result<SpinAppManifest, ManifestError> {
        if self.name.is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if self.image.is_empty() {
            return Err(ManifestError::EmptyImage);
        }
        validate_autoscaling_config(self.enable_autoscaling, self.replicas)?;
        if let Some(replicas) = self.replicas {
            if replicas < 1 {
                return Err(ManifestError::InvalidReplicas);
            }
        }

        Ok(SpinAppManifest {
            name: self.name,
            namespace: self.namespace,
            image: self.image,
            replicas: self.replicas,
            service_account: self.service_account,
            resources: self.resources,
            api_version: self.api_version,
            kind: self.kind,
            enable_autoscaling: self.enable_autoscaling,
            use_spot: self.use_spot,
            tolerations: self.tolerations,
            node_affinity: self.node_affinity,
            labels: self.labels,
            pod_labels: self.pod_labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoscaling_and_replicas_are_mutually_exclusive() {
        let err = SpinAppManifest::builder("app", "r/x:1")
            .enable_autoscaling(true)
            .replicas(Some(3))
            .build()
            .unwrap_err();
        assert_eq!(err, ManifestError::AutoscalingConflict);
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn replicas_allowed_when_autoscaling_disabled() {
        let manifest = SpinAppManifest::builder("app", "r/x:1")
            .enable_autoscaling(false)
            .replicas(Some(2))
            .build()
            .unwrap();
        assert_eq!(manifest.replicas, Some(2));
    }

    #[test]
    fn zero_replicas_rejected() {
        let err = SpinAppManifest::builder("app", "r/x:1")
            .enable_autoscaling(false)
            .replicas(Some(0))
            .build()
            .unwrap_err();
        assert_eq!(err, ManifestError::InvalidReplicas);
    }

    #[test]
    fn empty_name_and_image_rejected() {
        assert_eq!(
            SpinAppManifest::builder("", "r/x:1").build().unwrap_err(),
            ManifestError::EmptyName
        );
        assert_eq!(
            SpinAppManifest::builder("app", "").build().unwrap_err(),
            ManifestError::EmptyImage
        );
    }

    #[test]
    fn resource_format_accepts_kubernetes_quantities() {
        for value in ["100", "0.5", "100m", "128Ki", "256Mi", "1Gi", "2Ti", "1Pi", "1Ei", "1k", "1M", "1G"] {
            assert!(
                ResourceLimits::new(Some(value.to_string()), None, None, None).is_ok(),
                "expected '{value}' to be accepted"
            );
        }
    }

    #[test]
    fn resource_format_rejects_and_names_the_field() {
        let err = ResourceLimits::new(None, Some("12Qi".to_string()), None, None).unwrap_err();
        match &err {
            ManifestError::InvalidResourceFormat { field, value } => {
                assert_eq!(*field, "memory_limit");
                assert_eq!(value, "12Qi");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("memory_limit"));

        for value in ["", "abc", "100 m", "-5", "1.5.5", "m100"] {
            assert!(
                ResourceLimits::new(Some(value.to_string()), None, None, None).is_err(),
                "expected '{value}' to be rejected"
            );
        }
    }

    #[test]
    fn resource_presence_helpers() {
        let none = ResourceLimits::default();
        assert!(!none.has_any());

        let limits_only =
            ResourceLimits::new(Some("100m".to_string()), None, None, None).unwrap();
        assert!(limits_only.has_limits());
        assert!(!limits_only.has_requests());

        let requests_only =
            ResourceLimits::new(None, None, None, Some("64Mi".to_string())).unwrap();
        assert!(requests_only.has_requests());
        assert!(requests_only.has_any());
    }

    #[test]
    fn default_spot_toleration_shape() {
        let t = Toleration::default_spot();
        assert_eq!(t.key, "spot");
        assert_eq!(t.operator, "Exists");
        assert_eq!(t.effect, "NoSchedule");
        assert!(t.value.is_none());
        assert!(t.is_default_spot());
        assert!(!Toleration::new("gpu").is_default_spot());
    }

    #[test]
    fn defaults_match_controller_expectations() {
        let manifest = SpinAppManifest::builder("app", "r/x:1").build().unwrap();
        assert_eq!(manifest.api_version, "core.spinoperator.dev/v1alpha1");
        assert_eq!(manifest.kind, "SpinApp");
        assert_eq!(manifest.namespace, "default");
        assert!(manifest.enable_autoscaling);
        assert!(manifest.use_spot);
        assert_eq!(
            manifest.labels.get("app.kubernetes.io/managed-by").unwrap(),
            "faas-builder"
        );
        assert_eq!(manifest.pod_labels.get("faas").unwrap(), "true");
    }
}
