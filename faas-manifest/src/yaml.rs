use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{ManifestError, ManifestParseError};
use crate::model::{Affinity, ResourceLimits, SpinAppManifest, Toleration};

// Wire shape of the emitted document. Field declaration order is emission
// order; serde_yaml preserves it and never sorts keys.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpinAppDoc<'a> {
    api_version: &'a str,
    kind: &'a str,
    metadata: MetadataDoc<'a>,
    spec: SpecDoc<'a>,
}

#[derive(Serialize)]
struct MetadataDoc<'a> {
    name: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a BTreeMap<String, String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpecDoc<'a> {
    image: &'a str,
    enable_autoscaling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pod_labels: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    replicas: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_account_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<ResourcesDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tolerations: Option<Vec<Toleration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    affinity: Option<Affinity>,
}

#[derive(Serialize)]
struct ResourcesDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    limits: Option<ResourceValuesDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requests: Option<ResourceValuesDoc>,
}

#[derive(Serialize)]
struct ResourceValuesDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<String>,
}

fn resources_doc(resources: &ResourceLimits) -> Option<ResourcesDoc> {
    if !resources.has_any() {
        return None;
    }
    let limits = resources.has_limits().then(|| ResourceValuesDoc {
        cpu: resources.cpu_limit.clone(),
        memory: resources.memory_limit.clone(),
    });
    let requests = resources.has_requests().then(|| ResourceValuesDoc {
        cpu: resources.cpu_request.clone(),
        memory: resources.memory_request.clone(),
    });
    Some(ResourcesDoc { limits, requests })
}

/// Serialize a manifest to its canonical YAML document.
pub fn to_yaml(manifest: &SpinAppManifest) -> Result<String, ManifestError> {
    // Spot scheduling prepends the conventional toleration and adds the
    // default node preference; without spot, only caller-supplied values
    // appear.
    let tolerations = if manifest.use_spot {
        let mut list = vec![Toleration::default_spot()];
        list.extend(manifest.tolerations.iter().cloned());
        Some(list)
    } else if !manifest.tolerations.is_empty() {
        Some(manifest.tolerations.clone())
    } else {
        None
    };

    let affinity = if manifest.use_spot {
        Some(Affinity::default_spot())
    } else {
        manifest.node_affinity.clone()
    };

    let replicas = if !manifest.enable_autoscaling {
        manifest.replicas
    } else {
        None
    };

    let doc = SpinAppDoc {
        api_version: &manifest.api_version,
        kind: &manifest.kind,
        metadata: MetadataDoc {
            name: &manifest.name,
            namespace: &manifest.namespace,
            labels: (!manifest.labels.is_empty()).then_some(&manifest.labels),
        },
        spec: SpecDoc {
            image: &manifest.image,
            enable_autoscaling: manifest.enable_autoscaling,
            pod_labels: (!manifest.pod_labels.is_empty()).then_some(&manifest.pod_labels),
            replicas,
            service_account_name: manifest.service_account.as_deref(),
            resources: resources_doc(&manifest.resources),
            tolerations,
            affinity,
        },
    };

    serde_yaml::to_string(&doc).map_err(|e| ManifestError::Serialize(e.to_string()))
}

fn str_of(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_toleration(value: &Value) -> Result<Toleration, ManifestParseError> {
    let map = value
        .as_mapping()
        .ok_or(ManifestParseError::ExpectedMapping("toleration"))?;
    Ok(Toleration {
        key: str_of(map, "key").unwrap_or_default(),
        operator: str_of(map, "operator").unwrap_or_else(|| "Exists".to_string()),
        effect: str_of(map, "effect").unwrap_or_else(|| "NoSchedule".to_string()),
        value: str_of(map, "value"),
    })
}

fn parse_labels(value: Option<&Value>) -> Option<BTreeMap<String, String>> {
    let map = value?.as_mapping()?;
    let mut labels = BTreeMap::new();
    for (k, v) in map {
        if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
            labels.insert(k.to_string(), v.to_string());
        }
    }
    Some(labels)
}

/// Parse a YAML document produced by [`to_yaml`] (or hand-written in the same
/// shape) back into an equivalent configuration.
///
/// The presence of the default spot toleration signals `use_spot = true`, and
/// that toleration is stripped from the custom list.
pub fn from_yaml(yaml_content: &str) -> Result<SpinAppManifest, ManifestParseError> {
    let data: Value =
        serde_yaml::from_str(yaml_content).map_err(|e| ManifestParseError::Syntax {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

    if data.is_null() {
        return Err(ManifestParseError::Empty);
    }
    let root = data.as_mapping().ok_or(ManifestParseError::NotAMapping)?;

    let metadata = root
        .get("metadata")
        .ok_or(ManifestParseError::MissingField("metadata"))?;
    let metadata = metadata
        .as_mapping()
        .ok_or(ManifestParseError::ExpectedMapping("metadata"))?;
    let name =
        str_of(metadata, "name").ok_or(ManifestParseError::MissingField("metadata.name"))?;

    let spec = root
        .get("spec")
        .ok_or(ManifestParseError::MissingField("spec"))?;
    let spec = spec
        .as_mapping()
        .ok_or(ManifestParseError::ExpectedMapping("spec"))?;
    let image = str_of(spec, "image").ok_or(ManifestParseError::MissingField("spec.image"))?;

    let resources = match spec.get("resources") {
        Some(value) => {
            let map = value
                .as_mapping()
                .ok_or(ManifestParseError::ExpectedMapping("spec.resources"))?;
            let limits = map.get("limits").and_then(Value::as_mapping);
            let requests = map.get("requests").and_then(Value::as_mapping);
            ResourceLimits::new(
                limits.and_then(|m| str_of(m, "cpu")),
                limits.and_then(|m| str_of(m, "memory")),
                requests.and_then(|m| str_of(m, "cpu")),
                requests.and_then(|m| str_of(m, "memory")),
            )?
        }
        None => ResourceLimits::default(),
    };

    let enable_autoscaling = spec
        .get("enableAutoscaling")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let replicas = spec
        .get("replicas")
        .and_then(Value::as_u64)
        .map(|r| r as u32);

    let mut tolerations = Vec::new();
    if let Some(value) = spec.get("tolerations") {
        let list = value
            .as_sequence()
            .ok_or(ManifestParseError::ExpectedList("spec.tolerations"))?;
        for entry in list {
            tolerations.push(parse_toleration(entry)?);
        }
    }

    let node_affinity = spec
        .get("affinity")
        .and_then(|v| serde_yaml::from_value::<Affinity>(v.clone()).ok())
        .filter(|a| {
            a.node_affinity
                .as_ref()
                .is_some_and(|na| !na.preferred_during_scheduling_ignored_during_execution.is_empty())
        });

    let use_spot = tolerations.iter().any(Toleration::is_default_spot);
    let custom_tolerations: Vec<Toleration> = tolerations
        .into_iter()
        .filter(|t| !t.is_default_spot())
        .collect();

    let mut builder = SpinAppManifest::builder(name, image)
        .namespace(str_of(metadata, "namespace").unwrap_or_else(|| "default".to_string()))
        .replicas(replicas)
        .service_account(str_of(spec, "serviceAccountName"))
        .resources(resources)
        .enable_autoscaling(enable_autoscaling)
        .use_spot(use_spot)
        .tolerations(custom_tolerations)
        .node_affinity(if use_spot { None } else { node_affinity });

    if let Some(api_version) = str_of(root, "apiVersion") {
        builder = builder.api_version(api_version);
    }
    if let Some(kind) = str_of(root, "kind") {
        builder = builder.kind(kind);
    }
    if let Some(labels) = parse_labels(metadata.get("labels")) {
        builder = builder.labels(labels);
    }
    if let Some(pod_labels) = parse_labels(spec.get("podLabels")) {
        builder = builder.pod_labels(pod_labels);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeAffinity, NodeSelectorRequirement, NodeSelectorTerm, PreferredSchedulingTerm};

    fn base_manifest() -> SpinAppManifest {
        SpinAppManifest::builder("my-app", "registry.example.com/apps:v1")
            .namespace("prod")
            .build()
            .unwrap()
    }

    #[test]
    fn top_level_key_order_is_fixed() {
        let yaml = to_yaml(&base_manifest()).unwrap();
        let top_level: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with(' ') && l.contains(':'))
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(top_level, vec!["apiVersion", "kind", "metadata", "spec"]);
    }

    #[test]
    fn autoscaling_omits_replicas() {
        let yaml = to_yaml(&base_manifest()).unwrap();
        assert!(yaml.contains("enableAutoscaling: true"));
        assert!(!yaml.contains("replicas"));
    }

    #[test]
    fn static_replicas_emitted_when_autoscaling_disabled() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .enable_autoscaling(false)
            .replicas(Some(2))
            .build()
            .unwrap();
        let yaml = to_yaml(&manifest).unwrap();
        assert!(yaml.contains("enableAutoscaling: false"));
        assert!(yaml.contains("replicas: 2"));
    }

    #[test]
    fn spot_defaults_present_when_enabled() {
        let yaml = to_yaml(&base_manifest()).unwrap();
        assert!(yaml.contains("tolerations:"));
        assert!(yaml.contains("key: spot"));
        assert!(yaml.contains("operator: Exists"));
        assert!(yaml.contains("effect: NoSchedule"));
        assert!(yaml.contains("preferredDuringSchedulingIgnoredDuringExecution:"));
        assert!(yaml.contains("weight: 100"));
        assert!(yaml.contains("- 'true'") || yaml.contains("- \"true\"") || yaml.contains("- true"));
    }

    #[test]
    fn spot_disabled_emits_nothing_by_default() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .use_spot(false)
            .build()
            .unwrap();
        let yaml = to_yaml(&manifest).unwrap();
        assert!(!yaml.contains("tolerations"));
        assert!(!yaml.contains("affinity"));
    }

    #[test]
    fn custom_tolerations_follow_the_spot_default() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .tolerations(vec![Toleration {
                key: "gpu".to_string(),
                operator: "Equal".to_string(),
                effect: "NoExecute".to_string(),
                value: Some("a100".to_string()),
            }])
            .build()
            .unwrap();
        let yaml = to_yaml(&manifest).unwrap();
        let spot_pos = yaml.find("key: spot").unwrap();
        let gpu_pos = yaml.find("key: gpu").unwrap();
        assert!(spot_pos < gpu_pos);
        assert!(yaml.contains("value: a100"));
    }

    #[test]
    fn custom_tolerations_alone_when_spot_disabled() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .use_spot(false)
            .tolerations(vec![Toleration::new("dedicated")])
            .build()
            .unwrap();
        let yaml = to_yaml(&manifest).unwrap();
        assert!(yaml.contains("key: dedicated"));
        assert!(!yaml.contains("key: spot"));
    }

    #[test]
    fn resources_sections_appear_only_when_set() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .resources(
                ResourceLimits::new(Some("500m".to_string()), None, None, Some("128Mi".to_string()))
                    .unwrap(),
            )
            .build()
            .unwrap();
        let yaml = to_yaml(&manifest).unwrap();
        assert!(yaml.contains("resources:"));
        assert!(yaml.contains("limits:"));
        assert!(yaml.contains("cpu: 500m"));
        assert!(yaml.contains("requests:"));
        assert!(yaml.contains("memory: 128Mi"));

        let bare = to_yaml(&base_manifest()).unwrap();
        assert!(!bare.contains("resources:"));
    }

    #[test]
    fn service_account_appears_only_when_specified() {
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .service_account(Some("builder-sa".to_string()))
            .build()
            .unwrap();
        assert!(to_yaml(&manifest).unwrap().contains("serviceAccountName: builder-sa"));
        assert!(!to_yaml(&base_manifest()).unwrap().contains("serviceAccountName"));
    }

    #[test]
    fn roundtrip_preserves_configuration() {
        let manifest = SpinAppManifest::builder("n", "r/x:1")
            .namespace("staging")
            .enable_autoscaling(false)
            .replicas(Some(4))
            .service_account(Some("sa".to_string()))
            .resources(
                ResourceLimits::new(
                    Some("1".to_string()),
                    Some("1Gi".to_string()),
                    Some("500m".to_string()),
                    Some("512Mi".to_string()),
                )
                .unwrap(),
            )
            .build()
            .unwrap();
        let parsed = from_yaml(&to_yaml(&manifest).unwrap()).unwrap();
        assert_eq!(parsed.name, manifest.name);
        assert_eq!(parsed.namespace, manifest.namespace);
        assert_eq!(parsed.image, manifest.image);
        assert_eq!(parsed.replicas, manifest.replicas);
        assert_eq!(parsed.service_account, manifest.service_account);
        assert_eq!(parsed.resources, manifest.resources);
        assert_eq!(parsed.api_version, manifest.api_version);
        assert_eq!(parsed.kind, manifest.kind);
        assert_eq!(parsed.enable_autoscaling, manifest.enable_autoscaling);
    }

    #[test]
    fn roundtrip_detects_spot_and_strips_default_toleration() {
        let manifest = base_manifest();
        let parsed = from_yaml(&to_yaml(&manifest).unwrap()).unwrap();
        assert!(parsed.use_spot);
        assert!(parsed.enable_autoscaling);
        assert!(parsed.replicas.is_none());
        assert!(parsed.tolerations.is_empty());
    }

    #[test]
    fn roundtrip_keeps_custom_tolerations_verbatim() {
        let custom = Toleration {
            key: "gpu".to_string(),
            operator: "Equal".to_string(),
            effect: "NoExecute".to_string(),
            value: Some("a100".to_string()),
        };
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .tolerations(vec![custom.clone()])
            .build()
            .unwrap();
        let parsed = from_yaml(&to_yaml(&manifest).unwrap()).unwrap();
        assert!(parsed.use_spot);
        assert_eq!(parsed.tolerations, vec![custom]);
    }

    #[test]
    fn custom_affinity_survives_without_spot() {
        let affinity = Affinity {
            node_affinity: Some(NodeAffinity {
                preferred_during_scheduling_ignored_during_execution: vec![
                    PreferredSchedulingTerm {
                        weight: 50,
                        preference: NodeSelectorTerm {
                            match_expressions: vec![NodeSelectorRequirement {
                                key: "zone".to_string(),
                                operator: "In".to_string(),
                                values: vec!["a".to_string(), "b".to_string()],
                            }],
                        },
                    },
                ],
            }),
        };
        let manifest = SpinAppManifest::builder("my-app", "r/x:1")
            .use_spot(false)
            .node_affinity(Some(affinity.clone()))
            .build()
            .unwrap();
        let parsed = from_yaml(&to_yaml(&manifest).unwrap()).unwrap();
        assert!(!parsed.use_spot);
        assert_eq!(parsed.node_affinity, Some(affinity));
    }

    #[test]
    fn missing_required_fields_are_dedicated_errors() {
        assert!(matches!(
            from_yaml("apiVersion: v1\nkind: SpinApp\nspec:\n  image: r/x:1\n"),
            Err(ManifestParseError::MissingField("metadata"))
        ));
        assert!(matches!(
            from_yaml("metadata:\n  namespace: default\nspec:\n  image: r/x:1\n"),
            Err(ManifestParseError::MissingField("metadata.name"))
        ));
        assert!(matches!(
            from_yaml("metadata:\n  name: n\n"),
            Err(ManifestParseError::MissingField("spec"))
        ));
        assert!(matches!(
            from_yaml("metadata:\n  name: n\nspec:\n  enableAutoscaling: true\n"),
            Err(ManifestParseError::MissingField("spec.image"))
        ));
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = from_yaml("metadata:\n  name: [unclosed\n").unwrap_err();
        match err {
            ManifestParseError::Syntax { line, .. } => assert!(line.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parsing_autoscaling_with_replicas_fails_construction() {
        let yaml = "metadata:\n  name: n\nspec:\n  image: r/x:1\n  enableAutoscaling: true\n  replicas: 3\n";
        let err = from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(matches!(from_yaml(""), Err(ManifestParseError::Empty)));
        assert!(matches!(
            from_yaml("- a\n- b\n"),
            Err(ManifestParseError::NotAMapping)
        ));
    }
}
