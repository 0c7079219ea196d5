pub mod error;
mod model;
mod yaml;

pub use error::{ManifestError, ManifestParseError};
pub use model::{
    validate_autoscaling_config, Affinity, ManifestBuilder, NodeAffinity, NodeSelectorRequirement,
    NodeSelectorTerm, PreferredSchedulingTerm, ResourceLimits, SpinAppManifest, Toleration,
    DEFAULT_API_VERSION, DEFAULT_KIND,
};
pub use yaml::{from_yaml, to_yaml};
