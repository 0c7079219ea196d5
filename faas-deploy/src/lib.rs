pub mod deploy;
pub mod names;
pub mod scaffold;

pub use deploy::{DeployOutcome, Deployer, ServiceQuery, ServiceStatus};
pub use names::generate_app_name;
pub use scaffold::{scaffold, ScaffoldOutcome};
