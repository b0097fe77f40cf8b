pub mod certificate;
pub mod config;
pub mod device_client;
pub mod error;
pub mod http_client;
pub mod observer;
pub mod services;
pub mod types;
pub mod wire;

pub use config::ProvisionerConfig;
pub use error::ProvisionError;
pub use services::provisioning::{CancelHandle, ProvisioningSession, SessionState};
