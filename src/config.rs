use crate::types::ServiceDescriptor;
use anyhow::{Context, Result};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Client configuration, loaded from environment variables with defaults
///
/// The settle delays are device timing tolerances found by experiment. They
/// are configuration rather than constants so that tests can shrink them.
#[derive(Clone, Debug)]
pub struct ProvisionerConfig {
    /// Service discovery timing
    pub discovery: DiscoveryConfig,

    /// Device identity and session timing
    pub session: SessionConfig,

    /// HTTPS transport configuration
    pub exchange: ExchangeConfig,
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// Wait before browsing, lets the host settle after an association change
    pub settle_delay: Duration,
    /// Upper bound for one discovery or re-resolution attempt
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub device_ap_ssid: String,
    pub device_service: ServiceDescriptor,
    /// Wait after joining the target network, lets the device switch too
    pub target_settle_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub cert_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_ap_ssid: "006825-nrf-wifiprov".to_string(),
            device_service: ServiceDescriptor::new("_http._tcp", "local.", "wifiprov"),
            target_settle_delay: Duration::from_secs(2),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("/etc/softap-provisioner/server_certificate.pem"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ProvisionerConfig {
    /// Load and validate all configuration from environment variables
    ///
    /// Unset variables fall back to their defaults, set but invalid ones are
    /// an error.
    pub fn from_env() -> Result<Self> {
        let discovery = DiscoveryConfig::load()?;
        let session = SessionConfig::load()?;
        let exchange = ExchangeConfig::load()?;

        Ok(Self {
            discovery,
            session,
            exchange,
        })
    }
}

impl DiscoveryConfig {
    fn load() -> Result<Self> {
        let defaults = Self::default();

        let settle_delay = parse_var("DISCOVERY_SETTLE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle_delay);
        let timeout = parse_var("DISCOVERY_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Ok(Self {
            settle_delay,
            timeout,
        })
    }
}

impl SessionConfig {
    fn load() -> Result<Self> {
        let defaults = Self::default();

        let device_ap_ssid = env::var("SOFTAP_SSID").unwrap_or(defaults.device_ap_ssid);
        let device_service = ServiceDescriptor {
            service_type: env::var("SOFTAP_SERVICE_TYPE")
                .unwrap_or(defaults.device_service.service_type),
            domain: env::var("SOFTAP_SERVICE_DOMAIN").unwrap_or(defaults.device_service.domain),
            instance_name: env::var("SOFTAP_SERVICE_NAME")
                .unwrap_or(defaults.device_service.instance_name),
        };
        let target_settle_delay = parse_var("TARGET_SETTLE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.target_settle_delay);

        Ok(Self {
            device_ap_ssid,
            device_service,
            target_settle_delay,
        })
    }
}

impl ExchangeConfig {
    fn load() -> Result<Self> {
        let defaults = Self::default();

        let cert_path = env::var("CERT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cert_path);
        let request_timeout = parse_var("REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Ok(Self {
            cert_path,
            request_timeout,
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .context(format!("failed to parse {name}: invalid format")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_timing() {
        let discovery = DiscoveryConfig::default();
        assert_eq!(discovery.settle_delay, Duration::from_secs(2));
        assert_eq!(discovery.timeout, Duration::from_secs(30));

        let session = SessionConfig::default();
        assert_eq!(session.device_ap_ssid, "006825-nrf-wifiprov");
        assert_eq!(session.device_service.instance_name, "wifiprov");
        assert_eq!(session.target_settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn parse_var_reports_invalid_value() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("SOFTAP_TEST_INVALID_NUMBER", "two") };

        let result = parse_var::<u64>("SOFTAP_TEST_INVALID_NUMBER");

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("failed to parse SOFTAP_TEST_INVALID_NUMBER")
        );
    }

    #[test]
    fn parse_var_skips_unset_value() {
        let result = parse_var::<u64>("SOFTAP_TEST_UNSET_NUMBER").unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn parse_var_reads_value() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("SOFTAP_TEST_VALID_NUMBER", "1500") };

        let result = parse_var::<u64>("SOFTAP_TEST_VALID_NUMBER").unwrap();

        assert_eq!(result, Some(1500));
    }
}
