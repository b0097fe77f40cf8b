use serde::{Serialize, Serializer};
use std::fmt;

/// Identifies one discoverable service instance, e.g.
/// `_http._tcp` / `local.` / `wifiprov`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    pub service_type: String,
    pub domain: String,
    pub instance_name: String,
}

impl ServiceDescriptor {
    pub fn new(
        service_type: impl Into<String>,
        domain: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            domain: domain.into(),
            instance_name: instance_name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedService {
    pub instance_name: String,
    pub resolved_address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMode {
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa2Enterprise,
    Wpa3,
}

impl AuthenticationMode {
    pub fn is_wep(self) -> bool {
        self == AuthenticationMode::Wep
    }

    pub fn requires_passphrase(self) -> bool {
        self != AuthenticationMode::Open
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    #[default]
    Any,
    #[serde(rename = "2.4ghz")]
    Band2_4Ghz,
    #[serde(rename = "5ghz")]
    Band5Ghz,
}

/// MAC-48 identifier, displayed as `AA:BB:CC:DD:EE:FF`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Returns `None` unless `bytes` is exactly 48 bit long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One access point reported by the device's scan
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessPointCandidate {
    pub ssid: String,
    pub bssid: MacAddress,
    pub authentication_mode: AuthenticationMode,
    pub channel: u32,
    pub band: Band,
    pub rssi: Option<i32>,
    /// The scan record exactly as the device sent it
    #[serde(skip)]
    pub raw_scan_record: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub target: AccessPointCandidate,
    pub passphrase: Option<String>,
    /// Ask the device to keep the credentials in RAM only
    pub volatile_memory: bool,
}

impl ProvisioningRequest {
    pub fn new(target: AccessPointCandidate, passphrase: Option<String>) -> Self {
        Self {
            target,
            passphrase,
            volatile_memory: false,
        }
    }
}
