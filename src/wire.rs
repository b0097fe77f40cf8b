//! Protobuf messages exchanged with the device
//!
//! Only the scan-results message and the configuration message cross the
//! wire. Scan records are decoded one by one: a record that does not describe
//! a usable access point is dropped, the others are kept in order.

use crate::{
    error::ProvisionError,
    types::{AccessPointCandidate, AuthenticationMode, Band, MacAddress, ProvisioningRequest},
};
use prost::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AuthMode {
    Open = 0,
    Wep = 1,
    WpaPsk = 2,
    Wpa2Psk = 3,
    WpaWpa2Psk = 4,
    Wpa2Enterprise = 5,
    Wpa3Psk = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WifiBand {
    Any = 0,
    Band24Ghz = 1,
    Band5Ghz = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WifiInfo {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub ssid: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub bssid: Option<Vec<u8>>,
    #[prost(enumeration = "WifiBand", optional, tag = "3")]
    pub band: Option<i32>,
    #[prost(uint32, optional, tag = "4")]
    pub channel: Option<u32>,
    #[prost(enumeration = "AuthMode", optional, tag = "5")]
    pub auth: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScanRecord {
    #[prost(message, optional, tag = "1")]
    pub wifi: Option<WifiInfo>,
    #[prost(int32, optional, tag = "2")]
    pub rssi: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScanResults {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<ScanRecord>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WifiConfig {
    #[prost(message, optional, tag = "1")]
    pub wifi: Option<WifiInfo>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub passphrase: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub volatile_memory: Option<bool>,
}

impl From<AuthMode> for AuthenticationMode {
    fn from(mode: AuthMode) -> Self {
        match mode {
            AuthMode::Open => AuthenticationMode::Open,
            AuthMode::Wep => AuthenticationMode::Wep,
            AuthMode::WpaPsk => AuthenticationMode::Wpa,
            AuthMode::Wpa2Psk => AuthenticationMode::Wpa2,
            AuthMode::WpaWpa2Psk => AuthenticationMode::WpaWpa2,
            AuthMode::Wpa2Enterprise => AuthenticationMode::Wpa2Enterprise,
            AuthMode::Wpa3Psk => AuthenticationMode::Wpa3,
        }
    }
}

impl From<WifiBand> for Band {
    fn from(band: WifiBand) -> Self {
        match band {
            WifiBand::Any => Band::Any,
            WifiBand::Band24Ghz => Band::Band2_4Ghz,
            WifiBand::Band5Ghz => Band::Band5Ghz,
        }
    }
}

/// Decode a scan-results payload.
///
/// Fails with [`ProvisionError::BadResponse`] only if the payload as a whole
/// is not a scan-results message.
pub fn decode_scan_results(payload: &[u8]) -> Result<Vec<AccessPointCandidate>, ProvisionError> {
    let scan_results = ScanResults::decode(payload)
        .map_err(|e| ProvisionError::BadResponse(format!("invalid scan results: {e}")))?;

    Ok(scan_results
        .results
        .into_iter()
        .filter_map(|record| candidate_from_record(&record))
        .collect())
}

/// Decode a single scan record, `None` if it is malformed
pub fn candidate_from_record(record: &ScanRecord) -> Option<AccessPointCandidate> {
    let wifi = record.wifi.as_ref()?;

    let ssid = String::from_utf8(wifi.ssid.clone()?).ok()?;
    if ssid.is_empty() {
        return None;
    }
    let bssid = MacAddress::from_slice(wifi.bssid.as_deref()?)?;
    let authentication_mode = match wifi.auth {
        Some(value) => AuthMode::try_from(value).ok()?,
        None => AuthMode::Open,
    };
    let band = match wifi.band {
        Some(value) => WifiBand::try_from(value).ok()?,
        None => WifiBand::Any,
    };

    Some(AccessPointCandidate {
        ssid,
        bssid,
        authentication_mode: authentication_mode.into(),
        channel: wifi.channel?,
        band: band.into(),
        rssi: record.rssi,
        raw_scan_record: record.encode_to_vec(),
    })
}

/// Encode the configuration message sent to `/prov/configure`
pub fn encode_configuration(request: &ProvisioningRequest) -> Result<Vec<u8>, ProvisionError> {
    let record = ScanRecord::decode(request.target.raw_scan_record.as_slice())
        .map_err(|e| ProvisionError::BadResponse(format!("invalid scan record: {e}")))?;

    let config = WifiConfig {
        wifi: record.wifi,
        passphrase: Some(
            request
                .passphrase
                .clone()
                .unwrap_or_default()
                .into_bytes(),
        ),
        volatile_memory: request.volatile_memory.then_some(true),
    };

    Ok(config.encode_to_vec())
}
