use crate::{
    error::ProvisionError,
    http_client::{BinaryExchange, PROTOBUF_CONTENT_TYPE, TEXT_CONTENT_TYPE},
    types::{AccessPointCandidate, ProvisioningRequest},
    wire,
};
use std::net::Ipv6Addr;

/// Typed calls to the HTTPS endpoints the device serves on its SoftAP address
#[derive(Clone)]
pub struct DeviceClient<X> {
    exchange: X,
}

impl<X> DeviceClient<X>
where
    X: BinaryExchange,
{
    // API endpoint constants
    const NETWORKS_ENDPOINT: &str = "/prov/networks";
    const CONFIGURE_ENDPOINT: &str = "/prov/configure";
    const LED_ENDPOINT: &str = "/led/";

    pub fn new(exchange: X) -> Self {
        Self { exchange }
    }

    fn build_url(address: &str, path: &str) -> String {
        // Normalize path to always start with a single "/"
        let normalized_path = path.trim_start_matches('/');

        if address.parse::<Ipv6Addr>().is_ok() {
            format!("https://[{address}]/{normalized_path}")
        } else {
            format!("https://{address}/{normalized_path}")
        }
    }

    /// Networks the device currently sees
    pub async fn scan_results(
        &self,
        address: &str,
    ) -> Result<Vec<AccessPointCandidate>, ProvisionError> {
        let body = self
            .exchange
            .get(&Self::build_url(address, Self::NETWORKS_ENDPOINT))
            .await?;

        wire::decode_scan_results(&body)
    }

    /// Hand the target network and its credentials to the device
    pub async fn configure(
        &self,
        address: &str,
        request: &ProvisioningRequest,
    ) -> Result<(), ProvisionError> {
        let body = wire::encode_configuration(request)?;

        self.exchange
            .post(
                &Self::build_url(address, Self::CONFIGURE_ENDPOINT),
                PROTOBUF_CONTENT_TYPE,
                body,
            )
            .await?;
        Ok(())
    }

    pub async fn led_status(&self, address: &str, led: u8) -> Result<bool, ProvisionError> {
        let body = self
            .exchange
            .get(&Self::build_url(address, &format!("{}{led}", Self::LED_ENDPOINT)))
            .await?;

        match String::from_utf8_lossy(&body).trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(ProvisionError::BadResponse(format!(
                "invalid led {led} state: {other:?}"
            ))),
        }
    }

    pub async fn set_led(&self, address: &str, led: u8, enabled: bool) -> Result<(), ProvisionError> {
        let state = if enabled { b"1" } else { b"0" };

        self.exchange
            .post(
                &Self::build_url(address, &format!("{}{led}", Self::LED_ENDPOINT)),
                TEXT_CONTENT_TYPE,
                state.to_vec(),
            )
            .await?;
        Ok(())
    }
}
