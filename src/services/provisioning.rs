//! Provisioning session
//!
//! Drives one device through
//! `Idle → AssociatingWithDevice → QueryingNetworks → Submitting →
//! AssociatingWithTarget → Verifying → Completed`. Every step requires the
//! previous one to have succeeded. Any collaborator error moves the session
//! to `Failed`, which is terminal: build a new session to try again.

use crate::{
    config::{ProvisionerConfig, SessionConfig},
    device_client::DeviceClient,
    error::{ProvisionError, SessionError},
    http_client::BinaryExchange,
    observer::Observer,
    services::{
        association::{AssociationController, NetworkHost},
        discovery::{Resolver, ServiceBrowser},
    },
    types::{AccessPointCandidate, ProvisioningRequest},
};
use log::Level;
use std::{fmt, future::Future, sync::Arc};
use tokio::{sync::watch, time::sleep};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AssociatingWithDevice,
    QueryingNetworks,
    Submitting,
    AssociatingWithTarget,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cancels whatever step the session is running, and every later one
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

pub struct ProvisioningSession<B, H, X> {
    resolver: Arc<Resolver<B>>,
    controller: AssociationController<H>,
    device: DeviceClient<X>,
    config: SessionConfig,
    state: SessionState,
    device_address: Option<String>,
    pending: Option<ProvisioningRequest>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    observer: Arc<dyn Observer>,
}

impl<B, H, X> ProvisioningSession<B, H, X>
where
    B: ServiceBrowser,
    H: NetworkHost,
    X: BinaryExchange,
{
    pub fn new(
        browser: B,
        host: H,
        exchange: X,
        config: &ProvisionerConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(
            browser,
            config.discovery.clone(),
            observer.clone(),
        ));

        Self::with_resolver(resolver, host, exchange, config.session.clone(), observer)
    }

    /// Build a session around an existing resolver, sharing its address cache
    pub fn with_resolver(
        resolver: Arc<Resolver<B>>,
        host: H,
        exchange: X,
        config: SessionConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        Self {
            resolver,
            controller: AssociationController::new(host, observer.clone()),
            device: DeviceClient::new(exchange),
            config,
            state: SessionState::Idle,
            device_address: None,
            pending: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            observer,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Address the device answered on during the last scan
    pub fn device_address(&self) -> Option<&str> {
        self.device_address.as_deref()
    }

    pub fn resolver(&self) -> &Arc<Resolver<B>> {
        &self.resolver
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Join the device's access point
    pub async fn connect(&mut self) -> Result<(), ProvisionError> {
        self.expect_state(&[SessionState::Idle], "Idle")?;
        self.transition(SessionState::AssociatingWithDevice);

        let ssid = &self.config.device_ap_ssid;
        let result = cancellable(self.cancel_rx.clone(), async {
            self.controller
                .associate(ssid, None, false)
                .await
                .map_err(ProvisionError::from)
        })
        .await;

        self.settle(result)
    }

    /// Locate the device and ask it which networks it can see
    ///
    /// May be repeated to rescan before submitting.
    pub async fn scan(&mut self) -> Result<Vec<AccessPointCandidate>, ProvisionError> {
        self.expect_state(
            &[
                SessionState::AssociatingWithDevice,
                SessionState::QueryingNetworks,
            ],
            "AssociatingWithDevice or QueryingNetworks",
        )?;
        self.transition(SessionState::QueryingNetworks);

        let result = cancellable(self.cancel_rx.clone(), async {
            let address = self.locate_device().await?;
            let candidates = self.device.scan_results(&address).await?;
            Ok::<_, ProvisionError>((address, candidates))
        })
        .await;

        let (address, candidates) = self.settle(result)?;
        self.log(
            Level::Info,
            &format!("device at {address} reports {} networks", candidates.len()),
        );
        self.device_address = Some(address);
        Ok(candidates)
    }

    /// Send the chosen network and its passphrase to the device
    pub async fn submit(&mut self, request: ProvisioningRequest) -> Result<(), ProvisionError> {
        self.expect_state(&[SessionState::QueryingNetworks], "QueryingNetworks")?;
        self.transition(SessionState::Submitting);

        let result = cancellable(self.cancel_rx.clone(), async {
            let address = self
                .resolver
                .resolve_cached(&self.config.device_service)
                .await?;
            self.device.configure(&address, &request).await
        })
        .await;

        self.settle(result)?;
        self.pending = Some(request);
        Ok(())
    }

    /// Join the network the device was just provisioned to
    ///
    /// Waits the target settle delay afterwards so the device can switch
    /// networks too. The device's access-point address is stale by then, so
    /// the address cache is cleared before verification may start.
    pub async fn associate_with_target(&mut self) -> Result<(), ProvisionError> {
        self.expect_state(&[SessionState::Submitting], "Submitting")?;
        let Some(request) = self.pending.clone() else {
            return Err(SessionError::InvalidState {
                expected: "Submitting with a submitted request",
                actual: self.state,
            }
            .into());
        };
        self.transition(SessionState::AssociatingWithTarget);

        let delay = self.config.target_settle_delay;
        let result = cancellable(self.cancel_rx.clone(), async {
            self.controller
                .associate(
                    &request.target.ssid,
                    request.passphrase.as_deref(),
                    request.target.authentication_mode.is_wep(),
                )
                .await
                .map_err(ProvisionError::from)?;
            sleep(delay).await;
            Ok::<_, ProvisionError>(())
        })
        .await;

        self.settle(result)?;
        self.resolver.clear_cache();
        self.device_address = None;
        self.transition(SessionState::Verifying);
        Ok(())
    }

    /// Locate the device again, now on the target network
    ///
    /// A device that failed to join the target network never shows up there,
    /// so the resolution times out and the session fails.
    pub async fn locate_on_target(&mut self) -> Result<String, ProvisionError> {
        self.expect_state(&[SessionState::Verifying], "Verifying")?;

        let result = cancellable(self.cancel_rx.clone(), async {
            let address = self
                .resolver
                .resolve_cached(&self.config.device_service)
                .await?;
            Ok::<_, ProvisionError>(address)
        })
        .await;

        let address = self.settle(result)?;
        self.log(
            Level::Info,
            &format!("device answers at {address} on the target network"),
        );
        self.device_address = Some(address.clone());
        Ok(address)
    }

    /// Mark verification as done
    pub fn complete(&mut self) -> Result<(), ProvisionError> {
        self.expect_state(&[SessionState::Verifying], "Verifying")?;
        self.transition(SessionState::Completed);
        Ok(())
    }

    pub async fn led_status(&self, led: u8) -> Result<bool, ProvisionError> {
        let address = self.auxiliary_address().await?;
        self.device.led_status(&address, led).await
    }

    pub async fn set_led(&self, led: u8, enabled: bool) -> Result<(), ProvisionError> {
        let address = self.auxiliary_address().await?;
        self.device.set_led(&address, led, enabled).await
    }

    async fn auxiliary_address(&self) -> Result<String, ProvisionError> {
        self.expect_state(
            &[
                SessionState::AssociatingWithDevice,
                SessionState::QueryingNetworks,
                SessionState::Submitting,
            ],
            "connected to the device",
        )?;

        match &self.device_address {
            Some(address) => Ok(address.clone()),
            None => Ok(self
                .resolver
                .resolve_cached(&self.config.device_service)
                .await?),
        }
    }

    async fn locate_device(&self) -> Result<String, ProvisionError> {
        let service = &self.config.device_service;

        match self.resolver.cached(&service.instance_name) {
            Some(address) => Ok(address),
            None => Ok(self.resolver.discover(service).await?.resolved_address),
        }
    }

    fn expect_state(
        &self,
        allowed: &[SessionState],
        expected: &'static str,
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn settle<T>(&mut self, result: Result<T, ProvisionError>) -> Result<T, ProvisionError> {
        if let Err(e) = &result {
            self.log(Level::Error, &format!("{} failed: {e}", self.state));
            self.transition(SessionState::Failed);
        }
        result
    }

    fn transition(&mut self, next: SessionState) {
        self.log(Level::Debug, &format!("{} -> {next}", self.state));
        self.state = next;
    }

    fn log(&self, level: Level, message: &str) {
        self.observer.log(level, message);
    }
}

async fn cancellable<T>(
    mut cancel: watch::Receiver<bool>,
    step: impl Future<Output = Result<T, ProvisionError>>,
) -> Result<T, ProvisionError> {
    tokio::select! {
        result = step => result,
        Ok(_) = cancel.wait_for(|cancelled| *cancelled) => Err(SessionError::Cancelled.into()),
    }
}
