//! DNS-SD browser backed by the `mdns-sd` daemon

use super::{BrowseEvent, BrowseResult, BrowseSession, ServiceBrowser};
use crate::{error::DiscoveryError, types::ServiceDescriptor};
use log::{debug, warn};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::{
    collections::{BTreeMap, HashSet},
    net::IpAddr,
};
use tokio::sync::mpsc;

/// Browses and resolves through one shared daemon
///
/// The daemon keeps a single browse per service type: stopping one stops
/// all of them. Callers must not overlap `browse` and `resolve` on the same
/// type; [`super::Resolver`] serializes them.
#[derive(Clone)]
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

/// Stops a browse on the daemon when dropped
struct StopBrowse {
    daemon: ServiceDaemon,
    ty_domain: String,
}

impl Drop for StopBrowse {
    fn drop(&mut self) {
        debug!("stop browsing {}", self.ty_domain);
        if let Err(e) = self.daemon.stop_browse(&self.ty_domain) {
            warn!("failed to stop browsing {}: {e}", self.ty_domain);
        }
    }
}

impl MdnsBrowser {
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(transport_failure)?;
        Ok(Self { daemon })
    }
}

impl ServiceBrowser for MdnsBrowser {
    async fn browse(
        &self,
        service_type: &str,
        domain: &str,
    ) -> Result<BrowseSession, DiscoveryError> {
        let ty_domain = ty_domain(service_type, domain);
        let receiver = self.daemon.browse(&ty_domain).map_err(transport_failure)?;
        let stop = StopBrowse {
            daemon: self.daemon.clone(),
            ty_domain: ty_domain.clone(),
        };

        let (tx, rx) = mpsc::channel(16);
        let forwarder = tokio::spawn(async move {
            let mut visible = BTreeMap::new();

            while let Ok(event) = receiver.recv_async().await {
                let changed = match event {
                    ServiceEvent::ServiceFound(_, fullname) => {
                        match instance_name(&fullname, &ty_domain) {
                            Some(instance_name) => visible
                                .insert(
                                    fullname.clone(),
                                    BrowseResult {
                                        instance_name,
                                        endpoint: fullname,
                                    },
                                )
                                .is_none(),
                            None => false,
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        visible.remove(&fullname).is_some()
                    }
                    ServiceEvent::SearchStopped(_) => break,
                    _ => false,
                };

                if changed
                    && tx
                        .send(BrowseEvent::Results(visible.values().cloned().collect()))
                        .await
                        .is_err()
                {
                    break;
                }
            }
        });

        Ok(BrowseSession::new(rx, move || {
            forwarder.abort();
            drop(stop);
        }))
    }

    async fn resolve(&self, descriptor: &ServiceDescriptor) -> Result<String, DiscoveryError> {
        let ty_domain = ty_domain(&descriptor.service_type, &descriptor.domain);
        let fullname = format!("{}.{ty_domain}", descriptor.instance_name);
        let receiver = self.daemon.browse(&ty_domain).map_err(transport_failure)?;
        let _stop = StopBrowse {
            daemon: self.daemon.clone(),
            ty_domain,
        };

        loop {
            match receiver.recv_async().await {
                Ok(ServiceEvent::ServiceResolved(info)) if info.get_fullname() == fullname => {
                    if let Some(address) = preferred_address(info.get_addresses()) {
                        debug!("resolved {fullname} to {address}");
                        return Ok(address.to_string());
                    }
                }
                Ok(ServiceEvent::SearchStopped(_)) | Err(_) => {
                    return Err(DiscoveryError::TransportFailure(format!(
                        "browser stopped before {fullname} was resolved"
                    )));
                }
                Ok(_) => {}
            }
        }
    }
}

fn transport_failure(err: mdns_sd::Error) -> DiscoveryError {
    DiscoveryError::TransportFailure(err.to_string())
}

/// Fully qualified service type as the daemon expects it, e.g. `_http._tcp.local.`
fn ty_domain(service_type: &str, domain: &str) -> String {
    let service_type = service_type.trim_matches('.');
    let domain = match domain.trim_matches('.') {
        "" => "local",
        domain => domain,
    };
    format!("{service_type}.{domain}.")
}

/// Instance label of `fullname` if it belongs to `ty_domain`
fn instance_name(fullname: &str, ty_domain: &str) -> Option<String> {
    fullname
        .strip_suffix(ty_domain)?
        .strip_suffix('.')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// IPv4 first, then the lowest address for a stable choice
fn preferred_address(addresses: &HashSet<IpAddr>) -> Option<IpAddr> {
    addresses
        .iter()
        .copied()
        .min_by_key(|address| (address.is_ipv6(), *address))
}
