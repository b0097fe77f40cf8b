//! Service resolver
//!
//! Resolves a DNS-SD service instance advertised by the device to an IP
//! address and caches the result per instance name.

pub mod mdns;
pub mod slot;

use crate::{
    config::DiscoveryConfig,
    error::DiscoveryError,
    observer::Observer,
    types::{ResolvedService, ServiceDescriptor},
};
use log::Level;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use slot::ResultSlot;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use trait_variant::make;

pub use mdns::MdnsBrowser;

/// One entry of a browse result batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowseResult {
    pub instance_name: String,
    pub endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowseEvent {
    /// All instances currently visible
    Results(Vec<BrowseResult>),
    Failed(String),
}

/// A running browse operation
///
/// Dropping the session tears the underlying listener down.
pub struct BrowseSession {
    events: mpsc::Receiver<BrowseEvent>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl BrowseSession {
    pub fn new(
        events: mpsc::Receiver<BrowseEvent>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Next batch, `None` once the browser stopped
    pub async fn next(&mut self) -> Option<BrowseEvent> {
        self.events.recv().await
    }
}

impl Drop for BrowseSession {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for BrowseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowseSession")
            .field("torn_down", &self.teardown.is_none())
            .finish()
    }
}

/// Local network service discovery
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait ServiceBrowser {
    async fn browse(
        &self,
        service_type: &str,
        domain: &str,
    ) -> Result<BrowseSession, DiscoveryError>;
    async fn resolve(&self, descriptor: &ServiceDescriptor) -> Result<String, DiscoveryError>;
}

type DiscoverySlot = ResultSlot<Result<ResolvedService, DiscoveryError>>;

struct ActiveDiscovery {
    id: u64,
    slot: DiscoverySlot,
}

/// Unregisters a discovery attempt when it ends, however it ends
struct ActiveGuard<'a> {
    active: &'a Mutex<Option<ActiveDiscovery>>,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.id == self.id) {
            *active = None;
        }
    }
}

enum Finished {
    Searched(Result<ResolvedService, DiscoveryError>),
    Completed(Result<ResolvedService, DiscoveryError>),
}

pub struct Resolver<B> {
    browser: B,
    cache: RwLock<HashMap<String, String>>,
    active: Mutex<Option<ActiveDiscovery>>,
    /// Browsers may not run two operations on one service type at once
    resolving: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    config: DiscoveryConfig,
    observer: Arc<dyn Observer>,
}

impl<B> Resolver<B>
where
    B: ServiceBrowser,
{
    pub fn new(browser: B, config: DiscoveryConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            browser,
            cache: RwLock::new(HashMap::new()),
            active: Mutex::new(None),
            resolving: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
            config,
            observer,
        }
    }

    /// Browse for `descriptor` and resolve its address
    ///
    /// Waits the settle delay first. A discovery already in flight is
    /// cancelled and replaced, and [`Self::cancel`] rejects this one at any
    /// point, settle delay included. The browse session is torn down before
    /// this returns, whatever the outcome.
    pub async fn discover(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<ResolvedService, DiscoveryError> {
        let (slot, mut outcome) = ResultSlot::new();
        let _guard = self.activate(slot.clone());

        let search = async {
            sleep(self.config.settle_delay).await;

            match timeout(self.config.timeout, self.search(descriptor)).await {
                Ok(result) => result,
                Err(_) => {
                    self.log(
                        Level::Error,
                        &format!("no {} found in time", descriptor.instance_name),
                    );
                    Err(DiscoveryError::Timeout)
                }
            }
        };

        let finished = tokio::select! {
            result = search => Finished::Searched(result),
            result = &mut outcome => {
                Finished::Completed(result.unwrap_or(Err(DiscoveryError::Cancelled)))
            }
        };

        match finished {
            Finished::Searched(result) => {
                if slot.complete(result.clone()) {
                    result
                } else {
                    // lost the race against a cancellation
                    outcome.await.unwrap_or(Err(DiscoveryError::Cancelled))
                }
            }
            Finished::Completed(result) => {
                self.log(Level::Info, "Stopped / Cancelled");
                result
            }
        }
    }

    /// Cached address of `descriptor`, re-resolving just this instance on a miss
    pub async fn resolve_cached(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<String, DiscoveryError> {
        if let Some(address) = self.cached(&descriptor.instance_name) {
            self.log(
                Level::Info,
                &format!("Cache Hit for Resolving {}", descriptor.instance_name),
            );
            return Ok(address);
        }

        self.log(
            Level::Warn,
            &format!(
                "Cache Miss for Resolving {}. Attempting to resolve again...",
                descriptor.instance_name
            ),
        );

        let _resolving = self.resolving.lock().await;
        // a concurrent resolution may have filled the cache meanwhile
        if let Some(address) = self.cached(&descriptor.instance_name) {
            return Ok(address);
        }

        let address = timeout(self.config.timeout, self.browser.resolve(descriptor))
            .await
            .map_err(|_| DiscoveryError::Timeout)??;

        self.store(&descriptor.instance_name, &address);
        Ok(address)
    }

    pub fn cached(&self, instance_name: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instance_name)
            .cloned()
    }

    pub fn clear_cache(&self) {
        self.log(Level::Debug, "Clearing Cached Resolved IP Addresses.");
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Reject the discovery in flight, if any, with [`DiscoveryError::Cancelled`]
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = active.as_ref() {
            if active.slot.complete(Err(DiscoveryError::Cancelled)) {
                self.log(Level::Debug, "Cancelling Browser...");
            }
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn activate(&self, slot: DiscoverySlot) -> ActiveGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveDiscovery { id, slot });

        if let Some(previous) = previous {
            if previous.slot.complete(Err(DiscoveryError::Cancelled)) {
                self.log(Level::Debug, "Replacing running browser");
            }
        }

        ActiveGuard {
            active: &self.active,
            id,
        }
    }

    async fn search(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<ResolvedService, DiscoveryError> {
        let _resolving = self.resolving.lock().await;

        self.log(Level::Debug, "Starting Browser...");
        let mut session = self
            .browser
            .browse(&descriptor.service_type, &descriptor.domain)
            .await?;

        let found = loop {
            match session.next().await {
                Some(BrowseEvent::Results(results)) => {
                    self.log(Level::Debug, &format!("Found {} results.", results.len()));

                    if let Some(found) = results
                        .into_iter()
                        .find(|result| result.instance_name == descriptor.instance_name)
                    {
                        break found;
                    }
                }
                Some(BrowseEvent::Failed(reason)) => {
                    self.log(Level::Error, &reason);
                    return Err(DiscoveryError::TransportFailure(reason));
                }
                None => {
                    return Err(DiscoveryError::TransportFailure(
                        "browser stopped before the service was found".to_string(),
                    ));
                }
            }
        };

        // one resolution at a time, stop browsing first
        self.log(Level::Debug, "Cancelling Browser...");
        drop(session);

        let address = self.browser.resolve(descriptor).await?;
        self.store(&descriptor.instance_name, &address);
        self.log(
            Level::Debug,
            &format!(
                "Cached IP ADDRESS {address} for Service {} ({})",
                found.instance_name, found.endpoint
            ),
        );

        Ok(ResolvedService {
            instance_name: found.instance_name,
            resolved_address: address,
        })
    }

    fn store(&self, instance_name: &str, address: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance_name.to_string(), address.to_string());
    }

    fn log(&self, level: Level, message: &str) {
        self.observer.log(level, message);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Browse session fed by the returned sender; `torn_down` flips on drop
    pub fn browse_session(
        events: Vec<BrowseEvent>,
        torn_down: Arc<AtomicBool>,
    ) -> (BrowseSession, mpsc::Sender<BrowseEvent>) {
        let (tx, rx) = mpsc::channel(events.len() + 1);
        for event in events {
            tx.try_send(event).unwrap();
        }

        let session = BrowseSession::new(rx, move || torn_down.store(true, Ordering::SeqCst));
        (session, tx)
    }

    pub fn result(instance_name: &str) -> BrowseResult {
        BrowseResult {
            instance_name: instance_name.to_string(),
            endpoint: format!("{instance_name}._http._tcp.local."),
        }
    }

    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("_http._tcp", "local.", "wifiprov")
    }

    pub fn instant_config() -> DiscoveryConfig {
        DiscoveryConfig {
            settle_delay: std::time::Duration::ZERO,
            timeout: std::time::Duration::from_secs(30),
        }
    }

    /// Browser whose single browse call yields `events` and resolves to `address`
    pub fn browser_finding(
        events: Vec<BrowseEvent>,
        address: &'static str,
        torn_down: Arc<AtomicBool>,
    ) -> MockServiceBrowser {
        let (session, _tx) = browse_session(events, torn_down);
        let mut session = Some(session);

        let mut browser = MockServiceBrowser::new();
        browser.expect_browse().times(1).returning(move |_, _| {
            let session = session.take().unwrap();
            Box::pin(async move { Ok(session) })
        });
        browser
            .expect_resolve()
            .times(1)
            .returning(move |_| Box::pin(async move { Ok(address.to_string()) }));
        browser
    }
}
