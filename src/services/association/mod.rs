//! Network-association controller
//!
//! Asks the host to join a wireless network. The host reports some
//! in-between states as errors although the join succeeds eventually; those
//! are mapped to success by [`ASSOCIATION_OUTCOMES`].

pub mod nmcli;

use crate::{error::AssociationError, observer::Observer};
use log::Level;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::{fmt, sync::Arc};
use trait_variant::make;

pub use nmcli::NmcliHost;

/// Failure codes reported by the host's association API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostErrorCode {
    AlreadyAssociated,
    Pending,
    Invalid,
    InvalidSsid,
    InvalidPassphrase,
    UserDenied,
    NetworkNotFound,
    SystemConfiguration,
    Internal,
    Unknown,
}

impl HostErrorCode {
    pub const ALL: [HostErrorCode; 10] = [
        HostErrorCode::AlreadyAssociated,
        HostErrorCode::Pending,
        HostErrorCode::Invalid,
        HostErrorCode::InvalidSsid,
        HostErrorCode::InvalidPassphrase,
        HostErrorCode::UserDenied,
        HostErrorCode::NetworkNotFound,
        HostErrorCode::SystemConfiguration,
        HostErrorCode::Internal,
        HostErrorCode::Unknown,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostError {
    pub code: HostErrorCode,
    pub message: String,
}

impl HostError {
    pub fn new(code: HostErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for HostError {}

#[derive(Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub ssid: String,
    pub passphrase: Option<String>,
    pub is_wep: bool,
}

impl fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRequest")
            .field("ssid", &self.ssid)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("is_wep", &self.is_wep)
            .finish()
    }
}

/// The host's network-association API
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait NetworkHost {
    async fn join(&self, request: &JoinRequest) -> Result<(), HostError>;
}

/// Outcome of every host error code, `None` means success-equivalent
pub const ASSOCIATION_OUTCOMES: &[(HostErrorCode, Option<AssociationError>)] = &[
    (HostErrorCode::AlreadyAssociated, None),
    (HostErrorCode::Pending, None),
    (HostErrorCode::Invalid, Some(AssociationError::Rejected)),
    (HostErrorCode::InvalidSsid, Some(AssociationError::Rejected)),
    (
        HostErrorCode::InvalidPassphrase,
        Some(AssociationError::Rejected),
    ),
    (HostErrorCode::UserDenied, Some(AssociationError::UserDenied)),
    (
        HostErrorCode::NetworkNotFound,
        Some(AssociationError::NetworkNotFound),
    ),
    (
        HostErrorCode::SystemConfiguration,
        Some(AssociationError::Internal),
    ),
    (HostErrorCode::Internal, Some(AssociationError::Internal)),
    (HostErrorCode::Unknown, Some(AssociationError::Internal)),
];

/// Map a host error code onto the caller-visible result
pub fn classify(code: HostErrorCode) -> Result<(), AssociationError> {
    let outcome = ASSOCIATION_OUTCOMES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, outcome)| *outcome)
        .unwrap_or(Some(AssociationError::Internal));

    match outcome {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

pub struct AssociationController<H> {
    host: H,
    observer: Arc<dyn Observer>,
}

impl<H> AssociationController<H>
where
    H: NetworkHost,
{
    pub fn new(host: H, observer: Arc<dyn Observer>) -> Self {
        Self { host, observer }
    }

    /// Join `ssid`; "already associated" and "pending" count as success
    pub async fn associate(
        &self,
        ssid: &str,
        passphrase: Option<&str>,
        is_wep: bool,
    ) -> Result<(), AssociationError> {
        self.observer
            .log(Level::Info, &format!("Switching to {ssid}..."));

        let request = JoinRequest {
            ssid: ssid.to_string(),
            passphrase: passphrase.map(str::to_string),
            is_wep,
        };

        let Err(err) = self.host.join(&request).await else {
            return Ok(());
        };

        match classify(err.code) {
            Ok(()) => {
                self.observer.log(
                    Level::Debug,
                    &format!("ignoring association state for {ssid}: {err}"),
                );
                Ok(())
            }
            Err(association_error) => {
                self.observer.log(
                    Level::Error,
                    &format!("failed to associate with {ssid}: {err}"),
                );
                Err(association_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NullObserver, testing::RecordingObserver};

    fn controller_returning(code: Option<HostErrorCode>) -> AssociationController<MockNetworkHost> {
        let mut host = MockNetworkHost::new();
        host.expect_join().times(1).returning(move |_| {
            Box::pin(async move {
                match code {
                    Some(code) => Err(HostError::new(code, "host says no")),
                    None => Ok(()),
                }
            })
        });
        AssociationController::new(host, Arc::new(NullObserver))
    }

    mod classify {
        use super::*;

        #[test]
        fn every_code_has_exactly_one_outcome() {
            for code in HostErrorCode::ALL {
                let entries = ASSOCIATION_OUTCOMES
                    .iter()
                    .filter(|(known, _)| *known == code)
                    .count();
                assert_eq!(entries, 1, "{code:?}");
            }
            assert_eq!(ASSOCIATION_OUTCOMES.len(), HostErrorCode::ALL.len());
        }

        #[test]
        fn only_benign_codes_succeed() {
            let benign: Vec<_> = HostErrorCode::ALL
                .into_iter()
                .filter(|code| classify(*code).is_ok())
                .collect();

            assert_eq!(
                benign,
                vec![HostErrorCode::AlreadyAssociated, HostErrorCode::Pending]
            );
        }

        #[test]
        fn maps_failures() {
            assert_eq!(
                classify(HostErrorCode::InvalidPassphrase),
                Err(AssociationError::Rejected)
            );
            assert_eq!(
                classify(HostErrorCode::UserDenied),
                Err(AssociationError::UserDenied)
            );
            assert_eq!(
                classify(HostErrorCode::NetworkNotFound),
                Err(AssociationError::NetworkNotFound)
            );
            assert_eq!(
                classify(HostErrorCode::Unknown),
                Err(AssociationError::Internal)
            );
        }
    }

    mod associate {
        use super::*;

        #[tokio::test]
        async fn succeeds_when_host_joins() {
            let controller = controller_returning(None);
            assert!(controller.associate("HomeNet", Some("secret123"), false).await.is_ok());
        }

        #[tokio::test]
        async fn swallows_already_associated() {
            let controller = controller_returning(Some(HostErrorCode::AlreadyAssociated));
            assert_eq!(controller.associate("HomeNet", None, false).await, Ok(()));
        }

        #[tokio::test]
        async fn swallows_pending() {
            let controller = controller_returning(Some(HostErrorCode::Pending));
            assert_eq!(controller.associate("HomeNet", None, false).await, Ok(()));
        }

        #[tokio::test]
        async fn surfaces_rejected() {
            let controller = controller_returning(Some(HostErrorCode::Invalid));
            assert_eq!(
                controller.associate("HomeNet", None, false).await,
                Err(AssociationError::Rejected)
            );
        }

        #[tokio::test]
        async fn surfaces_user_denied() {
            let controller = controller_returning(Some(HostErrorCode::UserDenied));
            assert_eq!(
                controller.associate("HomeNet", None, false).await,
                Err(AssociationError::UserDenied)
            );
        }

        #[tokio::test]
        async fn forwards_join_request() {
            let mut host = MockNetworkHost::new();
            host.expect_join()
                .withf(|request| {
                    request.ssid == "OldRouter"
                        && request.passphrase.as_deref() == Some("wepkey")
                        && request.is_wep
                })
                .times(1)
                .returning(|_| Box::pin(async { Ok(()) }));
            let controller = AssociationController::new(host, Arc::new(NullObserver));

            controller
                .associate("OldRouter", Some("wepkey"), true)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn logs_failure() {
            let mut host = MockNetworkHost::new();
            host.expect_join().returning(|_| {
                Box::pin(async {
                    Err(HostError::new(HostErrorCode::NetworkNotFound, "no such ssid"))
                })
            });
            let observer = Arc::new(RecordingObserver::default());
            let controller = AssociationController::new(host, observer.clone());

            let _ = controller.associate("Nowhere", None, false).await;

            assert!(observer.contains(Level::Error, "no such ssid"));
        }
    }

    #[test]
    fn join_request_debug_hides_passphrase() {
        let request = JoinRequest {
            ssid: "HomeNet".to_string(),
            passphrase: Some("secret123".to_string()),
            is_wep: false,
        };
        assert!(!format!("{request:?}").contains("secret123"));
    }
}
