//! Provisioning services
//!
//! `discovery` finds the device on the local network, `association` moves the
//! host between networks and `provisioning` drives both through one session.

pub mod association;
pub mod discovery;
pub mod provisioning;
