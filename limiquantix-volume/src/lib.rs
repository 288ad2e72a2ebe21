//! # limiquantix Volume
//!
//! Block-storage volume drivers for limiquantix hosts.
//!
//! This crate lists, inspects and binds volumes on external storage and
//! reconciles what the array reports with what is mapped on this host:
//! - **Ceph RBD** (primary) - `rbd`/`ceph` CLIs, full lifecycle
//! - **Dell EMC XtremIO** - XMS REST API, inventory only
//! - **Mock** - in-memory, for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           VolumeDriver Trait            │
//! │  (volumes, volume_inspect, attach...)   │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │     RbdDriver     │     │   XtremioDriver   │
//! │  (rbd/ceph CLI)   │     │    (XMS REST)     │
//! └─────────┬─────────┘     └─────────┬─────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌─────────────────────────────────────────────┐
//! │ SessionCache  │ AttachmentResolver          │
//! │ (per creds)   │ (local index + watchers)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_volume::{build_driver, AttachmentRequest, DriverConfig, SessionCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sessions = Arc::new(SessionCache::new());
//!     let driver = build_driver(&DriverConfig::default(), sessions).unwrap();
//!
//!     for volume in driver.volumes(AttachmentRequest::Devices).await.unwrap() {
//!         println!("{} {:?}", volume.id, volume.attachment_state);
//!     }
//! }
//! ```

pub mod error;
pub mod identifier;
pub mod session;
pub mod exec;
pub mod types;
pub mod attachments;
pub mod resolver;
pub mod config;
pub mod traits;
pub mod driver;
pub mod mock;
pub mod rbd;
pub mod xtremio;

pub use error::{Result, VolumeError};
pub use identifier::{VolumeId, VolumeIdCodec};
pub use session::{Credentials, Fingerprint, SessionCache, SessionHandle};
pub use exec::{CommandExecutor, ScriptedExecutor, SystemExecutor};
pub use types::*;
pub use attachments::{LocalAttachmentIndex, LocalDeviceEnumerator, StaticEnumerator};
pub use resolver::{AttachmentResolver, Resolution, WatcherProbe};
pub use config::{BackendKind, DriverConfig, RbdConfig, XtremioConfig};
pub use traits::VolumeDriver;
pub use driver::{build_driver, instance_id};
pub use mock::MockDriver;
pub use rbd::{MappedDevices, RbdConnection, RbdDriver};
pub use xtremio::{DiskByIdDevices, XtremioClient, XtremioDriver};
