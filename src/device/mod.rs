//! Collaborator interfaces for talking to the device.
//!
//! The collection engine never speaks a protocol itself. It goes through the
//! capability traits defined here: UPnP actions resolved from a discovered
//! service table, and Lua pages fetched with a session credential, decoded
//! as JSON and turned into rows.

pub mod action;
pub mod extract;
pub mod page;
pub mod snapshot;

pub use action::{
    Action, ActionInfo, CallArgument, FieldMap, FieldValue, Service, ServiceDiscovery,
    ServiceTable,
};
pub use extract::{JsonRowExtractor, LabelRename, PageRow, RowExtractor, ValueDefinition};
pub use page::{JsonPageDecoder, PageDecoder, PageLoader, PageRequest, SessionCredential};
pub use snapshot::SnapshotDevice;
