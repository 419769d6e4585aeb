//! Patroni REST API client and wire types.
//!
//! Patroni exposes a small HTTP control surface per node (`/cluster`,
//! `/patroni`, `/primary`, `/switchover`, `/failover`, `/restart`,
//! `/reinitialize`). This module owns the wire types, including the
//! decoding quirks of the `lag` field, and a thin [`Client`] over them.

mod client;
mod types;

pub use client::Client;
pub use types::{ClusterStatus, Member, NodeInfo, XlogInfo, STATE_RUNNING};
