// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ZOTA - Over-the-air firmware upgrade server engine
//!
//! A pure Rust implementation of the server side of the OTA upgrade cluster:
//! block-by-block firmware streaming to constrained clients over lossy,
//! small-payload links, with a server-paced page mode, WAIT_FOR_DATA
//! backpressure, and policy-driven version and upgrade-timing decisions.
//!
//! The engine is **sans-I/O and single-threaded**: it owns no sockets, no
//! threads and no clocks. Storage, transport, timing and observation reach
//! it through injected capabilities, which keeps every protocol path
//! deterministic under test and lets any number of independent server
//! instances share a process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Instant;
//! use zota::{
//!     ImageIdentity, ManualScheduler, MemoryImageStore, NullEvents, OtaServer,
//!     OtaServerConfig, ServerContext,
//! };
//! # struct Radio;
//! # impl zota::TransportLink for Radio {
//! #     fn max_payload_for(&self, _: zota::NodeId) -> usize { 80 }
//! #     fn send_unicast(&mut self, _: zota::NodeId, _: u8, _: &[u8]) -> Result<(), zota::SendError> { Ok(()) }
//! #     fn send_broadcast(&mut self, _: &[u8]) -> Result<(), zota::SendError> { Ok(()) }
//! # }
//!
//! let mut store = MemoryImageStore::new();
//! store.insert(ImageIdentity::new(0x1002, 0x0001, 2), firmware_bytes());
//!
//! let mut server = OtaServer::new(OtaServerConfig::default());
//! let mut link = Radio;
//! let mut events = NullEvents;
//! let mut timer = ManualScheduler::new();
//!
//! // Event loop: decode a request off the bus, hand it to the server
//! # let request: zota::OtaRequest = unimplemented!();
//! let mut ctx = ServerContext {
//!     store: &store,
//!     link: &mut link,
//!     events: &mut events,
//!     timer: &mut timer,
//! };
//! let status = server.handle_request(Instant::now(), &request, &mut ctx);
//! # fn firmware_bytes() -> Vec<u8> { Vec::new() }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                            Embedder                                |
//! |      bus decode -> OtaRequest | event loop timer | observer        |
//! +--------------------------------------------------------------------+
//! |                        Dispatch (OtaServer)                        |
//! |  query-next-image | image-block | image-page | upgrade-end | notify|
//! +--------------------------------------------------------------------+
//! |     Policy          |   Block engine        |   Page session       |
//! |  version rules      |  MTU/ceiling clamp    |  single slot         |
//! |  rate limiting      |  store read + send    |  timer-paced ticks   |
//! |  upgrade timing     |  lifecycle events     |  stall recovery      |
//! +--------------------------------------------------------------------+
//! |                     Injected capabilities                          |
//! |   ImageStore | TransportLink | OtaEvents | TickScheduler           |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`OtaServer`] | Per-instance protocol state and request dispatch |
//! | [`ServerContext`] | Capability bundle a call runs against |
//! | [`PolicyState`] | Version, rate-limit and upgrade-timing rules |
//! | [`ImageStore`] | Storage capability (size, header, read, search) |
//! | [`TransportLink`] | Send capability with per-peer payload budgets |
//! | [`OtaEvents`] | Non-vetoing transfer lifecycle notifications |
//! | [`TickScheduler`] | Page-tick timer the embedder drives |
//!
//! ## Logging
//!
//! All diagnostics go through the [`log`] facade; install any compatible
//! logger. The engine never prints.

/// Block transfer engine.
mod block;
/// Constants and runtime configuration.
pub mod config;
/// Transfer lifecycle observer trait.
pub mod events;
/// Image identity and header records.
pub mod image;
/// Request and response records.
pub mod messages;
/// Server metrics counters.
pub mod metrics;
/// Token-bucket byte-rate limiter.
pub mod pacing;
/// Page transfer session state machine.
mod page;
/// Upgrade policy decisions.
pub mod policy;
/// Server state and request dispatch.
mod server;
/// Response status vocabulary.
pub mod status;
/// Image storage capability and the RAM-backed store.
pub mod store;
/// Tick scheduling abstraction.
pub mod timer;
/// Transport capability.
pub mod transport;
/// Response payload encoders.
pub mod wire;

pub use config::OtaServerConfig;
pub use events::{NullEvents, OtaEvents};
pub use image::{Eui64, HardwareVersionRange, ImageHeader, ImageIdentity, NodeId};
pub use messages::{
    BlockRequest, BlockResponse, CommandId, DefaultResponse, ImageNotify, OtaRequest,
    PageRequest, QueryNextImageRequest, QueryNextImageResponse, QuerySpecificFileRequest,
    UpgradeEndRequest, UpgradeEndResponse,
};
pub use metrics::OtaServerMetrics;
pub use pacing::TokenBucket;
pub use policy::{
    BlockDecision, BlockRequestPolicy, NextImage, NextVersionPolicy, PolicyState,
    UpgradeEndDecision, UpgradeEndPolicy,
};
pub use server::{OtaServer, ServerContext};
pub use status::Status;
pub use store::{ImageStore, MemoryImageStore};
pub use timer::{ManualScheduler, TickScheduler};
pub use transport::{SendError, TransportLink};
