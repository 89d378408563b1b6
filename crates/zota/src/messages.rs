// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upgrade-cluster request and response records.
//!
//! Requests arrive already decoded (the bus/cluster layer owns wire parsing)
//! and are plain records: every optional wire field is an `Option<T>`, never
//! a presence bitmask. Responses are encoded to bytes by [`crate::wire`]
//! before they reach the transport.

use crate::image::{Eui64, ImageIdentity, NodeId};
use crate::status::Status;

/// Command identifiers of the upgrade cluster (ZCL r8 Sec.11.13.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    /// Server advertisement that a new image may be available.
    ImageNotify = 0x00,
    /// Client query for the next eligible image.
    QueryNextImageRequest = 0x01,
    /// Server answer to a query.
    QueryNextImageResponse = 0x02,
    /// Client request for one slice of image data.
    ImageBlockRequest = 0x03,
    /// Client request for a server-paced run of block responses.
    ImagePageRequest = 0x04,
    /// Server answer carrying image data or backpressure.
    ImageBlockResponse = 0x05,
    /// Client end-of-transfer report.
    UpgradeEndRequest = 0x06,
    /// Server answer scheduling the upgrade.
    UpgradeEndResponse = 0x07,
    /// Client request for a vendor-specific file (unsupported here).
    QuerySpecificFileRequest = 0x08,
}

/// Client query: "is there a next image for me?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryNextImageRequest {
    /// Requesting node.
    pub source: NodeId,
    /// Endpoint the client expects the answer on.
    pub client_endpoint: u8,
    /// Identity of the firmware the client currently runs.
    pub current_image: ImageIdentity,
    /// Hardware version, when the client declares one.
    pub hardware_version: Option<u16>,
}

/// Client request for one slice of image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    /// Requesting node.
    pub source: NodeId,
    /// Endpoint the client expects the answer on.
    pub client_endpoint: u8,
    /// Image being transferred.
    pub image: ImageIdentity,
    /// Byte offset into the image file.
    pub offset: u32,
    /// Largest data field the client will accept.
    pub max_data_size: u8,
    /// Requester EUI, when the request carried one.
    pub requester_eui: Option<Eui64>,
    /// Minimum block period the client last acknowledged, in milliseconds.
    /// `Some` means the client supports block-period negotiation.
    pub min_block_period_ms: Option<u16>,
    /// Set on requests a page session synthesizes for its ticks.
    pub page_origin: bool,
}

/// Client request for a contiguous page served as paced block responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Requesting node.
    pub source: NodeId,
    /// Endpoint the client expects the responses on.
    pub client_endpoint: u8,
    /// Image being transferred.
    pub image: ImageIdentity,
    /// Byte offset the page starts at.
    pub offset: u32,
    /// Largest data field per block response.
    pub max_data_size: u8,
    /// Total bytes requested for the page.
    pub page_size: u16,
    /// Client-requested spacing between responses, in milliseconds.
    pub response_spacing_ms: u16,
    /// Requester EUI, when the request carried one.
    pub requester_eui: Option<Eui64>,
}

/// Client end-of-transfer report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeEndRequest {
    /// Reporting node.
    pub source: NodeId,
    /// Endpoint the client expects the answer on.
    pub client_endpoint: u8,
    /// Outcome the client reports for its download.
    pub status: Status,
    /// Image the report concerns.
    pub image: ImageIdentity,
}

/// Client request for a vendor-specific file. Always answered with
/// UNSUP_COMMAND by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySpecificFileRequest {
    /// Requesting node.
    pub source: NodeId,
    /// Endpoint the client expects the answer on.
    pub client_endpoint: u8,
    /// Requester EUI (mandatory on this command).
    pub requester_eui: Eui64,
    /// File identity requested.
    pub image: ImageIdentity,
}

/// Any request the server dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaRequest {
    /// Query for the next eligible image.
    QueryNextImage(QueryNextImageRequest),
    /// One block of image data.
    ImageBlock(BlockRequest),
    /// A server-paced page of image data.
    ImagePage(PageRequest),
    /// End-of-transfer report.
    UpgradeEnd(UpgradeEndRequest),
    /// Vendor-specific file query (unsupported).
    QuerySpecificFile(QuerySpecificFileRequest),
}

impl OtaRequest {
    /// Node the request came from.
    pub fn source(&self) -> NodeId {
        match self {
            Self::QueryNextImage(r) => r.source,
            Self::ImageBlock(r) => r.source,
            Self::ImagePage(r) => r.source,
            Self::UpgradeEnd(r) => r.source,
            Self::QuerySpecificFile(r) => r.source,
        }
    }

    /// Command identifier of the request, for default responses.
    pub fn command_id(&self) -> CommandId {
        match self {
            Self::QueryNextImage(_) => CommandId::QueryNextImageRequest,
            Self::ImageBlock(_) => CommandId::ImageBlockRequest,
            Self::ImagePage(_) => CommandId::ImagePageRequest,
            Self::UpgradeEnd(_) => CommandId::UpgradeEndRequest,
            Self::QuerySpecificFile(_) => CommandId::QuerySpecificFileRequest,
        }
    }
}

/// Server answer to a query-next-image request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryNextImageResponse {
    /// SUCCESS or NO_IMAGE_AVAILABLE.
    pub status: Status,
    /// Offered image, [`ImageIdentity::INVALID`] when none.
    pub image: ImageIdentity,
    /// Total size of the offered image in bytes.
    pub image_size: u32,
}

/// Server answer to a block request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockResponse {
    /// A slice of image data.
    Success {
        /// Image the data belongs to.
        image: ImageIdentity,
        /// Byte offset of the slice.
        offset: u32,
        /// The data itself.
        data: Vec<u8>,
    },
    /// Backpressure: the client must retry later.
    WaitForData {
        /// Server-relative current time in seconds (always 0 here).
        current_time: u32,
        /// Seconds until the client should retry.
        request_time: u32,
        /// Minimum block period the client must honor from now on, when the
        /// client supports the field.
        min_block_period_ms: Option<u16>,
    },
    /// Server-directed stop of the transfer.
    Abort,
}

/// Server answer scheduling the upgrade after a successful download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeEndResponse {
    /// Image the schedule concerns.
    pub image: ImageIdentity,
    /// Server-relative current time in seconds (always 0 here).
    pub current_time: u32,
    /// Seconds until the client should run the new image.
    /// [`crate::config::WAIT_INDEFINITELY`] means "ask again".
    pub upgrade_time: u32,
}

/// Server broadcast advertising that a new image may be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNotify {
    /// Probability in percent that a hearing client queries back.
    pub query_jitter: u8,
    /// Image being advertised.
    pub image: ImageIdentity,
}

/// Catch-all acknowledgement carrying only a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultResponse {
    /// Command being answered.
    pub command: CommandId,
    /// Outcome code.
    pub status: Status,
}
