// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upgrade-server configuration - single source of truth.
//!
//! This module centralizes all protocol constants and the runtime
//! [`OtaServerConfig`]. **Never hardcode these values elsewhere!**

use std::time::Duration;

// =======================================================================
// Wire-format constants (ZCL r8 Sec.11.13, OTA Upgrade cluster)
// =======================================================================

/// Fixed byte overhead of an image-block response ahead of the data field.
///
/// Frame header (3) + status (1) + image identity (8) + file offset (4) +
/// data size (1). The usable data budget for a peer is its transport payload
/// limit minus this value. Pinned against the actual encoder output by a
/// test in `wire`.
pub const BLOCK_RESPONSE_OVERHEAD: usize = 17;

/// Server-side ceiling on the data field of a single block response.
///
/// Matches the largest data size a standard-security APS frame can carry;
/// clients may ask for less, never get more.
pub const MAX_BLOCK_DATA_SIZE: u8 = 63;

/// Upgrade-time value meaning "wait for another upgrade-end exchange".
///
/// Clients receiving this re-ask instead of scheduling an upgrade.
pub const WAIT_INDEFINITELY: u32 = 0xFFFF_FFFF;

// =======================================================================
// Timing constants
// =======================================================================

/// Delay advertised by the upgrade-soon policy (ZCL leaves this to the
/// server; two minutes is the conventional choice).
pub const UPGRADE_SOON_DELAY: Duration = Duration::from_secs(120);

/// Floor applied to the client-requested page response spacing so a page
/// session cannot flood the link.
pub const MIN_PAGE_RESPONSE_SPACING: Duration = Duration::from_millis(5);

/// Minimum block period advertised until an operator configures one.
pub const DEFAULT_MIN_BLOCK_PERIOD_MS: u16 = 0;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Per-instance server configuration.
///
/// One value per running [`OtaServer`](crate::OtaServer); there is no
/// process-wide configuration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaServerConfig {
    /// Endpoint the server's responses originate from.
    pub server_endpoint: u8,
    /// Ceiling on the data field of one block response.
    pub max_block_data_size: u8,
    /// Floor on the spacing between page-session block responses.
    pub min_page_response_spacing: Duration,
}

impl Default for OtaServerConfig {
    fn default() -> Self {
        Self {
            server_endpoint: 1,
            max_block_data_size: MAX_BLOCK_DATA_SIZE,
            min_page_response_spacing: MIN_PAGE_RESPONSE_SPACING,
        }
    }
}
