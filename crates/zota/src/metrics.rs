// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upgrade-server metrics.
//!
//! Plain counters, updated inline by the handlers. The engine is
//! single-threaded by design, so no atomics are needed; a snapshot is just a
//! copy.

/// Counters tracking upgrade-server behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtaServerMetrics {
    /// Query-next-image requests handled.
    pub queries: u64,
    /// Block responses carrying data.
    pub blocks_sent: u64,
    /// Image data bytes sent across all block responses.
    pub bytes_sent: u64,
    /// WAIT_FOR_DATA backpressure responses issued.
    pub waits_issued: u64,
    /// Page sessions entered.
    pub page_sessions_started: u64,
    /// Page sessions that ran to exhaustion.
    pub page_sessions_completed: u64,
    /// Page sessions released early (failure, stall, vanished image).
    pub page_sessions_aborted: u64,
    /// Upgrade-end exchanges that scheduled an upgrade.
    pub upgrades_completed: u64,
    /// Upgrade-end exchanges the server answered with ABORT.
    pub upgrades_aborted: u64,
    /// Image-notify broadcasts sent.
    pub notifies_sent: u64,
    /// Requests answered with UNSUP_COMMAND.
    pub unsupported_commands: u64,
}

impl OtaServerMetrics {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current counter values.
    pub fn snapshot(&self) -> Self {
        *self
    }
}
