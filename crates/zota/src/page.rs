// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Page transfer session.
//!
//! A page request asks the server to push a contiguous region as a run of
//! timer-paced block responses, so a sleepy client does not have to issue
//! one request per block. The session is a single slot: at most one page
//! transfer is live per server, and a second request is rejected outright
//! rather than queued.
//!
//! ## State machine
//!
//! ```text
//!              page request, valid
//!   Idle ----------------------------> Active
//!    ^                                   |
//!    |   page/file exhausted, abort,     | tick: synthesize one block
//!    |   stall, or image vanished        | request, re-arm after spacing
//!    +-----------------------------------+
//! ```
//!
//! Each tick requests `min(remaining in page, remaining in file, block
//! budget)` bytes through the block engine. Backpressure re-arms the timer
//! without counting as progress; any other zero-byte tick releases the slot
//! (an abandoning client costs the slot only until its next tick fires).

use std::time::{Duration, Instant};

use crate::block::{self, BlockOutcome};
use crate::image::{ImageIdentity, NodeId};
use crate::messages::{BlockRequest, PageRequest};
use crate::server::{OtaServer, ServerContext};
use crate::status::Status;

/// The single page-session slot.
///
/// `peer == NodeId::INVALID` marks the slot idle; releasing the slot resets
/// every field to its sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageSession {
    peer: NodeId,
    client_endpoint: u8,
    server_endpoint: u8,
    image: ImageIdentity,
    base_offset: u32,
    next_offset: u32,
    page_size: u32,
    max_data_size: u8,
    spacing: Duration,
    bytes_sent: u32,
}

impl PageSession {
    pub(crate) fn idle() -> Self {
        Self {
            peer: NodeId::INVALID,
            client_endpoint: 0,
            server_endpoint: 0,
            image: ImageIdentity::INVALID,
            base_offset: 0,
            next_offset: 0,
            page_size: 0,
            max_data_size: 0,
            spacing: Duration::ZERO,
            bytes_sent: 0,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.peer != NodeId::INVALID
    }

    pub(crate) fn peer(&self) -> NodeId {
        self.peer
    }

    fn reset(&mut self) {
        *self = Self::idle();
    }
}

/// Try to enter a page session. Sends nothing itself; the caller answers
/// non-success statuses, and a success is answered by the ticks.
pub(crate) fn start(
    server: &mut OtaServer,
    req: &PageRequest,
    ctx: &mut ServerContext<'_>,
) -> Status {
    if !server.policy.page_requests_supported() {
        log::debug!("[PageSession] page requests disabled, refusing {}", req.source);
        server.metrics.unsupported_commands += 1;
        return Status::UnsupCommand;
    }
    if server.page.is_active() {
        // At most one page session exists; concurrent requests are rejected,
        // never queued, and the live session is left untouched
        log::warn!(
            "[PageSession] slot held by {}, rejecting page request from {}",
            server.page.peer,
            req.source
        );
        return Status::Failure;
    }

    let total = ctx.store.total_size(req.image);
    if req.offset > total {
        log::warn!(
            "[PageSession] offset {} beyond image size {total}, rejecting {}",
            req.offset,
            req.source
        );
        return Status::InvalidValue;
    }
    if u16::from(req.max_data_size) > req.page_size {
        log::warn!(
            "[PageSession] block budget {} exceeds page size {}, rejecting {}",
            req.max_data_size,
            req.page_size,
            req.source
        );
        return Status::InvalidValue;
    }

    server.page = PageSession {
        peer: req.source,
        client_endpoint: req.client_endpoint,
        server_endpoint: server.config.server_endpoint,
        image: req.image,
        base_offset: req.offset,
        next_offset: req.offset,
        page_size: u32::from(req.page_size),
        max_data_size: req.max_data_size,
        spacing: Duration::from_millis(u64::from(req.response_spacing_ms))
            .max(server.config.min_page_response_spacing),
        bytes_sent: 0,
    };
    server.metrics.page_sessions_started += 1;
    log::info!(
        "[PageSession] {} bytes of {} from offset {} for {} (endpoint {} -> {}), spacing {:?}",
        req.page_size,
        req.image,
        req.offset,
        req.source,
        server.page.server_endpoint,
        server.page.client_endpoint,
        server.page.spacing
    );

    // First block goes out on the next loop turn
    ctx.timer.schedule(Duration::ZERO);
    Status::Success
}

/// One timer tick: synthesize and serve one block, then re-arm or finish.
pub(crate) fn tick(server: &mut OtaServer, now: Instant, ctx: &mut ServerContext<'_>) {
    if !server.page.is_active() {
        log::debug!("[PageSession] tick with no active session, ignoring");
        return;
    }
    let session = server.page;

    // The image can vanish from storage mid-session
    let total = ctx.store.total_size(session.image);
    if total == 0 {
        log::warn!("[PageSession] {} no longer in store", session.image);
        abort(server, ctx);
        return;
    }

    let file_remaining = total.saturating_sub(session.next_offset);
    let page_remaining = session.page_size - session.bytes_sent;
    let want = page_remaining
        .min(file_remaining)
        .min(u32::from(session.max_data_size));
    if want == 0 {
        finish(server, total);
        return;
    }

    let req = BlockRequest {
        source: session.peer,
        client_endpoint: session.client_endpoint,
        image: session.image,
        offset: session.next_offset,
        max_data_size: want as u8,
        requester_eui: None,
        min_block_period_ms: None,
        page_origin: true,
    };

    match block::handle(server, now, &req, ctx) {
        BlockOutcome::Sent(sent) => {
            server.page.bytes_sent += sent as u32;
            server.page.next_offset += sent as u32;
            if server.page.bytes_sent >= server.page.page_size
                || server.page.next_offset >= total
            {
                finish(server, total);
            } else {
                ctx.timer.schedule(server.page.spacing);
            }
        }
        BlockOutcome::Wait(delay) => {
            // Backpressure, not a stall: hold position and retry later
            ctx.timer.schedule(delay.max(session.spacing));
        }
        BlockOutcome::Failed(status) => {
            // Most failure paths already released the slot through the
            // engine's abort hook; a zero-byte tick that did not is a stall
            if server.page.is_active() {
                log::warn!(
                    "[PageSession] stalled with {status} after {} of {} bytes, releasing slot",
                    server.page.bytes_sent,
                    server.page.page_size
                );
                server.page.reset();
                server.metrics.page_sessions_aborted += 1;
            }
        }
    }
}

/// Release the slot after an engine-signaled failure or an external abort.
/// Idempotent: a call with no live session does nothing.
pub(crate) fn abort(server: &mut OtaServer, ctx: &mut ServerContext<'_>) {
    if !server.page.is_active() {
        return;
    }
    ctx.timer.cancel();
    log::warn!(
        "[PageSession] aborted for {} after {} of {} bytes",
        server.page.peer,
        server.page.bytes_sent,
        server.page.page_size
    );
    server.metrics.page_sessions_aborted += 1;
    server.page.reset();
}

fn finish(server: &mut OtaServer, total: u32) {
    log::info!(
        "[PageSession] done for {}: {} bytes sent from offset {} (image size {total})",
        server.page.peer,
        server.page.bytes_sent,
        server.page.base_offset
    );
    server.metrics.page_sessions_completed += 1;
    server.page.reset();
}
