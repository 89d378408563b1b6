// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Block transfer engine.
//!
//! Drives one image-block request to completion: sizes the data field
//! against the peer's link budget and the server ceiling, runs the policy
//! gate, reads from the store, sends the response and fires the lifecycle
//! notifications. Both client-issued block requests and the requests a page
//! session synthesizes funnel through here.

use std::time::{Duration, Instant};

use crate::config::BLOCK_RESPONSE_OVERHEAD;
use crate::messages::{BlockRequest, BlockResponse, CommandId, DefaultResponse};
use crate::page;
use crate::policy::BlockDecision;
use crate::server::{OtaServer, ServerContext};
use crate::status::Status;
use crate::wire;

/// What one block request amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockOutcome {
    /// Data left the server; carries the data-field length.
    Sent(usize),
    /// Backpressure response sent; the client retries after the delay.
    Wait(Duration),
    /// Nothing sent; carries the status the request resolved to.
    Failed(Status),
}

/// Seconds until retry, rounded up so sub-second waits are not lost.
fn retry_secs(delay: Duration) -> u32 {
    u32::try_from(delay.as_millis().div_ceil(1000)).unwrap_or(u32::MAX)
}

pub(crate) fn handle(
    server: &mut OtaServer,
    now: Instant,
    req: &BlockRequest,
    ctx: &mut ServerContext<'_>,
) -> BlockOutcome {
    let budget = ctx.link.max_payload_for(req.source);
    let ceiling = budget
        .saturating_sub(BLOCK_RESPONSE_OVERHEAD)
        .min(usize::from(server.config.max_block_data_size));
    if ceiling == 0 {
        log::warn!(
            "[BlockTransfer] link budget of {budget} bytes for {} leaves no room for data",
            req.source
        );
    }

    match server.policy.decide_block_request(req, now) {
        BlockDecision::Wait {
            delay,
            min_block_period_ms,
        } => {
            let payload = wire::build_block_response(&BlockResponse::WaitForData {
                current_time: 0,
                request_time: retry_secs(delay),
                min_block_period_ms,
            });
            if let Err(err) = ctx.link.send_unicast(req.source, req.client_endpoint, &payload) {
                log::warn!("[BlockTransfer] WAIT_FOR_DATA send to {} failed: {err}", req.source);
            }
            server.metrics.waits_issued += 1;
            log::debug!(
                "[BlockTransfer] backpressure for {}: retry in {delay:?}",
                req.source
            );
            BlockOutcome::Wait(delay)
        }
        BlockDecision::Abort => {
            let payload = wire::build_block_response(&BlockResponse::Abort);
            if let Err(err) = ctx.link.send_unicast(req.source, req.client_endpoint, &payload) {
                log::warn!("[BlockTransfer] ABORT send to {} failed: {err}", req.source);
            }
            log::info!("[BlockTransfer] policy aborted transfer for {}", req.source);
            BlockOutcome::Failed(Status::Abort)
        }
        BlockDecision::Proceed => {
            serve_block(server, req, ceiling, ctx)
        }
    }
}

fn serve_block(
    server: &mut OtaServer,
    req: &BlockRequest,
    ceiling: usize,
    ctx: &mut ServerContext<'_>,
) -> BlockOutcome {
    let size = usize::from(req.max_data_size).min(ceiling);

    let data = match ctx.store.read_at(req.image, req.offset, size) {
        Some(data) if !data.is_empty() => data,
        _ => {
            log::warn!(
                "[BlockTransfer] no data for {} at offset {} ({} bytes wanted)",
                req.image,
                req.offset,
                size
            );
            let payload = wire::build_default_response(&DefaultResponse {
                command: CommandId::ImageBlockRequest,
                status: Status::NoImageAvailable,
            });
            if let Err(err) = ctx.link.send_unicast(req.source, req.client_endpoint, &payload) {
                log::warn!("[BlockTransfer] error send to {} failed: {err}", req.source);
            }
            ctx.events
                .on_update_complete(req.image, req.source, Status::NoImageAvailable);
            // A failed block must not leave a page session waiting on a tick
            // that will never advance it
            if req.page_origin {
                page::abort(server, ctx);
            }
            return BlockOutcome::Failed(Status::NoImageAvailable);
        }
    };

    let sent_len = data.len();
    let payload = wire::build_block_response(&BlockResponse::Success {
        image: req.image,
        offset: req.offset,
        data,
    });
    if let Err(err) = ctx.link.send_unicast(req.source, req.client_endpoint, &payload) {
        // Send failures never unwind the state machine; an affected page
        // session stalls and releases its slot on this same tick
        log::warn!("[BlockTransfer] block send to {} failed: {err}", req.source);
        return BlockOutcome::Failed(Status::Failure);
    }

    if req.offset == 0 && server.last_served != Some(req.image) {
        log::info!(
            "[BlockTransfer] upgrade started: {} for {}, block budget {size} bytes",
            req.image,
            req.source
        );
        ctx.events.on_update_started(req.image, size as u8, req.offset);
    }
    server.last_served = Some(req.image);

    ctx.events.on_block_sent(sent_len, req.image);
    server.metrics.blocks_sent += 1;
    server.metrics.bytes_sent += sent_len as u64;
    log::debug!(
        "[BlockTransfer] sent {sent_len} bytes of {} at offset {} to {}",
        req.image,
        req.offset,
        req.source
    );
    BlockOutcome::Sent(sent_len)
}
