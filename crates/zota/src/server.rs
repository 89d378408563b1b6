// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upgrade server: request dispatch and upgrade-end negotiation.
//!
//! [`OtaServer`] is the per-instance state bundle (configuration, policy,
//! the page slot, the last-served tracker and metrics). All I/O and timing
//! reach it through the capabilities bundled in [`ServerContext`], so any
//! number of independent servers can run in one process and every code path
//! is drivable from a test.

use std::time::{Duration, Instant};

use crate::block::{self, BlockOutcome};
use crate::config::{OtaServerConfig, WAIT_INDEFINITELY};
use crate::events::OtaEvents;
use crate::image::{ImageIdentity, NodeId};
use crate::messages::{
    BlockRequest, CommandId, DefaultResponse, ImageNotify, OtaRequest, QueryNextImageRequest,
    QueryNextImageResponse, UpgradeEndRequest, UpgradeEndResponse,
};
use crate::metrics::OtaServerMetrics;
use crate::page::{self, PageSession};
use crate::policy::PolicyState;
use crate::status::Status;
use crate::store::ImageStore;
use crate::timer::TickScheduler;
use crate::transport::{SendError, TransportLink};
use crate::wire;

/// Capabilities a server call runs against.
///
/// Borrowed per call rather than owned, so embedders keep ownership of their
/// store, link, observer and timer facilities.
pub struct ServerContext<'a> {
    /// Image storage.
    pub store: &'a dyn ImageStore,
    /// Outgoing link.
    pub link: &'a mut dyn TransportLink,
    /// Lifecycle observer.
    pub events: &'a mut dyn OtaEvents,
    /// Page tick scheduling.
    pub timer: &'a mut dyn TickScheduler,
}

/// One upgrade-server instance.
pub struct OtaServer {
    pub(crate) config: OtaServerConfig,
    pub(crate) policy: PolicyState,
    pub(crate) page: PageSession,
    /// Identity served by the previous block request; gates the
    /// update-started notification and its log line.
    pub(crate) last_served: Option<ImageIdentity>,
    pub(crate) metrics: OtaServerMetrics,
}

impl Default for OtaServer {
    fn default() -> Self {
        Self::new(OtaServerConfig::default())
    }
}

impl OtaServer {
    /// Server with the given configuration and default policies.
    pub fn new(config: OtaServerConfig) -> Self {
        Self {
            config,
            policy: PolicyState::new(),
            page: PageSession::idle(),
            last_served: None,
            metrics: OtaServerMetrics::new(),
        }
    }

    /// The instance configuration.
    pub fn config(&self) -> &OtaServerConfig {
        &self.config
    }

    /// Read access to the policy state.
    pub fn policy(&self) -> &PolicyState {
        &self.policy
    }

    /// Mutable access to the policy state (the only way to change it).
    pub fn policy_mut(&mut self) -> &mut PolicyState {
        &mut self.policy
    }

    /// Current metrics.
    pub fn metrics(&self) -> &OtaServerMetrics {
        &self.metrics
    }

    /// True while a page session holds the slot.
    pub fn page_session_active(&self) -> bool {
        self.page.is_active()
    }

    /// Dispatch one decoded request.
    ///
    /// Responses go out through `ctx.link` as a side effect; the returned
    /// status is what the request resolved to, for the caller's logging.
    pub fn handle_request(
        &mut self,
        now: Instant,
        request: &OtaRequest,
        ctx: &mut ServerContext<'_>,
    ) -> Status {
        match request {
            OtaRequest::QueryNextImage(query) => self.handle_query_next_image(query, ctx),
            OtaRequest::ImageBlock(req) => match block::handle(self, now, req, ctx) {
                BlockOutcome::Sent(_) => Status::Success,
                BlockOutcome::Wait(_) => Status::WaitForData,
                BlockOutcome::Failed(status) => status,
            },
            OtaRequest::ImagePage(req) => {
                let status = page::start(self, req, ctx);
                if !status.is_success() {
                    self.send_default_response(
                        ctx,
                        req.source,
                        req.client_endpoint,
                        CommandId::ImagePageRequest,
                        status,
                    );
                }
                status
            }
            OtaRequest::UpgradeEnd(req) => self.handle_upgrade_end(req, ctx),
            OtaRequest::QuerySpecificFile(req) => {
                log::debug!(
                    "[OtaServer] query-specific-file from {} unsupported",
                    req.source
                );
                self.metrics.unsupported_commands += 1;
                self.send_default_response(
                    ctx,
                    req.source,
                    req.client_endpoint,
                    CommandId::QuerySpecificFileRequest,
                    Status::UnsupCommand,
                );
                Status::UnsupCommand
            }
        }
    }

    /// Serve one block request. Returns the data bytes sent, 0 on failure
    /// or backpressure.
    pub fn handle_block_request(
        &mut self,
        now: Instant,
        req: &BlockRequest,
        ctx: &mut ServerContext<'_>,
    ) -> usize {
        match block::handle(self, now, req, ctx) {
            BlockOutcome::Sent(sent) => sent,
            BlockOutcome::Wait(_) | BlockOutcome::Failed(_) => 0,
        }
    }

    /// Page-timer entry point; the embedder calls this when the deadline
    /// armed through [`TickScheduler`] fires.
    pub fn on_page_timer(&mut self, now: Instant, ctx: &mut ServerContext<'_>) {
        page::tick(self, now, ctx);
    }

    /// Release any live page session without serving it further.
    pub fn abort_page_session(&mut self, ctx: &mut ServerContext<'_>) {
        page::abort(self, ctx);
    }

    /// Broadcast an image-notify advertisement for `image`.
    ///
    /// `query_jitter` is the percentage of hearing clients expected to
    /// query back; clients draw their own lot.
    pub fn notify_new_image(
        &mut self,
        image: ImageIdentity,
        query_jitter: u8,
        ctx: &mut ServerContext<'_>,
    ) -> Result<(), SendError> {
        let payload = wire::build_image_notify(&ImageNotify {
            query_jitter,
            image,
        });
        ctx.link.send_broadcast(&payload)?;
        self.metrics.notifies_sent += 1;
        log::info!("[OtaServer] image notify broadcast for {image}, jitter {query_jitter}%");
        Ok(())
    }

    fn handle_query_next_image(
        &mut self,
        query: &QueryNextImageRequest,
        ctx: &mut ServerContext<'_>,
    ) -> Status {
        self.metrics.queries += 1;
        let next = self
            .policy
            .decide_next_image(ctx.store, query.current_image, query.hardware_version);
        log::debug!(
            "[OtaServer] query from {} running {}: {}",
            query.source,
            query.current_image,
            next.status
        );

        let payload = wire::build_query_next_image_response(&QueryNextImageResponse {
            status: next.status,
            image: next.image,
            image_size: next.total_size,
        });
        if let Err(err) = ctx
            .link
            .send_unicast(query.source, query.client_endpoint, &payload)
        {
            log::warn!("[OtaServer] query response to {} failed: {err}", query.source);
        }
        next.status
    }

    fn handle_upgrade_end(
        &mut self,
        req: &UpgradeEndRequest,
        ctx: &mut ServerContext<'_>,
    ) -> Status {
        // The peer's transfer is concluded either way; clear the trackers
        // first (idempotent)
        self.last_served = None;
        if self.page.is_active() && self.page.peer() == req.source {
            page::abort(self, ctx);
        }

        if !req.status.is_success() {
            // Informational report of a failed download; acknowledge only
            log::info!(
                "[OtaServer] client {} reported {} for {}",
                req.source,
                req.status,
                req.image
            );
            ctx.events
                .on_update_complete(req.image, req.source, req.status);
            self.send_default_response(
                ctx,
                req.source,
                req.client_endpoint,
                CommandId::UpgradeEndRequest,
                Status::Success,
            );
            return Status::Success;
        }

        let decision = self.policy.decide_upgrade_end(req.status, req.image);
        if !decision.proceed {
            log::info!(
                "[OtaServer] upgrade-end policy aborts {} for {}",
                req.image,
                req.source
            );
            self.send_default_response(
                ctx,
                req.source,
                req.client_endpoint,
                CommandId::UpgradeEndRequest,
                Status::Abort,
            );
            self.metrics.upgrades_aborted += 1;
            return Status::Abort;
        }

        let upgrade_time = upgrade_secs(decision.delay);
        let payload = wire::build_upgrade_end_response(&UpgradeEndResponse {
            image: req.image,
            current_time: 0,
            upgrade_time,
        });
        if let Err(err) = ctx
            .link
            .send_unicast(req.source, req.client_endpoint, &payload)
        {
            log::warn!(
                "[OtaServer] upgrade-end response to {} failed: {err}",
                req.source
            );
        }
        log::info!(
            "[OtaServer] upgrade of {} scheduled for {} in {upgrade_time}s",
            req.image,
            req.source
        );
        ctx.events
            .on_update_complete(req.image, req.source, Status::Success);
        self.metrics.upgrades_completed += 1;
        Status::Success
    }

    fn send_default_response(
        &mut self,
        ctx: &mut ServerContext<'_>,
        peer: NodeId,
        endpoint: u8,
        command: CommandId,
        status: Status,
    ) {
        let payload = wire::build_default_response(&DefaultResponse { command, status });
        if let Err(err) = ctx.link.send_unicast(peer, endpoint, &payload) {
            log::warn!("[OtaServer] default response to {peer} failed: {err}");
        }
    }
}

/// Wire seconds for an upgrade delay; `Duration::MAX` means "ask again".
fn upgrade_secs(delay: Duration) -> u32 {
    if delay == Duration::MAX {
        WAIT_INDEFINITELY
    } else {
        u32::try_from(delay.as_secs()).unwrap_or(WAIT_INDEFINITELY)
    }
}
