// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic

//! Page session integration tests.
//!
//! Drives the page state machine tick by tick through the `ManualScheduler`:
//! exhaustion arithmetic, the single-slot invariant, request validation,
//! abort propagation out of the block engine, stall recovery, and the
//! response spacing floor.

use std::time::{Duration, Instant};

use zota::config::{BLOCK_RESPONSE_OVERHEAD, MIN_PAGE_RESPONSE_SPACING};
use zota::{
    BlockRequestPolicy, ImageHeader, ImageIdentity, ImageStore, ManualScheduler,
    MemoryImageStore, NodeId, OtaEvents, OtaRequest, OtaServer, OtaServerConfig, PageRequest,
    SendError, ServerContext, Status, TransportLink,
};

const PEER: NodeId = NodeId(0x1234);
const OTHER_PEER: NodeId = NodeId(0x5678);
const CLIENT_ENDPOINT: u8 = 8;

struct RecordingLink {
    budget: usize,
    sent: Vec<(NodeId, u8, Vec<u8>)>,
    fail_unicast: bool,
}

impl RecordingLink {
    fn with_budget(budget: usize) -> Self {
        Self {
            budget,
            sent: Vec::new(),
            fail_unicast: false,
        }
    }

    /// Data-field lengths of the block responses sent so far.
    fn block_data_lengths(&self) -> Vec<usize> {
        self.sent
            .iter()
            .map(|(_, _, payload)| payload.len() - BLOCK_RESPONSE_OVERHEAD)
            .collect()
    }
}

impl TransportLink for RecordingLink {
    fn max_payload_for(&self, _peer: NodeId) -> usize {
        self.budget
    }

    fn send_unicast(
        &mut self,
        peer: NodeId,
        endpoint: u8,
        payload: &[u8],
    ) -> Result<(), SendError> {
        if self.fail_unicast {
            return Err(SendError::LinkFailure);
        }
        self.sent.push((peer, endpoint, payload.to_vec()));
        Ok(())
    }

    fn send_broadcast(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let _ = payload;
        Ok(())
    }
}

#[derive(Default)]
struct CollectingEvents {
    completed: Vec<(ImageIdentity, NodeId, Status)>,
    blocks: Vec<usize>,
}

impl OtaEvents for CollectingEvents {
    fn on_block_sent(&mut self, actual_length: usize, _image: ImageIdentity) {
        self.blocks.push(actual_length);
    }

    fn on_update_complete(&mut self, image: ImageIdentity, peer: NodeId, status: Status) {
        self.completed.push((image, peer, status));
    }
}

/// Helper: store reporting a size but serving no bytes, to force the block
/// engine's failure path while the page validation passes.
struct HollowStore {
    size: u32,
}

impl ImageStore for HollowStore {
    fn total_size(&self, _image: ImageIdentity) -> u32 {
        self.size
    }

    fn header(&self, _image: ImageIdentity) -> Option<ImageHeader> {
        Some(ImageHeader::with_size(self.size))
    }

    fn read_at(&self, _image: ImageIdentity, _offset: u32, _max_len: usize) -> Option<Vec<u8>> {
        Some(Vec::new())
    }

    fn search_by_type(&self, _m: u16, _t: u16, _hw: Option<u16>) -> ImageIdentity {
        ImageIdentity::INVALID
    }
}

fn image() -> ImageIdentity {
    ImageIdentity::new(0x1002, 0x0001, 5)
}

fn page_request(offset: u32, max_data_size: u8, page_size: u16) -> PageRequest {
    PageRequest {
        source: PEER,
        client_endpoint: CLIENT_ENDPOINT,
        image: image(),
        offset,
        max_data_size,
        page_size,
        response_spacing_ms: 50,
        requester_eui: None,
    }
}

/// Helper: fire page ticks until the timer goes quiet.
fn drain_ticks(
    server: &mut OtaServer,
    store: &dyn ImageStore,
    link: &mut RecordingLink,
    events: &mut CollectingEvents,
    timer: &mut ManualScheduler,
) -> usize {
    let mut ticks = 0;
    while timer.take().is_some() {
        assert!(ticks < 64, "runaway page session");
        let mut ctx = ServerContext {
            store,
            link: &mut *link,
            events: &mut *events,
            timer: &mut *timer,
        };
        server.on_page_timer(Instant::now(), &mut ctx);
        ticks += 1;
    }
    ticks
}

// ---------------------------------------------------------------------------
// Test: exhaustion arithmetic
// ---------------------------------------------------------------------------

#[test]
fn test_page_exhaustion_block_sizes() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    let status = server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );
    assert_eq!(status, Status::Success);
    assert!(server.page_session_active());

    let ticks = drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);

    // 50-byte page as 20 + 20 + 10, then the slot is released
    assert_eq!(ticks, 3);
    assert_eq!(link.block_data_lengths(), vec![20, 20, 10]);
    assert_eq!(events.blocks, vec![20, 20, 10]);
    assert!(!server.page_session_active());
    assert_eq!(timer.armed(), None, "no further ticks after exhaustion");
    assert_eq!(server.metrics().page_sessions_completed, 1);
}

#[test]
fn test_page_stops_at_end_of_file() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 30]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    // Page asks for more than the file holds past the offset
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(10, 16, 64)),
        &mut ctx,
    );
    drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);

    assert_eq!(link.block_data_lengths(), vec![16, 4]);
    assert!(!server.page_session_active());
}

// ---------------------------------------------------------------------------
// Test: single-slot invariant
// ---------------------------------------------------------------------------

#[test]
fn test_second_page_request_rejected_while_active() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    assert_eq!(
        server.handle_request(
            Instant::now(),
            &OtaRequest::ImagePage(page_request(0, 20, 50)),
            &mut ctx,
        ),
        Status::Success
    );

    // Second request, different peer: rejected, slot untouched
    let mut contender = page_request(0, 20, 50);
    contender.source = OTHER_PEER;
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    assert_eq!(
        server.handle_request(Instant::now(), &OtaRequest::ImagePage(contender), &mut ctx),
        Status::Failure
    );
    assert!(server.page_session_active());
    assert_eq!(server.metrics().page_sessions_started, 1);

    // The original session is undisturbed and runs to completion
    drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);
    let to_peer: Vec<usize> = link
        .sent
        .iter()
        .filter(|(peer, _, _)| *peer == PEER)
        .map(|(_, _, payload)| payload.len() - BLOCK_RESPONSE_OVERHEAD)
        .collect();
    assert_eq!(to_peer, vec![20, 20, 10]);
}

// ---------------------------------------------------------------------------
// Test: request validation
// ---------------------------------------------------------------------------

#[test]
fn test_offset_beyond_file_rejected() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    let status = server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(150, 20, 50)),
        &mut ctx,
    );

    assert_eq!(status, Status::InvalidValue);
    assert!(!server.page_session_active(), "never entered Active");
    assert_eq!(timer.armed(), None);
    // Rejection is answered with a default response
    let (_, _, payload) = link.sent.last().expect("rejection response");
    assert_eq!(payload[4], Status::InvalidValue.wire_value());
}

#[test]
fn test_block_budget_larger_than_page_rejected() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    let status = server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 40, 30)),
        &mut ctx,
    );
    assert_eq!(status, Status::InvalidValue);
    assert!(!server.page_session_active());
}

#[test]
fn test_page_requests_can_be_disabled() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());
    server.policy_mut().set_page_requests_supported(false);

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    let status = server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );
    assert_eq!(status, Status::UnsupCommand);
    assert_eq!(server.metrics().unsupported_commands, 1);
}

// ---------------------------------------------------------------------------
// Test: abort propagation and stall recovery
// ---------------------------------------------------------------------------

#[test]
fn test_block_failure_releases_slot_for_next_session() {
    // Size checks pass, reads return nothing: the engine fails the first
    // tick and must fire the page abort hook
    let store = HollowStore { size: 100 };
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    assert_eq!(
        server.handle_request(
            Instant::now(),
            &OtaRequest::ImagePage(page_request(0, 20, 50)),
            &mut ctx,
        ),
        Status::Success
    );
    drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);

    assert!(!server.page_session_active(), "abort hook released the slot");
    assert_eq!(server.metrics().page_sessions_aborted, 1);
    assert_eq!(
        events.completed,
        vec![(image(), PEER, Status::NoImageAvailable)]
    );

    // The slot is immediately reusable
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    assert_eq!(
        server.handle_request(
            Instant::now(),
            &OtaRequest::ImagePage(page_request(0, 20, 50)),
            &mut ctx,
        ),
        Status::Success
    );
}

#[test]
fn test_image_vanishing_mid_session_aborts() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );

    // First tick succeeds
    timer.take();
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.on_page_timer(Instant::now(), &mut ctx);
    assert_eq!(link.block_data_lengths(), vec![20]);

    // Image disappears between ticks; the size re-check catches it
    store.remove(image());
    timer.take();
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.on_page_timer(Instant::now(), &mut ctx);

    assert!(!server.page_session_active());
    assert_eq!(server.metrics().page_sessions_aborted, 1);
    assert_eq!(timer.armed(), None);
}

#[test]
fn test_send_failure_stalls_and_releases_slot() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );

    link.fail_unicast = true;
    drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);

    assert!(!server.page_session_active(), "stalled session released");
    assert_eq!(server.metrics().page_sessions_aborted, 1);
}

#[test]
fn test_external_abort_releases_slot() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );
    assert!(server.page_session_active());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.abort_page_session(&mut ctx);

    assert!(!server.page_session_active());
    assert_eq!(timer.armed(), None, "pending tick cancelled");
    // Idempotent
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.abort_page_session(&mut ctx);
    assert_eq!(server.metrics().page_sessions_aborted, 1);
}

// ---------------------------------------------------------------------------
// Test: pacing
// ---------------------------------------------------------------------------

#[test]
fn test_response_spacing_floor() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    // Client asks for zero spacing; the floor protects the link
    let mut req = page_request(0, 20, 50);
    req.response_spacing_ms = 0;
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(Instant::now(), &OtaRequest::ImagePage(req), &mut ctx);

    // First tick fires immediately, then re-arms at the floor
    assert_eq!(timer.take(), Some(Duration::ZERO));
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.on_page_timer(Instant::now(), &mut ctx);
    assert_eq!(timer.armed(), Some(MIN_PAGE_RESPONSE_SPACING));
}

#[test]
fn test_client_spacing_respected_when_above_floor() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );

    timer.take();
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.on_page_timer(Instant::now(), &mut ctx);
    assert_eq!(timer.armed(), Some(Duration::from_millis(50)));
}

#[test]
fn test_backpressure_during_page_rearms_without_progress() {
    let mut store = MemoryImageStore::new();
    store.insert(image(), vec![0xA5; 100]);
    let mut link = RecordingLink::with_budget(1000);
    let mut events = CollectingEvents::default();
    let mut timer = ManualScheduler::new();
    let mut server = OtaServer::new(OtaServerConfig::default());

    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.handle_request(
        Instant::now(),
        &OtaRequest::ImagePage(page_request(0, 20, 50)),
        &mut ctx,
    );

    // Rate policy pushes the first tick back
    server
        .policy_mut()
        .set_block_request_policy(BlockRequestPolicy::Delay(Duration::from_secs(2)));
    timer.take();
    let mut ctx = ServerContext {
        store: &store,
        link: &mut link,
        events: &mut events,
        timer: &mut timer,
    };
    server.on_page_timer(Instant::now(), &mut ctx);

    assert!(server.page_session_active(), "backpressure is not a stall");
    assert_eq!(timer.armed(), Some(Duration::from_secs(2)));
    assert_eq!(server.metrics().waits_issued, 1);

    // Policy clears; the session resumes and completes
    server
        .policy_mut()
        .set_block_request_policy(BlockRequestPolicy::Proceed);
    drain_ticks(&mut server, &store, &mut link, &mut events, &mut timer);
    assert!(!server.page_session_active());
    assert_eq!(server.metrics().page_sessions_completed, 1);

    // The WAIT_FOR_DATA frame went out ahead of the data frames
    assert_eq!(
        link.sent[0].2[3],
        Status::WaitForData.wire_value(),
        "first frame is backpressure"
    );
}
