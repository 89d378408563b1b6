// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Response payload encoders.
//!
//! Builds the little-endian byte payloads handed to the transport. Request
//! decoding lives with the bus layer, not here; the server only ever encodes.
//! The transaction sequence byte is written as zero and rewritten by the bus
//! layer when it correlates responses to requests.

use crate::image::ImageIdentity;
use crate::messages::{
    BlockResponse, CommandId, DefaultResponse, ImageNotify, QueryNextImageResponse,
    UpgradeEndResponse,
};
use crate::status::Status;

/// Frame control of a cluster-specific, server-to-client command.
const FRAME_CONTROL_CLUSTER: u8 = 0x19;

/// Frame control of a general, server-to-client command.
const FRAME_CONTROL_GENERAL: u8 = 0x18;

/// General-frame command id of Default Response.
const DEFAULT_RESPONSE_COMMAND: u8 = 0x0B;

/// Image-notify payload type: query jitter plus the full image identity.
const IMAGE_NOTIFY_PAYLOAD_FULL: u8 = 0x03;

fn frame(command: CommandId, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + capacity);
    buf.push(FRAME_CONTROL_CLUSTER);
    buf.push(0); // transaction sequence, owned by the bus layer
    buf.push(command as u8);
    buf
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_identity(buf: &mut Vec<u8>, image: ImageIdentity) {
    push_u16(buf, image.manufacturer_id);
    push_u16(buf, image.image_type_id);
    push_u32(buf, image.firmware_version);
}

/// Encode a query-next-image response.
///
/// The image fields are only present on SUCCESS, per the cluster spec.
pub fn build_query_next_image_response(resp: &QueryNextImageResponse) -> Vec<u8> {
    let mut buf = frame(CommandId::QueryNextImageResponse, 13);
    buf.push(resp.status.wire_value());
    if resp.status.is_success() {
        push_identity(&mut buf, resp.image);
        push_u32(&mut buf, resp.image_size);
    }
    buf
}

/// Encode a block response (data, backpressure, or abort).
pub fn build_block_response(resp: &BlockResponse) -> Vec<u8> {
    match resp {
        BlockResponse::Success {
            image,
            offset,
            data,
        } => {
            let mut buf = frame(CommandId::ImageBlockResponse, 14 + data.len());
            buf.push(Status::Success.wire_value());
            push_identity(&mut buf, *image);
            push_u32(&mut buf, *offset);
            buf.push(data.len() as u8);
            buf.extend_from_slice(data);
            buf
        }
        BlockResponse::WaitForData {
            current_time,
            request_time,
            min_block_period_ms,
        } => {
            let mut buf = frame(CommandId::ImageBlockResponse, 11);
            buf.push(Status::WaitForData.wire_value());
            push_u32(&mut buf, *current_time);
            push_u32(&mut buf, *request_time);
            if let Some(period) = min_block_period_ms {
                push_u16(&mut buf, *period);
            }
            buf
        }
        BlockResponse::Abort => {
            let mut buf = frame(CommandId::ImageBlockResponse, 1);
            buf.push(Status::Abort.wire_value());
            buf
        }
    }
}

/// Encode an upgrade-end response.
pub fn build_upgrade_end_response(resp: &UpgradeEndResponse) -> Vec<u8> {
    let mut buf = frame(CommandId::UpgradeEndResponse, 16);
    push_identity(&mut buf, resp.image);
    push_u32(&mut buf, resp.current_time);
    push_u32(&mut buf, resp.upgrade_time);
    buf
}

/// Encode an image-notify broadcast advertisement.
pub fn build_image_notify(notify: &ImageNotify) -> Vec<u8> {
    let mut buf = frame(CommandId::ImageNotify, 10);
    buf.push(IMAGE_NOTIFY_PAYLOAD_FULL);
    buf.push(notify.query_jitter);
    push_identity(&mut buf, notify.image);
    buf
}

/// Encode a default response acknowledging `resp.command` with a status.
pub fn build_default_response(resp: &DefaultResponse) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(FRAME_CONTROL_GENERAL);
    buf.push(0); // transaction sequence, owned by the bus layer
    buf.push(DEFAULT_RESPONSE_COMMAND);
    buf.push(resp.command as u8);
    buf.push(resp.status.wire_value());
    buf
}
