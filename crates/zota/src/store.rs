// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Image storage capability.
//!
//! The engine never touches flash or a filesystem. It reads images through
//! the [`ImageStore`] trait: total size, header metadata, random-offset
//! reads, and a search by manufacturer/type for the query-next-image path.
//!
//! [`MemoryImageStore`] is the bundled RAM-backed implementation. Gateways
//! typically load image files through an out-of-band channel and serve them
//! from memory; it is also what the test suites and benches run against.

use crate::image::{ImageHeader, ImageIdentity};

/// Read-only storage the upgrade server depends on.
///
/// Implementations must be cheap to query: the engine re-checks
/// [`total_size`](Self::total_size) at the top of every page tick to detect
/// an image vanishing mid-transfer.
pub trait ImageStore {
    /// Total size in bytes of `image`, or 0 when the store does not hold it.
    fn total_size(&self, image: ImageIdentity) -> u32;

    /// Header metadata of `image`, when the store holds it.
    fn header(&self, image: ImageIdentity) -> Option<ImageHeader>;

    /// Up to `max_len` bytes of `image` starting at `offset`.
    ///
    /// Returns `None` when the store does not hold the image. A short or
    /// empty read past the end of the file is not an error.
    fn read_at(&self, image: ImageIdentity, offset: u32, max_len: usize) -> Option<Vec<u8>>;

    /// Best upgrade candidate for the given manufacturer and image type.
    ///
    /// When `hardware_version` is given, images declaring a hardware range
    /// that excludes it are skipped. Returns [`ImageIdentity::INVALID`] when
    /// nothing matches.
    fn search_by_type(
        &self,
        manufacturer_id: u16,
        image_type_id: u16,
        hardware_version: Option<u16>,
    ) -> ImageIdentity;
}

struct StoredImage {
    identity: ImageIdentity,
    header: ImageHeader,
    data: Vec<u8>,
}

/// RAM-backed [`ImageStore`].
///
/// Holds whole image files in memory. When several images match a search,
/// the highest eligible firmware version wins.
#[derive(Default)]
pub struct MemoryImageStore {
    images: Vec<StoredImage>,
}

impl MemoryImageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an image with a minimal header derived from `data`.
    ///
    /// Replaces any image already stored under the same identity.
    pub fn insert(&mut self, identity: ImageIdentity, data: Vec<u8>) {
        let header = ImageHeader::with_size(data.len() as u32);
        self.insert_with_header(identity, header, data);
    }

    /// Insert an image with an explicit header.
    pub fn insert_with_header(
        &mut self,
        identity: ImageIdentity,
        header: ImageHeader,
        data: Vec<u8>,
    ) {
        self.remove(identity);
        self.images.push(StoredImage {
            identity,
            header,
            data,
        });
    }

    /// Drop the image stored under `identity`, if any.
    pub fn remove(&mut self, identity: ImageIdentity) {
        self.images.retain(|img| img.identity != identity);
    }

    /// Number of images held.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True when the store holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn find(&self, identity: ImageIdentity) -> Option<&StoredImage> {
        self.images.iter().find(|img| img.identity == identity)
    }
}

impl ImageStore for MemoryImageStore {
    fn total_size(&self, image: ImageIdentity) -> u32 {
        self.find(image).map_or(0, |img| img.data.len() as u32)
    }

    fn header(&self, image: ImageIdentity) -> Option<ImageHeader> {
        self.find(image).map(|img| img.header)
    }

    fn read_at(&self, image: ImageIdentity, offset: u32, max_len: usize) -> Option<Vec<u8>> {
        let img = self.find(image)?;
        let start = (offset as usize).min(img.data.len());
        let end = start.saturating_add(max_len).min(img.data.len());
        Some(img.data[start..end].to_vec())
    }

    fn search_by_type(
        &self,
        manufacturer_id: u16,
        image_type_id: u16,
        hardware_version: Option<u16>,
    ) -> ImageIdentity {
        self.images
            .iter()
            .filter(|img| {
                img.identity.manufacturer_id == manufacturer_id
                    && img.identity.image_type_id == image_type_id
            })
            .filter(|img| match (hardware_version, img.header.hardware_range) {
                // Disqualify only when both sides declare hardware info
                (Some(hw), Some(range)) => range.contains(hw),
                _ => true,
            })
            .max_by_key(|img| img.identity.firmware_version)
            .map_or(ImageIdentity::INVALID, |img| img.identity)
    }
}
