// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware image identity and header metadata.
//!
//! An upgrade image is identified by the (manufacturer, image type, firmware
//! version) triple. The triple is a plain `Copy` value; equality is field-wise.
//! A distinguished all-0xFF sentinel means "no such image" and is what lookup
//! operations return instead of an `Option` on the wire path.

use std::fmt;

/// Short network address of a peer node.
///
/// The all-ones value is reserved and doubles as the "no peer" sentinel used
/// to mark an idle page-session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl NodeId {
    /// Reserved address, never assigned to a real node.
    pub const INVALID: Self = Self(0xFFFF);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// 64-bit extended unique identifier of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eui64(pub [u8; 8]);

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

/// Identity of one upgrade image: manufacturer, image type, firmware version.
///
/// Field-wise equality. Two identities with the same manufacturer and image
/// type but different versions describe two revisions of the same product
/// firmware (see [`ImageIdentity::same_product`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageIdentity {
    /// Manufacturer code.
    pub manufacturer_id: u16,
    /// Image type code (manufacturer-scoped).
    pub image_type_id: u16,
    /// Firmware file version.
    pub firmware_version: u32,
}

impl ImageIdentity {
    /// Sentinel meaning "no such image". All fields at their max value.
    pub const INVALID: Self = Self {
        manufacturer_id: 0xFFFF,
        image_type_id: 0xFFFF,
        firmware_version: 0xFFFF_FFFF,
    };

    /// Construct an identity from its three wire fields.
    pub const fn new(manufacturer_id: u16, image_type_id: u16, firmware_version: u32) -> Self {
        Self {
            manufacturer_id,
            image_type_id,
            firmware_version,
        }
    }

    /// True unless this is the [`INVALID`](Self::INVALID) sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Same manufacturer and image type, version ignored.
    pub fn same_product(&self, other: &Self) -> bool {
        self.manufacturer_id == other.manufacturer_id && self.image_type_id == other.image_type_id
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mfg 0x{:04X} type 0x{:04X} ver 0x{:08X}",
            self.manufacturer_id, self.image_type_id, self.firmware_version
        )
    }
}

/// Inclusive hardware version range an image is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareVersionRange {
    /// Minimum supported hardware version.
    pub min: u16,
    /// Maximum supported hardware version.
    pub max: u16,
}

impl HardwareVersionRange {
    /// True when `version` falls inside `[min, max]`.
    pub fn contains(&self, version: u16) -> bool {
        (self.min..=self.max).contains(&version)
    }
}

/// Metadata read out of an image file header.
///
/// Owned by the store; queries hand out a copy. Optional header fields are
/// modeled as `Option<T>` per field, mirroring the optional-field bits of the
/// on-disk header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Header format version.
    pub header_version: u16,
    /// Declared total image size in bytes, header included.
    pub image_size: u32,
    /// Hardware versions the image may be installed on, when declared.
    pub hardware_range: Option<HardwareVersionRange>,
    /// Security credential version, when declared.
    pub security_credentials: Option<u8>,
    /// Single device the image is destined for, when declared.
    pub upgrade_destination: Option<Eui64>,
}

impl ImageHeader {
    /// Minimal header carrying only a format version and a total size.
    pub fn with_size(image_size: u32) -> Self {
        Self {
            header_version: 0x0100,
            image_size,
            hardware_range: None,
            security_credentials: None,
            upgrade_destination: None,
        }
    }
}
