// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upgrade policy decisions.
//!
//! Pure decision logic: which image a querying client should be offered,
//! whether a block request proceeds or is pushed back, and how an
//! upgrade-end report is answered. The policy never performs I/O and never
//! fails; every operation returns a decision value the handlers act on.
//!
//! # Decision surface
//!
//! | Operation | Consulted by | Outcome |
//! |-----------|--------------|---------|
//! | [`decide_next_image`](PolicyState::decide_next_image) | query-next-image | offer / NO_IMAGE_AVAILABLE |
//! | [`decide_block_request`](PolicyState::decide_block_request) | every block | proceed / wait / abort |
//! | [`decide_upgrade_end`](PolicyState::decide_upgrade_end) | upgrade-end | schedule / abort |

use std::time::{Duration, Instant};

use crate::config::{DEFAULT_MIN_BLOCK_PERIOD_MS, UPGRADE_SOON_DELAY};
use crate::image::ImageIdentity;
use crate::messages::BlockRequest;
use crate::pacing::TokenBucket;
use crate::status::Status;
use crate::store::ImageStore;

/// Rule deciding which firmware versions are offered to a querying client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NextVersionPolicy {
    /// Offer only strictly newer candidates.
    #[default]
    UpgradeIfNewer,
    /// Offer only strictly older candidates.
    DowngradeIfOlder,
    /// Offer only the version the client already runs.
    ReinstallIfSame,
    /// Never offer an image.
    NoNextVersion,
}

/// Rule deciding how a successful upgrade-end report is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeEndPolicy {
    /// Run the new image immediately.
    #[default]
    UpgradeNow,
    /// Run the new image after a fixed short delay.
    UpgradeSoon,
    /// Hold the image; the client re-asks until told otherwise.
    AskLater,
    /// Refuse the upgrade.
    AbortUpgrade,
}

/// Gate applied to every image-block request before any data is read.
///
/// `Delay` and `RateLimit` are the two fully specified rate-limiting modes;
/// further delay-negotiation strategies slot in as new variants without
/// touching the transfer engine.
#[derive(Debug, Clone, Default)]
pub enum BlockRequestPolicy {
    /// Serve every request.
    #[default]
    Proceed,
    /// Push every request back by a fixed delay (link duty-cycle escape
    /// hatch and test hook).
    Delay(Duration),
    /// Serve requests while the token bucket holds bytes, push back with the
    /// computed refill wait otherwise.
    RateLimit(TokenBucket),
    /// Answer every request with ABORT.
    Abort,
}

/// Outcome of [`PolicyState::decide_block_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    /// Read and send the data.
    Proceed,
    /// Backpressure: answer WAIT_FOR_DATA and let the client retry.
    Wait {
        /// How long the client should wait before retrying.
        delay: Duration,
        /// Minimum block period to advertise, when the client supports the
        /// field.
        min_block_period_ms: Option<u16>,
    },
    /// Answer ABORT.
    Abort,
}

/// Outcome of [`PolicyState::decide_next_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextImage {
    /// SUCCESS with an offer, or NO_IMAGE_AVAILABLE.
    pub status: Status,
    /// Offered image, [`ImageIdentity::INVALID`] when none.
    pub image: ImageIdentity,
    /// Total size of the offered image in bytes.
    pub total_size: u32,
}

impl NextImage {
    fn none() -> Self {
        Self {
            status: Status::NoImageAvailable,
            image: ImageIdentity::INVALID,
            total_size: 0,
        }
    }
}

/// Outcome of [`PolicyState::decide_upgrade_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeEndDecision {
    /// False means the server answers with ABORT.
    pub proceed: bool,
    /// Delay before the client runs the new image. `Duration::MAX` encodes
    /// "wait indefinitely, ask again".
    pub delay: Duration,
}

/// Per-server policy state.
///
/// Mutable only through the setters; defaults are applied at construction.
#[derive(Debug, Clone)]
pub struct PolicyState {
    next_version: NextVersionPolicy,
    upgrade_end: UpgradeEndPolicy,
    block_request: BlockRequestPolicy,
    min_block_period_ms: u16,
    page_requests_supported: bool,
}

impl Default for PolicyState {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyState {
    /// Policy defaults: upgrade-if-newer, upgrade-now, no rate limiting,
    /// page requests supported.
    pub fn new() -> Self {
        Self {
            next_version: NextVersionPolicy::default(),
            upgrade_end: UpgradeEndPolicy::default(),
            block_request: BlockRequestPolicy::default(),
            min_block_period_ms: DEFAULT_MIN_BLOCK_PERIOD_MS,
            page_requests_supported: true,
        }
    }

    /// Rule for version eligibility on queries.
    pub fn next_version_policy(&self) -> NextVersionPolicy {
        self.next_version
    }

    /// Replace the version-eligibility rule.
    pub fn set_next_version_policy(&mut self, policy: NextVersionPolicy) {
        self.next_version = policy;
    }

    /// Rule for answering successful upgrade-end reports.
    pub fn upgrade_end_policy(&self) -> UpgradeEndPolicy {
        self.upgrade_end
    }

    /// Replace the upgrade-end rule.
    pub fn set_upgrade_end_policy(&mut self, policy: UpgradeEndPolicy) {
        self.upgrade_end = policy;
    }

    /// Replace the block-request gate.
    pub fn set_block_request_policy(&mut self, policy: BlockRequestPolicy) {
        self.block_request = policy;
    }

    /// Minimum block period clients must honor, in milliseconds.
    pub fn min_block_period_ms(&self) -> u16 {
        self.min_block_period_ms
    }

    /// Replace the minimum block period.
    pub fn set_min_block_period_ms(&mut self, period_ms: u16) {
        self.min_block_period_ms = period_ms;
    }

    /// Whether page requests are served at all.
    pub fn page_requests_supported(&self) -> bool {
        self.page_requests_supported
    }

    /// Enable or disable page-request service.
    pub fn set_page_requests_supported(&mut self, supported: bool) {
        self.page_requests_supported = supported;
    }

    /// Decide what a querying client should be offered.
    ///
    /// The hardware-range check is deliberately asymmetric: it disqualifies
    /// a candidate only when the request carries a hardware version *and*
    /// the candidate header declares a range. Absence on either side never
    /// disqualifies.
    pub fn decide_next_image(
        &self,
        store: &dyn ImageStore,
        current: ImageIdentity,
        hardware_version: Option<u16>,
    ) -> NextImage {
        let candidate =
            store.search_by_type(current.manufacturer_id, current.image_type_id, hardware_version);
        if !candidate.is_valid() {
            return NextImage::none();
        }

        if let (Some(hw), Some(header)) = (hardware_version, store.header(candidate)) {
            if let Some(range) = header.hardware_range {
                if !range.contains(hw) {
                    return NextImage::none();
                }
            }
        }

        // Strict inequalities: equal versions never satisfy upgrade or
        // downgrade.
        let eligible = match self.next_version {
            NextVersionPolicy::UpgradeIfNewer => {
                candidate.firmware_version > current.firmware_version
            }
            NextVersionPolicy::DowngradeIfOlder => {
                candidate.firmware_version < current.firmware_version
            }
            NextVersionPolicy::ReinstallIfSame => {
                candidate.firmware_version == current.firmware_version
            }
            NextVersionPolicy::NoNextVersion => false,
        };

        if eligible {
            NextImage {
                status: Status::Success,
                image: candidate,
                total_size: store.total_size(candidate),
            }
        } else {
            NextImage::none()
        }
    }

    /// Decide whether a block request proceeds, waits, or is aborted.
    ///
    /// A client that supports block-period negotiation and echoes a period
    /// different from the configured minimum is pushed back with the
    /// configured value; once it echoes that value, requests proceed, so no
    /// WAIT_FOR_DATA loop can form with a compliant client.
    pub fn decide_block_request(&mut self, req: &BlockRequest, now: Instant) -> BlockDecision {
        let advertised = req.min_block_period_ms.map(|_| self.min_block_period_ms);

        match &mut self.block_request {
            BlockRequestPolicy::Abort => return BlockDecision::Abort,
            BlockRequestPolicy::Delay(delay) => {
                return BlockDecision::Wait {
                    delay: *delay,
                    min_block_period_ms: advertised,
                };
            }
            BlockRequestPolicy::RateLimit(bucket) => {
                let cost = u64::from(req.max_data_size);
                if !bucket.try_consume(cost, now) {
                    return BlockDecision::Wait {
                        delay: bucket.time_until_available(cost, now),
                        min_block_period_ms: advertised,
                    };
                }
            }
            BlockRequestPolicy::Proceed => {}
        }

        if let Some(acked) = req.min_block_period_ms {
            if acked != self.min_block_period_ms {
                return BlockDecision::Wait {
                    delay: Duration::from_millis(u64::from(self.min_block_period_ms)),
                    min_block_period_ms: Some(self.min_block_period_ms),
                };
            }
        }

        BlockDecision::Proceed
    }

    /// Decide how an upgrade-end report is answered.
    ///
    /// A non-success report is informational: nothing proceeds and no
    /// schedule is produced.
    pub fn decide_upgrade_end(&self, status: Status, image: ImageIdentity) -> UpgradeEndDecision {
        let _ = image;
        if !status.is_success() {
            return UpgradeEndDecision {
                proceed: false,
                delay: Duration::ZERO,
            };
        }

        match self.upgrade_end {
            UpgradeEndPolicy::UpgradeNow => UpgradeEndDecision {
                proceed: true,
                delay: Duration::ZERO,
            },
            UpgradeEndPolicy::UpgradeSoon => UpgradeEndDecision {
                proceed: true,
                delay: UPGRADE_SOON_DELAY,
            },
            UpgradeEndPolicy::AskLater => UpgradeEndDecision {
                proceed: true,
                delay: Duration::MAX,
            },
            UpgradeEndPolicy::AbortUpgrade => UpgradeEndDecision {
                proceed: false,
                delay: Duration::ZERO,
            },
        }
    }
}
