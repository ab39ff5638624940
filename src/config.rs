//! Encoder tuning configuration
//!
//! Everything that used to be an ambient knob on the original hardware
//! backend (profile, rate-control mode, QP ceiling, quality target, frame
//! height rounding) is an explicit field here, passed to encoder and factory
//! construction.

use serde::{Deserialize, Serialize};

/// H.264 profiles selectable for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum H264Profile {
    ConstrainedBaseline,
    Baseline,
    Main,
    ConstrainedHigh,
    High,
}

/// Rate control modes of the underlying transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RcMode {
    /// Constant bitrate
    Cbr,
    /// Unconstrained variable bitrate
    Vbr,
    /// Quality-targeted
    Quality,
}

/// How to treat frame heights that are not a multiple of 16
///
/// Some transforms require 16-aligned dimensions; the conversion step pads
/// or crops each plane independently to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightRound {
    /// Hand the height through unchanged
    NoChange,
    /// Round down to the previous multiple of 16 (crops rows)
    Crop,
    /// Round up to the next multiple of 16 (pads rows)
    Pad,
}

impl HeightRound {
    /// Apply the rounding rule to a frame height
    pub fn apply(self, height: u32) -> u32 {
        match self {
            HeightRound::NoChange => height,
            HeightRound::Crop => height & !15,
            HeightRound::Pad => (height + 15) & !15,
        }
    }
}

/// Minimum interval between live bitrate/framerate reconfigurations.
///
/// On some encoders changing rates is slow and causes visible stuttering,
/// so requests arriving inside this window are queued instead of applied.
pub const DEFAULT_RATE_CHANGE_INTERVAL_MS: u64 = 5000;

/// Tuning knobs applied to every session an encoder builds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderTuning {
    /// Output profile. Defaults to Baseline, matching the behavior engines
    /// have historically negotiated against this backend.
    pub profile: H264Profile,
    /// Rate control mode; `None` leaves the transform's own default
    pub rc_mode: Option<RcMode>,
    /// Max QP override in 0..=51; takes priority over the engine's qp_max
    pub max_qp: Option<u32>,
    /// Quality target in 0..=100, effect depends on the rate control mode
    pub quality: Option<u32>,
    /// Height rounding for transforms requiring 16-aligned dimensions
    pub height_round: HeightRound,
    /// Cooldown between applied rate changes, in milliseconds
    pub rate_change_interval_ms: u64,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            profile: H264Profile::Baseline,
            rc_mode: None,
            max_qp: None,
            quality: None,
            height_round: HeightRound::NoChange,
            rate_change_interval_ms: DEFAULT_RATE_CHANGE_INTERVAL_MS,
        }
    }
}

impl EncoderTuning {
    pub fn with_profile(mut self, profile: H264Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_rc_mode(mut self, mode: RcMode) -> Self {
        self.rc_mode = Some(mode);
        self
    }

    pub fn with_max_qp(mut self, qp: u32) -> Self {
        self.max_qp = Some(qp);
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_height_round(mut self, mode: HeightRound) -> Self {
        self.height_round = mode;
        self
    }

    pub fn with_rate_change_interval_ms(mut self, ms: u64) -> Self {
        self.rate_change_interval_ms = ms;
        self
    }
}
