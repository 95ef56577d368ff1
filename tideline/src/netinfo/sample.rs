//! Connection samples and quality classification.
//!
//! A [`ConnectionSample`] is a normalized reading of whatever link signals the
//! platform exposes. [`ConnectionSample::quality`] folds a sample into one of
//! four [`ConnectionQuality`] tiers using a fixed ladder: the offline flag
//! wins outright, then the coarse link type, then measured downlink, then
//! round-trip time. A platform that reports nothing classifies as `Medium`,
//! never `Fast`, so a blind client does not get the most aggressive policy.
//!
//! The classifier is a pure function of the sample so it can be tested
//! exhaustively without any platform plumbing.

use serde::{Deserialize, Serialize};

/// Downlink below this many Mbps classifies as [`ConnectionQuality::Slow`].
pub const SLOW_DOWNLINK_MBPS: f64 = 0.5;

/// Downlink below this many Mbps classifies as [`ConnectionQuality::Medium`].
pub const MEDIUM_DOWNLINK_MBPS: f64 = 2.0;

/// Round-trip time above this many milliseconds classifies as [`ConnectionQuality::Slow`].
pub const SLOW_RTT_MS: u32 = 500;

/// Round-trip time above this many milliseconds classifies as [`ConnectionQuality::Medium`].
pub const MEDIUM_RTT_MS: u32 = 200;

/// Coarse link type reported by the platform.
///
/// Mirrors the effective connection types exposed by browser-style network
/// information APIs. Platforms that report nothing use [`EffectiveType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EffectiveType {
    /// Sub-2G links (high latency satellite fallback, congested cell edges).
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// 2G-class links.
    #[serde(rename = "2g")]
    Cell2g,
    /// 3G-class links.
    #[serde(rename = "3g")]
    Cell3g,
    /// 4G-class or better links, including most wifi.
    #[serde(rename = "4g")]
    Cell4g,
    /// The platform did not report a link type.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl EffectiveType {
    /// The wire name of this link type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveType::Slow2g => "slow-2g",
            EffectiveType::Cell2g => "2g",
            EffectiveType::Cell3g => "3g",
            EffectiveType::Cell4g => "4g",
            EffectiveType::Unknown => "unknown",
        }
    }

    /// Parse a platform-reported link type string.
    ///
    /// Unrecognized strings map to [`EffectiveType::Unknown`] rather than
    /// failing; the classifier falls through to measured signals.
    pub fn parse(value: &str) -> Self {
        match value {
            "slow-2g" => EffectiveType::Slow2g,
            "2g" => EffectiveType::Cell2g,
            "3g" => EffectiveType::Cell3g,
            "4g" => EffectiveType::Cell4g,
            _ => EffectiveType::Unknown,
        }
    }
}

impl std::fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of four connection quality tiers driving the performance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// Healthy broadband or 4G-class link.
    Fast,
    /// Workable but constrained link; also the tier for unknown conditions.
    Medium,
    /// Degraded link where every request is expensive.
    Slow,
    /// No connectivity at all.
    Offline,
}

impl ConnectionQuality {
    /// Whether this tier represents any connectivity at all.
    pub fn is_online(&self) -> bool {
        !matches!(self, ConnectionQuality::Offline)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Fast => "fast",
            ConnectionQuality::Medium => "medium",
            ConnectionQuality::Slow => "slow",
            ConnectionQuality::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized reading of the platform's link signals.
///
/// Every field except `online` may be absent on a given platform; the
/// classifier works with whatever subset is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSample {
    /// Platform online flag. `false` always classifies as offline.
    pub online: bool,
    /// Coarse link type, if reported.
    pub effective_type: EffectiveType,
    /// Estimated downlink bandwidth in Mbps, if reported.
    pub downlink_mbps: Option<f64>,
    /// Estimated round-trip time in milliseconds, if reported.
    pub rtt_ms: Option<u32>,
    /// User preference for reduced data usage.
    ///
    /// Deliberately not an input to [`ConnectionSample::quality`]: the data
    /// saver preference overrides at the policy level instead, so quality
    /// still reflects the physical link.
    pub save_data: bool,
}

impl Default for ConnectionSample {
    fn default() -> Self {
        Self {
            online: true,
            effective_type: EffectiveType::Unknown,
            downlink_mbps: None,
            rtt_ms: None,
            save_data: false,
        }
    }
}

impl ConnectionSample {
    /// A sample representing a platform that reports nothing but "online".
    pub fn unknown_online() -> Self {
        Self::default()
    }

    /// A sample representing a lost connection.
    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::default()
        }
    }

    /// Classify this sample into a quality tier.
    ///
    /// The ladder, first match wins:
    ///
    /// 1. `online == false` is `Offline`.
    /// 2. A reported link type decides: slow-2g/2g are `Slow`, 3g is
    ///    `Medium`, 4g is `Fast`.
    /// 3. Reported downlink decides against [`SLOW_DOWNLINK_MBPS`] and
    ///    [`MEDIUM_DOWNLINK_MBPS`].
    /// 4. Reported round-trip time decides against [`SLOW_RTT_MS`] and
    ///    [`MEDIUM_RTT_MS`].
    /// 5. Nothing reported: `Medium`.
    pub fn quality(&self) -> ConnectionQuality {
        if !self.online {
            return ConnectionQuality::Offline;
        }

        match self.effective_type {
            EffectiveType::Slow2g | EffectiveType::Cell2g => return ConnectionQuality::Slow,
            EffectiveType::Cell3g => return ConnectionQuality::Medium,
            EffectiveType::Cell4g => return ConnectionQuality::Fast,
            EffectiveType::Unknown => {}
        }

        if let Some(downlink) = self.downlink_mbps {
            return if downlink < SLOW_DOWNLINK_MBPS {
                ConnectionQuality::Slow
            } else if downlink < MEDIUM_DOWNLINK_MBPS {
                ConnectionQuality::Medium
            } else {
                ConnectionQuality::Fast
            };
        }

        if let Some(rtt) = self.rtt_ms {
            return if rtt > SLOW_RTT_MS {
                ConnectionQuality::Slow
            } else if rtt > MEDIUM_RTT_MS {
                ConnectionQuality::Medium
            } else {
                ConnectionQuality::Fast
            };
        }

        ConnectionQuality::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_offline_flag_wins_over_everything() {
        let sample = ConnectionSample {
            online: false,
            effective_type: EffectiveType::Cell4g,
            downlink_mbps: Some(50.0),
            rtt_ms: Some(10),
            save_data: false,
        };
        assert_eq!(sample.quality(), ConnectionQuality::Offline);
    }

    #[test]
    fn test_effective_type_ladder() {
        let cases = [
            (EffectiveType::Slow2g, ConnectionQuality::Slow),
            (EffectiveType::Cell2g, ConnectionQuality::Slow),
            (EffectiveType::Cell3g, ConnectionQuality::Medium),
            (EffectiveType::Cell4g, ConnectionQuality::Fast),
        ];
        for (effective_type, expected) in cases {
            let sample = ConnectionSample {
                effective_type,
                ..ConnectionSample::default()
            };
            assert_eq!(sample.quality(), expected, "for {effective_type}");
        }
    }

    #[test]
    fn test_downlink_thresholds() {
        let with_downlink = |mbps: f64| ConnectionSample {
            downlink_mbps: Some(mbps),
            ..ConnectionSample::default()
        };
        assert_eq!(with_downlink(0.2).quality(), ConnectionQuality::Slow);
        assert_eq!(with_downlink(0.5).quality(), ConnectionQuality::Medium);
        assert_eq!(with_downlink(1.9).quality(), ConnectionQuality::Medium);
        assert_eq!(with_downlink(2.0).quality(), ConnectionQuality::Fast);
        assert_eq!(with_downlink(40.0).quality(), ConnectionQuality::Fast);
    }

    #[test]
    fn test_rtt_thresholds() {
        let with_rtt = |ms: u32| ConnectionSample {
            rtt_ms: Some(ms),
            ..ConnectionSample::default()
        };
        assert_eq!(with_rtt(800).quality(), ConnectionQuality::Slow);
        assert_eq!(with_rtt(500).quality(), ConnectionQuality::Medium);
        assert_eq!(with_rtt(201).quality(), ConnectionQuality::Medium);
        assert_eq!(with_rtt(200).quality(), ConnectionQuality::Fast);
        assert_eq!(with_rtt(20).quality(), ConnectionQuality::Fast);
    }

    #[test]
    fn test_effective_type_beats_measured_signals() {
        // A 2g report with a suspiciously good downlink still classifies slow.
        let sample = ConnectionSample {
            effective_type: EffectiveType::Cell2g,
            downlink_mbps: Some(10.0),
            rtt_ms: Some(20),
            ..ConnectionSample::default()
        };
        assert_eq!(sample.quality(), ConnectionQuality::Slow);
    }

    #[test]
    fn test_downlink_beats_rtt() {
        let sample = ConnectionSample {
            downlink_mbps: Some(0.3),
            rtt_ms: Some(20),
            ..ConnectionSample::default()
        };
        assert_eq!(sample.quality(), ConnectionQuality::Slow);
    }

    #[test]
    fn test_no_signals_is_medium() {
        assert_eq!(
            ConnectionSample::unknown_online().quality(),
            ConnectionQuality::Medium
        );
    }

    #[test]
    fn test_effective_type_parse_round_trip() {
        for raw in ["slow-2g", "2g", "3g", "4g"] {
            assert_eq!(EffectiveType::parse(raw).as_str(), raw);
        }
        assert_eq!(EffectiveType::parse("5g"), EffectiveType::Unknown);
        assert_eq!(EffectiveType::parse(""), EffectiveType::Unknown);
    }

    fn arb_effective_type() -> impl Strategy<Value = EffectiveType> {
        prop_oneof![
            Just(EffectiveType::Slow2g),
            Just(EffectiveType::Cell2g),
            Just(EffectiveType::Cell3g),
            Just(EffectiveType::Cell4g),
            Just(EffectiveType::Unknown),
        ]
    }

    fn arb_sample() -> impl Strategy<Value = ConnectionSample> {
        (
            any::<bool>(),
            arb_effective_type(),
            proptest::option::of(0.0f64..100.0),
            proptest::option::of(0u32..3_000),
            any::<bool>(),
        )
            .prop_map(
                |(online, effective_type, downlink_mbps, rtt_ms, save_data)| ConnectionSample {
                    online,
                    effective_type,
                    downlink_mbps,
                    rtt_ms,
                    save_data,
                },
            )
    }

    proptest! {
        #[test]
        fn prop_offline_iff_flag_cleared(sample in arb_sample()) {
            prop_assert_eq!(sample.quality() == ConnectionQuality::Offline, !sample.online);
        }

        #[test]
        fn prop_4g_online_is_always_fast(
            downlink in proptest::option::of(0.0f64..100.0),
            rtt in proptest::option::of(0u32..3_000),
            save_data in any::<bool>(),
        ) {
            let sample = ConnectionSample {
                online: true,
                effective_type: EffectiveType::Cell4g,
                downlink_mbps: downlink,
                rtt_ms: rtt,
                save_data,
            };
            prop_assert_eq!(sample.quality(), ConnectionQuality::Fast);
        }

        #[test]
        fn prop_save_data_never_changes_quality(sample in arb_sample()) {
            let mut flipped = sample.clone();
            flipped.save_data = !flipped.save_data;
            prop_assert_eq!(sample.quality(), flipped.quality());
        }

        #[test]
        fn prop_blind_sample_never_fast(online in any::<bool>(), save_data in any::<bool>()) {
            let sample = ConnectionSample {
                online,
                effective_type: EffectiveType::Unknown,
                downlink_mbps: None,
                rtt_ms: None,
                save_data,
            };
            prop_assert_ne!(sample.quality(), ConnectionQuality::Fast);
        }
    }
}
