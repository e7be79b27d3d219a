//! Analytics aggregator: pure functions over a sample snapshot.
//!
//! Nothing here fails. Empty input, zero durations and zero totals all
//! produce empty or neutral values, because "no data yet" is the normal
//! state of a live session.

use crate::emotion::{EmotionLabel, EmotionSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Named constants ---
pub const DEFAULT_KEY_MOMENT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_TREND_INTERVAL_SECS: f64 = 60.0;
pub const TIMELINE_SEGMENTS: usize = 10;
/// Number of transitions kept as `peaks` in a stored-video summary.
const VIDEO_SUMMARY_PEAKS: usize = 5;

/// Percentage per label, iterated in label order.
pub type Distribution = BTreeMap<EmotionLabel, f64>;

/// A sample whose strongest expression crossed the key-moment threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMoment {
    pub timestamp: f64,
    pub dominant_emotion: EmotionLabel,
    /// Strongest expression value × 100, rounded.
    pub intensity: u32,
}

/// Change of dominant emotion between adjacent samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: EmotionLabel,
    pub to: EmotionLabel,
    pub timestamp: f64,
    /// Probability of `to` in the later sample × 100, rounded.
    pub intensity: u32,
}

/// One of the ten fixed-width slices of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub sample_count: usize,
    /// Share of samples per dominant label (count-based, all seven labels).
    pub percentages: Distribution,
}

/// Fixed-interval bucket of the trend view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub time_start: f64,
    pub time_end: f64,
    /// Probability-weighted distribution of the bucket's samples.
    pub emotions: Distribution,
    pub dominant_emotion: Option<EmotionLabel>,
}

/// Session-level summary statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub dominant_emotion: Option<EmotionLabel>,
    pub dominant_emotion_percentage: u32,
    pub engagement_score: u32,
    pub emotion_distribution: Distribution,
    pub number_of_transitions: usize,
    pub key_moments_count: usize,
    /// Timestamp of the last sample.
    pub total_duration: f64,
    /// Mean key-moment intensity, 0 without key moments.
    pub average_emotion_intensity: u32,
}

/// Most engaging happy/surprised moment of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakEngagement {
    pub timestamp: f64,
    /// Sum of all expression values in that sample.
    pub score: f64,
}

/// Transition entry of a stored-video summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPeak {
    pub time: f64,
    pub from: EmotionLabel,
    pub to: EmotionLabel,
}

/// Summary computed when a whole video's samples are stored at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    /// Share of samples per dominant label; labels never dominant are omitted.
    pub distribution: Distribution,
    /// Mean over all samples of the expression sum of happy/surprised-dominant samples.
    pub engagement_score: f64,
    /// First few transitions.
    pub peaks: Vec<VideoPeak>,
    pub total_data_points: usize,
}

/// Tunables for [`report`].
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub key_moment_threshold: f64,
    pub trend_interval_secs: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            key_moment_threshold: DEFAULT_KEY_MOMENT_THRESHOLD,
            trend_interval_secs: DEFAULT_TREND_INTERVAL_SECS,
        }
    }
}

/// Everything the dashboard and exported report show for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub summary: Summary,
    pub timeline: Vec<TimelineSegment>,
    pub trends: Vec<TrendBucket>,
    pub key_moments: Vec<KeyMoment>,
    pub transitions: Vec<Transition>,
    pub peak_engagement: Option<PeakEngagement>,
}

fn percent_u32(value: f64) -> u32 {
    value.round().clamp(0.0, u32::MAX as f64) as u32
}

/// Probability-weighted share of each label across all samples.
///
/// Empty when there are no samples or every value is zero.
pub fn emotion_distribution(samples: &[EmotionSample]) -> Distribution {
    let mut totals = [0.0f64; 7];
    for sample in samples {
        for (i, (_, value)) in sample.expressions.iter().enumerate() {
            totals[i] += value;
        }
    }

    let grand_total: f64 = totals.iter().sum();
    if samples.is_empty() || grand_total <= 0.0 {
        return Distribution::new();
    }

    EmotionLabel::ALL
        .into_iter()
        .zip(totals)
        .map(|(label, total)| (label, total / grand_total * 100.0))
        .collect()
}

/// Highest entry of a distribution; the earliest label wins ties.
pub fn dominant_of(distribution: &Distribution) -> Option<(EmotionLabel, f64)> {
    let mut best: Option<(EmotionLabel, f64)> = None;
    for (&label, &value) in distribution {
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((label, value));
        }
    }
    best
}

/// Weighted expression intensity averaged over the session, 0–100.
pub fn engagement_score(samples: &[EmotionSample]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let total: f64 = samples
        .iter()
        .map(|s| {
            s.expressions
                .iter()
                .map(|(label, value)| value * label.engagement_weight())
                .sum::<f64>()
        })
        .sum();
    let mean = total / samples.len() as f64;
    (mean * 100.0).clamp(0.0, 100.0).round() as u32
}

/// Samples whose strongest expression is at least `threshold`.
pub fn key_moments(samples: &[EmotionSample], threshold: f64) -> Vec<KeyMoment> {
    samples
        .iter()
        .filter_map(|s| {
            let max = s.expressions.max_value();
            (max >= threshold).then(|| KeyMoment {
                timestamp: s.timestamp,
                dominant_emotion: s.dominant_emotion,
                intensity: percent_u32(max * 100.0),
            })
        })
        .collect()
}

/// Dominant-emotion changes between consecutive samples.
pub fn transitions(samples: &[EmotionSample]) -> Vec<Transition> {
    samples
        .windows(2)
        .filter(|w| w[0].dominant_emotion != w[1].dominant_emotion)
        .map(|w| {
            let to = w[1].dominant_emotion;
            Transition {
                from: w[0].dominant_emotion,
                to,
                timestamp: w[1].timestamp,
                intensity: percent_u32(w[1].expressions.get(to) * 100.0),
            }
        })
        .collect()
}

/// Split `[0, duration)` into ten half-open segments and report the
/// dominant-label share of each. Segments without samples are omitted.
pub fn timeline(samples: &[EmotionSample], duration: f64) -> Vec<TimelineSegment> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let width = duration / TIMELINE_SEGMENTS as f64;

    (0..TIMELINE_SEGMENTS)
        .filter_map(|i| {
            let start_time = i as f64 * width;
            let end_time = (i + 1) as f64 * width;

            let mut counts = [0usize; 7];
            let mut sample_count = 0;
            for s in samples
                .iter()
                .filter(|s| s.timestamp >= start_time && s.timestamp < end_time)
            {
                counts[s.dominant_emotion as usize] += 1;
                sample_count += 1;
            }
            if sample_count == 0 {
                return None;
            }

            let percentages = EmotionLabel::ALL
                .into_iter()
                .zip(counts)
                .map(|(label, count)| (label, count as f64 / sample_count as f64 * 100.0))
                .collect();

            Some(TimelineSegment {
                start_time,
                end_time,
                sample_count,
                percentages,
            })
        })
        .collect()
}

/// Fixed-width buckets from 0 up to the last sample's timestamp, each with
/// its own distribution. Empty buckets are omitted.
pub fn emotion_trends(samples: &[EmotionSample], interval_secs: f64) -> Vec<TrendBucket> {
    let Some(last) = samples.last().map(|s| s.timestamp) else {
        return Vec::new();
    };
    if !interval_secs.is_finite() || interval_secs <= 0.0 || last < 0.0 {
        return Vec::new();
    }
    // A last sample beyond the indexable range leaves the upper bound open.
    let last_bucket = bucket_index(last, interval_secs).unwrap_or(u64::MAX);

    let mut buckets: BTreeMap<u64, Vec<EmotionSample>> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.timestamp >= 0.0) {
        match bucket_index(s.timestamp, interval_secs) {
            Some(idx) if idx <= last_bucket => buckets.entry(idx).or_default().push(s.clone()),
            Some(_) => {}
            None => {
                tracing::warn!(
                    timestamp = s.timestamp,
                    interval_secs,
                    "sample beyond trend range skipped"
                );
            }
        }
    }

    buckets
        .into_iter()
        .map(|(idx, members)| {
            let emotions = emotion_distribution(&members);
            TrendBucket {
                time_start: idx as f64 * interval_secs,
                time_end: (idx + 1) as f64 * interval_secs,
                dominant_emotion: dominant_of(&emotions).map(|(label, _)| label),
                emotions,
            }
        })
        .collect()
}

/// Largest bucket index whose bounds are still exact in `f64`.
const MAX_BUCKET_INDEX: f64 = 9_007_199_254_740_992.0; // 2^53

/// Index `k` such that `k * interval <= t < (k + 1) * interval`, computed
/// with the same products the bucket bounds use. `None` past `MAX_BUCKET_INDEX`.
fn bucket_index(t: f64, interval: f64) -> Option<u64> {
    let raw = (t / interval).floor().max(0.0);
    if !raw.is_finite() || raw >= MAX_BUCKET_INDEX {
        return None;
    }
    let mut idx = raw as u64;
    while idx > 0 && t < idx as f64 * interval {
        idx -= 1;
    }
    while t >= idx.checked_add(1)? as f64 * interval {
        idx = idx.checked_add(1)?;
    }
    Some(idx)
}

/// Combine the aggregator views into one summary object.
pub fn summarize(samples: &[EmotionSample], key_moment_threshold: f64) -> Summary {
    let Some(last) = samples.last() else {
        return Summary::default();
    };

    let emotion_distribution = emotion_distribution(samples);
    let moments = key_moments(samples, key_moment_threshold);
    let (dominant_emotion, dominant_percentage) = match dominant_of(&emotion_distribution) {
        Some((label, pct)) => (Some(label), pct),
        None => (None, 0.0),
    };
    let intensity_total: u64 = moments.iter().map(|m| m.intensity as u64).sum();

    Summary {
        dominant_emotion,
        dominant_emotion_percentage: percent_u32(dominant_percentage),
        engagement_score: engagement_score(samples),
        emotion_distribution,
        number_of_transitions: transitions(samples).len(),
        key_moments_count: moments.len(),
        total_duration: last.timestamp,
        average_emotion_intensity: percent_u32(
            intensity_total as f64 / moments.len().max(1) as f64,
        ),
    }
}

/// The happy/surprised-dominant sample with the largest expression sum.
pub fn peak_engagement(samples: &[EmotionSample]) -> Option<PeakEngagement> {
    let mut peak: Option<PeakEngagement> = None;
    for s in samples {
        if !matches!(s.dominant_emotion, EmotionLabel::Happy | EmotionLabel::Surprised) {
            continue;
        }
        let score = s.expressions.sum();
        if score > peak.as_ref().map_or(0.0, |p| p.score) {
            peak = Some(PeakEngagement {
                timestamp: s.timestamp,
                score,
            });
        }
    }
    peak
}

/// Summary stored alongside an uploaded video's samples.
pub fn video_summary(samples: &[EmotionSample]) -> VideoSummary {
    if samples.is_empty() {
        return VideoSummary::default();
    }
    let total = samples.len() as f64;

    let mut counts: BTreeMap<EmotionLabel, usize> = BTreeMap::new();
    for s in samples {
        *counts.entry(s.dominant_emotion).or_default() += 1;
    }
    let distribution = counts
        .into_iter()
        .map(|(label, count)| (label, count as f64 / total * 100.0))
        .collect();

    let positive: f64 = samples
        .iter()
        .filter(|s| matches!(s.dominant_emotion, EmotionLabel::Happy | EmotionLabel::Surprised))
        .map(|s| s.expressions.sum())
        .sum();

    let peaks = transitions(samples)
        .into_iter()
        .take(VIDEO_SUMMARY_PEAKS)
        .map(|t| VideoPeak {
            time: t.timestamp,
            from: t.from,
            to: t.to,
        })
        .collect();

    VideoSummary {
        distribution,
        engagement_score: positive / total,
        peaks,
        total_data_points: samples.len(),
    }
}

/// Build the full report for a session of the given duration.
pub fn report(samples: &[EmotionSample], duration: f64, options: &ReportOptions) -> Report {
    Report {
        summary: summarize(samples, options.key_moment_threshold),
        timeline: timeline(samples, duration),
        trends: emotion_trends(samples, options.trend_interval_secs),
        key_moments: key_moments(samples, options.key_moment_threshold),
        transitions: transitions(samples),
        peak_engagement: peak_engagement(samples),
    }
}
