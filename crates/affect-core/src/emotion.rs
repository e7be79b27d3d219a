//! Emotion labels, per-frame expression vectors and timestamped samples.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Slack allowed on either side of [0, 1] for producer rounding.
const PROBABILITY_SLACK: f64 = 1e-6;
// Steepness and midpoint of the live-capture sharpening curve.
const SHARPEN_GAIN: f64 = 12.0;
const SHARPEN_MIDPOINT: f64 = 0.5;

/// The closed set of emotion labels.
///
/// Declaration order is the tie-break order everywhere a dominant label is
/// picked, and `Ord` follows it so ordered maps iterate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Fearful,
        EmotionLabel::Disgusted,
        EmotionLabel::Surprised,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Disgusted => "disgusted",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Weight of this label in the engagement score.
    pub fn engagement_weight(&self) -> f64 {
        match self {
            EmotionLabel::Happy => 1.0,
            EmotionLabel::Surprised => 0.8,
            EmotionLabel::Angry => 0.7,
            EmotionLabel::Fearful => 0.6,
            EmotionLabel::Disgusted => 0.5,
            EmotionLabel::Sad => 0.4,
            EmotionLabel::Neutral => 0.2,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionLabel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown emotion label: {s}")))
    }
}

/// Per-frame expression probabilities, one per label.
///
/// Missing labels deserialize as 0. Values are not required to sum to exactly 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmotionVector {
    pub happy: f64,
    pub sad: f64,
    pub angry: f64,
    pub fearful: f64,
    pub disgusted: f64,
    pub surprised: f64,
    pub neutral: f64,
}

impl EmotionVector {
    /// Build a vector from `(label, value)` pairs; unspecified labels are 0.
    pub fn from_pairs(pairs: &[(EmotionLabel, f64)]) -> Self {
        let mut v = Self::default();
        for &(label, value) in pairs {
            *v.get_mut(label) = value;
        }
        v
    }

    pub fn get(&self, label: EmotionLabel) -> f64 {
        match label {
            EmotionLabel::Happy => self.happy,
            EmotionLabel::Sad => self.sad,
            EmotionLabel::Angry => self.angry,
            EmotionLabel::Fearful => self.fearful,
            EmotionLabel::Disgusted => self.disgusted,
            EmotionLabel::Surprised => self.surprised,
            EmotionLabel::Neutral => self.neutral,
        }
    }

    fn get_mut(&mut self, label: EmotionLabel) -> &mut f64 {
        match label {
            EmotionLabel::Happy => &mut self.happy,
            EmotionLabel::Sad => &mut self.sad,
            EmotionLabel::Angry => &mut self.angry,
            EmotionLabel::Fearful => &mut self.fearful,
            EmotionLabel::Disgusted => &mut self.disgusted,
            EmotionLabel::Surprised => &mut self.surprised,
            EmotionLabel::Neutral => &mut self.neutral,
        }
    }

    /// `(label, value)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        EmotionLabel::ALL.into_iter().map(move |l| (l, self.get(l)))
    }

    /// Every value must be finite and within [0, 1] (with a little slack).
    pub fn validate(&self) -> Result<(), CoreError> {
        for (label, value) in self.iter() {
            if !value.is_finite()
                || value < -PROBABILITY_SLACK
                || value > 1.0 + PROBABILITY_SLACK
            {
                return Err(CoreError::Validation(format!(
                    "expression {label} must be a probability in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Label with the highest value; the earliest label wins ties.
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Happy;
        let mut best_value = self.happy;
        for (label, value) in self.iter().skip(1) {
            if value > best_value {
                best = label;
                best_value = value;
            }
        }
        best
    }

    pub fn max_value(&self) -> f64 {
        self.iter().map(|(_, v)| v).fold(0.0, f64::max)
    }

    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, v)| v).sum()
    }

    /// Sigmoid-sharpen every value around 0.5, then renormalise to sum 1.
    ///
    /// This mirrors the live-capture path upstream of sample creation. It is
    /// never applied implicitly.
    pub fn sharpened(&self) -> Self {
        let mut out = Self::default();
        for (label, value) in self.iter() {
            *out.get_mut(label) = 1.0 / (1.0 + (-SHARPEN_GAIN * (value - SHARPEN_MIDPOINT)).exp());
        }
        let total = out.sum();
        if total > 0.0 {
            for label in EmotionLabel::ALL {
                *out.get_mut(label) /= total;
            }
        }
        out
    }
}

/// One timestamped expression reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SampleInput")]
pub struct EmotionSample {
    /// Seconds from session start.
    pub timestamp: f64,
    pub expressions: EmotionVector,
    /// Fixed when the sample is created.
    pub dominant_emotion: EmotionLabel,
}

impl EmotionSample {
    /// Validate the reading and derive its dominant emotion.
    pub fn new(timestamp: f64, expressions: EmotionVector) -> Result<Self, CoreError> {
        if !timestamp.is_finite() {
            return Err(CoreError::Validation(format!(
                "timestamp must be a finite number, got {timestamp}"
            )));
        }
        expressions.validate()?;
        Ok(Self {
            timestamp,
            expressions,
            dominant_emotion: expressions.dominant(),
        })
    }
}

/// Wire shape of a sample as producers send it.
///
/// A producer-supplied `dominantEmotion` is accepted but ignored; it is
/// always re-derived from the expressions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleInput {
    pub timestamp: f64,
    pub expressions: EmotionVector,
    #[serde(default)]
    pub dominant_emotion: Option<EmotionLabel>,
}

impl TryFrom<SampleInput> for EmotionSample {
    type Error = CoreError;

    fn try_from(input: SampleInput) -> Result<Self, Self::Error> {
        EmotionSample::new(input.timestamp, input.expressions)
    }
}
