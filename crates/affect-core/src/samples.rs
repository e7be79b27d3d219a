//! Emotion sample log and capture sessions.

use crate::emotion::EmotionSample;
use crate::error::CoreError;

/// Ordered, append-only sequence of samples.
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    samples: Vec<EmotionSample>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    ///
    /// Producers may jitter, so a timestamp that goes backwards is logged and kept.
    pub fn append(&mut self, sample: EmotionSample) {
        if let Some(last) = self.last_timestamp() {
            if sample.timestamp < last {
                tracing::warn!(
                    previous = last,
                    timestamp = sample.timestamp,
                    "sample timestamp went backwards"
                );
            }
        }
        self.samples.push(sample);
    }

    /// Read-only copy for aggregation.
    pub fn snapshot(&self) -> Vec<EmotionSample> {
        self.samples.clone()
    }

    pub fn samples(&self) -> &[EmotionSample] {
        &self.samples
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.samples.last().map(|s| s.timestamp)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<EmotionSample>> for SampleLog {
    fn from(samples: Vec<EmotionSample>) -> Self {
        let mut log = SampleLog::new();
        for sample in samples {
            log.append(sample);
        }
        log
    }
}

/// A capture or playback session.
///
/// Open sessions accept samples; once closed the log is read-only.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Known total duration in seconds, if the producer supplied one.
    pub duration: Option<f64>,
    log: SampleLog,
    closed: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, duration: Option<f64>) -> Result<Self, CoreError> {
        if let Some(d) = duration {
            if !d.is_finite() || d < 0.0 {
                return Err(CoreError::Validation(format!(
                    "duration must be a non-negative number, got {d}"
                )));
            }
        }
        Ok(Self {
            id: id.into(),
            duration,
            log: SampleLog::new(),
            closed: false,
        })
    }

    /// Append to an open session and return its new sample count.
    pub fn append(&mut self, sample: EmotionSample) -> Result<usize, CoreError> {
        if self.closed {
            return Err(CoreError::SessionClosed(self.id.clone()));
        }
        self.log.append(sample);
        Ok(self.log.len())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    /// Duration used for timeline segmentation: the declared duration, else
    /// the last sample's timestamp.
    pub fn effective_duration(&self) -> f64 {
        self.duration
            .or_else(|| self.log.last_timestamp())
            .unwrap_or(0.0)
    }
}
