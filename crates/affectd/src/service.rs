//! Owned service state behind the HTTP layer.
//!
//! Each shared resource sits behind its own `RwLock`: writes (register,
//! append) hold the lock exclusively, reads (matching, snapshots) share it.
//! Inputs are validated before a write lock commits anything.

use affect_core::analytics::{self, KeyMoment, TimelineSegment, Transition, TrendBucket, VideoSummary};
use affect_core::records::now_rfc3339;
use affect_core::{
    AnalysisRecord, AttendanceLog, CoreError, Descriptor, DescriptorStore, EmotionLabel,
    EmotionSample, EmotionVector, EuclideanMatcher, GeoLocation, MatchResult, Matcher, Report,
    ReportOptions, SampleInput, Session, Summary,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;

/// Service tunables taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub match_threshold: f64,
    pub descriptor_dim: usize,
    pub key_moment_threshold: f64,
    pub trend_interval_secs: f64,
    pub sharpen_expressions: bool,
}

impl From<&Config> for ServiceSettings {
    fn from(c: &Config) -> Self {
        Self {
            match_threshold: c.match_threshold,
            descriptor_dim: c.descriptor_dim,
            key_moment_threshold: c.key_moment_threshold,
            trend_interval_secs: c.trend_interval_secs,
            sharpen_expressions: c.sharpen_expressions,
        }
    }
}

/// Recognition event metadata forwarded by the capture client.
#[derive(Debug, Clone, Default)]
pub struct RecognitionContext {
    pub gender: Option<String>,
    pub gender_probability: Option<f64>,
    pub emotion: Option<EmotionLabel>,
    pub timestamp: Option<String>,
    pub location: Option<GeoLocation>,
}

/// A video whose samples were uploaded in one piece.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVideo {
    pub video_id: String,
    pub emotion_data: Vec<EmotionSample>,
    pub duration: f64,
    pub timestamp: String,
    pub summary: VideoSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummaryEntry {
    pub video_id: String,
    pub timestamp: String,
    pub duration: f64,
    pub summary: VideoSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub face_count: usize,
    pub analysis_count: usize,
    pub last_analysis: Option<AnalysisRecord>,
    pub attendance_stats: BTreeMap<String, Vec<affect_core::records::AttendanceEntry>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub duration: Option<f64>,
    pub sample_count: usize,
    pub closed: bool,
}

struct Inner {
    settings: ServiceSettings,
    store: RwLock<DescriptorStore>,
    attendance: RwLock<AttendanceLog>,
    sessions: RwLock<HashMap<String, Session>>,
    videos: RwLock<BTreeMap<String, StoredVideo>>,
}

/// Clone-safe handle to the service state.
#[derive(Clone)]
pub struct AffectService {
    inner: Arc<Inner>,
}

impl AffectService {
    pub fn new(settings: ServiceSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                store: RwLock::new(DescriptorStore::new(settings.descriptor_dim)),
                attendance: RwLock::new(AttendanceLog::new()),
                sessions: RwLock::new(HashMap::new()),
                videos: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.inner.settings
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            key_moment_threshold: self.inner.settings.key_moment_threshold,
            trend_interval_secs: self.inner.settings.trend_interval_secs,
        }
    }

    // --- Identities ---

    /// Register an identity and return the new identity count.
    ///
    /// When both gender fields are supplied an attendance record is logged too.
    /// The store guard is held until that record is appended, so readers that
    /// lock store then attendance (see [`Self::stats`]) never see the identity
    /// without its record. Lock order is always store before attendance.
    pub async fn register(
        &self,
        name: &str,
        descriptor: Descriptor,
        gender: Option<String>,
        gender_probability: Option<f64>,
    ) -> Result<usize, CoreError> {
        let mut store = self.inner.store.write().await;
        let count = match store.register(name, descriptor) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(name, error = %e, "registration rejected");
                return Err(e);
            }
        };
        tracing::info!(name, count, "identity registered");

        if let (Some(gender), Some(p)) = (gender, gender_probability) {
            self.inner
                .attendance
                .write()
                .await
                .append(AnalysisRecord::registration(name, gender, p));
        }
        drop(store);
        Ok(count)
    }

    /// Match a probe against the current store. A match is logged to attendance.
    pub async fn recognize(
        &self,
        probe: &Descriptor,
        context: RecognitionContext,
    ) -> Result<MatchResult, CoreError> {
        let threshold = self.inner.settings.match_threshold;
        let result = {
            let store = self.inner.store.read().await;
            store.check_dimension(probe)?;
            EuclideanMatcher.compare(probe, store.all(), threshold)?
        };

        match (&result.name, result.confidence) {
            (Some(name), Some(confidence)) => {
                tracing::info!(name = %name, confidence, "face recognized");
                let record = AnalysisRecord {
                    name: name.clone(),
                    gender: context.gender,
                    gender_probability: context.gender_probability,
                    emotion: context.emotion,
                    timestamp: context.timestamp.unwrap_or_else(now_rfc3339),
                    location: context.location,
                    confidence: Some(confidence),
                };
                self.inner.attendance.write().await.append(record);
            }
            _ => tracing::debug!(nearest = ?result.distance, "no match"),
        }
        Ok(result)
    }

    pub async fn identity_count(&self) -> usize {
        self.inner.store.read().await.len()
    }

    // --- Attendance ---

    pub async fn attendance(&self) -> Vec<AnalysisRecord> {
        self.inner.attendance.read().await.records().to_vec()
    }

    pub async fn stats(&self) -> Stats {
        let store = self.inner.store.read().await;
        let log = self.inner.attendance.read().await;
        Stats {
            face_count: store.len(),
            analysis_count: log.len(),
            last_analysis: log.last().cloned(),
            attendance_stats: log.by_name(),
        }
    }

    // --- Sessions ---

    pub async fn create_session(&self, duration: Option<f64>) -> Result<SessionInfo, CoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), duration)?;
        let info = session_info(&session);
        self.inner.sessions.write().await.insert(id.clone(), session);
        tracing::info!(session = %id, ?duration, "session created");
        Ok(info)
    }

    /// Append a sample. `Ok(None)` means the session does not exist.
    pub async fn append_sample(
        &self,
        session_id: &str,
        timestamp: f64,
        expressions: EmotionVector,
    ) -> Result<Option<usize>, CoreError> {
        let sample = self.build_sample(timestamp, expressions)?;
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => session.append(sample).map(Some),
            None => Ok(None),
        }
    }

    fn build_sample(
        &self,
        timestamp: f64,
        expressions: EmotionVector,
    ) -> Result<EmotionSample, CoreError> {
        expressions.validate()?;
        let expressions = if self.inner.settings.sharpen_expressions {
            expressions.sharpened()
        } else {
            expressions
        };
        EmotionSample::new(timestamp, expressions)
    }

    /// Snapshot of a session's samples plus its effective duration.
    async fn snapshot(&self, session_id: &str) -> Option<(Vec<EmotionSample>, f64)> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| (s.log().snapshot(), s.effective_duration()))
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.inner.sessions.read().await.get(session_id).map(session_info)
    }

    pub async fn summary(&self, session_id: &str) -> Option<Summary> {
        let (samples, _) = self.snapshot(session_id).await?;
        Some(analytics::summarize(&samples, self.inner.settings.key_moment_threshold))
    }

    pub async fn timeline(
        &self,
        session_id: &str,
        duration: Option<f64>,
    ) -> Option<Vec<TimelineSegment>> {
        let (samples, effective) = self.snapshot(session_id).await?;
        Some(analytics::timeline(&samples, duration.unwrap_or(effective)))
    }

    pub async fn trends(&self, session_id: &str, interval: Option<f64>) -> Option<Vec<TrendBucket>> {
        let (samples, _) = self.snapshot(session_id).await?;
        let interval = interval.unwrap_or(self.inner.settings.trend_interval_secs);
        Some(analytics::emotion_trends(&samples, interval))
    }

    pub async fn key_moments(
        &self,
        session_id: &str,
        threshold: Option<f64>,
    ) -> Option<Vec<KeyMoment>> {
        let (samples, _) = self.snapshot(session_id).await?;
        let threshold = threshold.unwrap_or(self.inner.settings.key_moment_threshold);
        Some(analytics::key_moments(&samples, threshold))
    }

    pub async fn transitions(&self, session_id: &str) -> Option<Vec<Transition>> {
        let (samples, _) = self.snapshot(session_id).await?;
        Some(analytics::transitions(&samples))
    }

    pub async fn report(&self, session_id: &str) -> Option<Report> {
        let (samples, duration) = self.snapshot(session_id).await?;
        Some(analytics::report(&samples, duration, &self.report_options()))
    }

    /// Freeze a session. Returns false for an unknown session.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.close();
                tracing::info!(session = session_id, samples = session.log().len(), "session closed");
                true
            }
            None => false,
        }
    }

    /// Drop a session and its samples. Returns false for an unknown session.
    pub async fn discard_session(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session = session_id, "session discarded");
        }
        removed
    }

    // --- Stored videos ---

    /// Validate and store a whole video's samples, replacing any previous upload
    /// under the same id. Returns the storage timestamp.
    pub async fn store_video(
        &self,
        video_id: &str,
        inputs: Vec<SampleInput>,
        duration: f64,
    ) -> Result<String, CoreError> {
        if video_id.is_empty() {
            return Err(CoreError::Validation("videoId is required".into()));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(CoreError::Validation(format!(
                "duration must be a positive number, got {duration}"
            )));
        }
        let samples = inputs
            .into_iter()
            .map(|i| self.build_sample(i.timestamp, i.expressions))
            .collect::<Result<Vec<_>, _>>()?;

        let timestamp = now_rfc3339();
        let video = StoredVideo {
            video_id: video_id.to_string(),
            summary: analytics::video_summary(&samples),
            emotion_data: samples,
            duration,
            timestamp: timestamp.clone(),
        };
        tracing::info!(
            video = video_id,
            samples = video.emotion_data.len(),
            duration,
            "video analytics stored"
        );
        self.inner
            .videos
            .write()
            .await
            .insert(video_id.to_string(), video);
        Ok(timestamp)
    }

    pub async fn video(&self, video_id: &str) -> Option<StoredVideo> {
        self.inner.videos.read().await.get(video_id).cloned()
    }

    pub async fn video_summaries(&self) -> Vec<VideoSummaryEntry> {
        self.inner
            .videos
            .read()
            .await
            .values()
            .map(|v| VideoSummaryEntry {
                video_id: v.video_id.clone(),
                timestamp: v.timestamp.clone(),
                duration: v.duration,
                summary: v.summary.clone(),
            })
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

fn session_info(session: &Session) -> SessionInfo {
    SessionInfo {
        id: session.id.clone(),
        duration: session.duration,
        sample_count: session.log().len(),
        closed: session.is_closed(),
    }
}
