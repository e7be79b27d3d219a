use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Default Euclidean acceptance threshold for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

/// Dimensionality of the face descriptors produced by the upstream recognition net.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

/// Face descriptor vector (128-dimensional for the upstream recognition net).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f64>,
}

impl Descriptor {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reject empty descriptors and non-finite components.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.values.is_empty() {
            return Err(CoreError::Validation("descriptor is empty".into()));
        }
        if let Some(i) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::Validation(format!(
                "descriptor component {i} is not a finite number"
            )));
        }
        Ok(())
    }

    /// Compute Euclidean distance between two descriptors.
    ///
    /// Mismatched lengths are an error rather than a silent truncation.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Result<f64, CoreError> {
        if self.values.len() != other.values.len() {
            return Err(CoreError::DimensionMismatch {
                expected: other.values.len(),
                actual: self.values.len(),
            });
        }
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt())
    }
}

impl From<Vec<f64>> for Descriptor {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// An enrolled identity. Never mutated after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub descriptor: Descriptor,
}

/// Result of matching a probe descriptor against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Name of the matched identity (if any).
    pub name: Option<String>,
    /// Nearest distance seen across the gallery, even when above threshold.
    /// `None` for an empty gallery.
    pub distance: Option<f64>,
    /// `1 - distance / threshold` for a match.
    pub confidence: Option<f64>,
}

impl MatchResult {
    fn rejected(nearest: Option<f64>) -> Self {
        Self {
            matched: false,
            name: None,
            distance: nearest,
            confidence: None,
        }
    }
}

/// Strategy for comparing a probe descriptor against a gallery of enrolled identities.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Descriptor,
        gallery: &[Identity],
        threshold: f64,
    ) -> Result<MatchResult, CoreError>;
}

/// Linear-scan Euclidean matcher.
///
/// O(identities × dimension) per call. An identity only becomes the best
/// candidate when it is strictly under the threshold and strictly closer than
/// the current best, so the earliest-registered identity wins ties.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Descriptor,
        gallery: &[Identity],
        threshold: f64,
    ) -> Result<MatchResult, CoreError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(CoreError::Validation(format!(
                "match threshold must be a positive number, got {threshold}"
            )));
        }
        probe.validate()?;

        let mut nearest: Option<f64> = None;
        let mut best: Option<(usize, f64)> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&identity.descriptor)?;

            if nearest.map_or(true, |n| distance < n) {
                nearest = Some(distance);
            }

            let closer = best.map_or(true, |(_, d)| distance < d);
            if distance < threshold && closer {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) => Ok(MatchResult {
                matched: true,
                name: Some(gallery[idx].name.clone()),
                distance: Some(distance),
                confidence: Some(1.0 - distance / threshold),
            }),
            None => Ok(MatchResult::rejected(nearest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f64>) -> Identity {
        Identity { name: name.into(), descriptor: Descriptor::new(values) }
    }

    fn zeros(dim: usize) -> Vec<f64> {
        vec![0.0; dim]
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Descriptor::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_euclidean_distance_pythagorean() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Descriptor::new(vec![0.0, 0.0, 0.0]);
        let b = Descriptor::new(vec![0.0, 0.0]);
        assert_eq!(
            a.euclidean_distance(&b),
            Err(CoreError::DimensionMismatch { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_validate_rejects_nan() {
        let d = Descriptor::new(vec![0.0, f64::NAN]);
        assert!(matches!(d.validate(), Err(CoreError::Validation(_))));
        assert!(Descriptor::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_exact_match_has_full_confidence() {
        let gallery = vec![identity("Alice", vec![0.1; DEFAULT_DESCRIPTOR_DIM])];
        let probe = Descriptor::new(vec![0.1; DEFAULT_DESCRIPTOR_DIM]);

        let result = EuclideanMatcher.compare(&probe, &gallery, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert!(result.matched);
        assert_eq!(result.name.as_deref(), Some("Alice"));
        assert_eq!(result.distance, Some(0.0));
        assert_eq!(result.confidence, Some(1.0));
    }

    #[test]
    fn test_small_offset_confidence() {
        let gallery = vec![identity("Alice", zeros(DEFAULT_DESCRIPTOR_DIM))];
        let mut probe = zeros(DEFAULT_DESCRIPTOR_DIM);
        probe[0] = 0.01;

        let result = EuclideanMatcher
            .compare(&Descriptor::new(probe), &gallery, DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.name.as_deref(), Some("Alice"));
        assert!((result.distance.unwrap() - 0.01).abs() < 1e-12);
        assert!((result.confidence.unwrap() - 0.98333).abs() < 1e-4);
    }

    #[test]
    fn test_distance_at_threshold_is_rejected() {
        let gallery = vec![
            identity("far", vec![0.6, 0.0]),
            identity("farther", vec![0.0, 0.9]),
        ];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6).unwrap();
        assert!(!result.matched);
        assert!(result.name.is_none());
        assert!(result.confidence.is_none());
        assert!((result.distance.unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_closest_under_threshold_wins() {
        let gallery = vec![
            identity("decoy", vec![0.5, 0.0]),
            identity("best", vec![0.1, 0.0]),
            identity("middle", vec![0.3, 0.0]),
        ];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.name.as_deref(), Some("best"));
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let gallery = vec![
            identity("first", vec![0.2, 0.0]),
            identity("second", vec![0.0, 0.2]),
        ];
        let probe = Descriptor::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.6).unwrap();
        assert_eq!(result.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_empty_gallery() {
        let probe = Descriptor::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &[], 0.6).unwrap();
        assert!(!result.matched);
        assert_eq!(result.distance, None);
    }

    #[test]
    fn test_probe_dimension_mismatch() {
        let gallery = vec![identity("Alice", zeros(4))];
        let probe = Descriptor::new(zeros(3));
        assert_eq!(
            EuclideanMatcher.compare(&probe, &gallery, 0.6),
            Err(CoreError::DimensionMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let probe = Descriptor::new(vec![0.0]);
        assert!(EuclideanMatcher.compare(&probe, &[], 0.0).is_err());
        assert!(EuclideanMatcher.compare(&probe, &[], f64::NAN).is_err());
    }
}
