use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};

/// Longest track identifier accepted.
pub const MAX_TRACK_LEN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Detection counters shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvCounts {
    pub red: u64,
    pub green: u64,
    pub track: u64,
}

/// The persisted dashboard configuration.
///
/// Every field is always present. Constructing one from untrusted input goes
/// through [`AdminState::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminState {
    pub theme: Theme,
    #[serde(rename = "defaultTrack")]
    pub default_track: String,
    pub cv_counts: CvCounts,
}

impl Default for AdminState {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            default_track: "A".into(),
            cv_counts: CvCounts::default(),
        }
    }
}

impl AdminState {
    /// Check invariants, normalizing the track id to upper case.
    pub fn validate(mut self) -> AdminResult<Self> {
        self.default_track = normalize_track(&self.default_track)?;
        Ok(self)
    }
}

/// Partial counters; absent keys keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CvCountsUpdate {
    pub red: Option<i64>,
    pub green: Option<i64>,
    pub track: Option<i64>,
}

/// A patch against [`AdminState`]. `null` and missing keys are both "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AdminStateUpdate {
    pub theme: Option<Theme>,
    #[serde(rename = "defaultTrack")]
    pub default_track: Option<String>,
    pub cv_counts: Option<CvCountsUpdate>,
}

impl AdminStateUpdate {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.default_track.is_none() && self.cv_counts.is_none()
    }
}

fn normalize_track(track: &str) -> AdminResult<String> {
    if track.is_empty() || track.chars().count() > MAX_TRACK_LEN {
        return Err(AdminError::ValidationError(format!(
            "defaultTrack must be 1-{MAX_TRACK_LEN} characters"
        )));
    }
    if !track.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AdminError::ValidationError(
            "defaultTrack must be alphanumeric".into(),
        ));
    }
    Ok(track.to_ascii_uppercase())
}

fn counter(field: &str, value: Option<i64>, current: u64) -> AdminResult<u64> {
    match value {
        None => Ok(current),
        Some(v) => u64::try_from(v).map_err(|_| {
            AdminError::ValidationError(format!("cv_counts.{field} must be non-negative"))
        }),
    }
}

/// Build the candidate state produced by applying `patch` to `current`.
///
/// Pure: `current` is not touched, and the returned value already satisfies
/// every [`AdminState`] invariant.
pub fn merge(current: &AdminState, patch: &AdminStateUpdate) -> AdminResult<AdminState> {
    let mut next = current.clone();

    if let Some(theme) = patch.theme {
        next.theme = theme;
    }
    if let Some(ref track) = patch.default_track {
        next.default_track = track.clone();
    }
    if let Some(counts) = patch.cv_counts {
        next.cv_counts = CvCounts {
            red: counter("red", counts.red, current.cv_counts.red)?,
            green: counter("green", counts.green, current.cv_counts.green)?,
            track: counter("track", counts.track, current.cv_counts.track)?,
        };
    }

    next.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(red: u64, green: u64, track: u64) -> AdminState {
        AdminState {
            cv_counts: CvCounts { red, green, track },
            ..AdminState::default()
        }
    }

    fn patch(v: serde_json::Value) -> AdminStateUpdate {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn default_shape_serializes_like_the_dashboard_expects() {
        let v = serde_json::to_value(AdminState::default()).unwrap();
        assert_eq!(
            v,
            json!({
                "theme": "light",
                "defaultTrack": "A",
                "cv_counts": {"red": 0, "green": 0, "track": 0}
            })
        );
    }

    #[test]
    fn counters_merge_shallowly() {
        let cur = state(1, 2, 3);
        let next = merge(&cur, &patch(json!({"cv_counts": {"red": 5}}))).unwrap();
        assert_eq!(next.cv_counts, CvCounts { red: 5, green: 2, track: 3 });
        assert_eq!(cur.cv_counts.red, 1);
    }

    #[test]
    fn absent_fields_unchanged() {
        let cur = state(1, 2, 3);
        let next = merge(&cur, &patch(json!({"theme": "dark"}))).unwrap();
        assert_eq!(next.theme, Theme::Dark);
        assert_eq!(next.default_track, "A");
        assert_eq!(next.cv_counts, cur.cv_counts);
    }

    #[test]
    fn null_means_unchanged() {
        let cur = state(1, 2, 3);
        let next = merge(
            &cur,
            &patch(json!({"theme": null, "defaultTrack": null, "cv_counts": {"green": null}})),
        )
        .unwrap();
        assert_eq!(next, cur);
    }

    #[test]
    fn unknown_keys_ignored() {
        let p = patch(json!({"volume": 11, "defaultTrack": "b"}));
        assert_eq!(p.default_track.as_deref(), Some("b"));
    }

    #[test]
    fn track_is_uppercased() {
        let next = merge(&AdminState::default(), &patch(json!({"defaultTrack": "b2"}))).unwrap();
        assert_eq!(next.default_track, "B2");
    }

    #[test]
    fn track_rules() {
        let cur = AdminState::default();
        for bad in ["", "   ", "A-1", "trackwithtoomanychars", "b c", "ü"] {
            let err = merge(&cur, &patch(json!({"defaultTrack": bad}))).unwrap_err();
            assert!(matches!(err, AdminError::ValidationError(_)), "{bad:?}");
        }
        assert!(merge(&cur, &patch(json!({"defaultTrack": "ABCDEFGHIJ"}))).is_ok());
    }

    #[test]
    fn negative_counter_rejected() {
        let err = merge(&state(1, 2, 3), &patch(json!({"cv_counts": {"track": -1}}))).unwrap_err();
        assert!(matches!(err, AdminError::ValidationError(_)));
    }

    #[test]
    fn bad_theme_fails_to_parse() {
        let r: Result<AdminStateUpdate, _> = serde_json::from_value(json!({"theme": "sepia"}));
        assert!(r.is_err());
    }

    #[test]
    fn loaded_state_is_validated() {
        let raw: AdminState = serde_json::from_value(json!({
            "theme": "dark",
            "defaultTrack": "c",
            "cv_counts": {"red": 1, "green": 2, "track": 3}
        }))
        .unwrap();
        assert_eq!(raw.validate().unwrap().default_track, "C");
    }
}
