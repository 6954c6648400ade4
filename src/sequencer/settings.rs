// Settings - Measure sequence, global defaults and effective parameters
// Validated once at ingestion so the scheduler never sees out-of-domain values

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of a single step in a measure pattern
/// Selects both the gain bus and the voice that renders the step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Silent,
    Subdivision,
    Beat,
    #[serde(alias = "accent")]
    AccentedBeat,
}

impl StepKind {
    /// Beat and accented beat are rendered by the beat voice
    pub fn uses_beat_voice(&self) -> bool {
        matches!(self, StepKind::Beat | StepKind::AccentedBeat)
    }

    pub fn is_audible(&self) -> bool {
        !matches!(self, StepKind::Silent)
    }
}

/// One measure: a beats x subdivisions grid with optional parameter overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub beats: u32,
    pub subdivisions: u32,
    pub pattern: Vec<StepKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_sound_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision_sound_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_volume: Option<f32>,
}

impl Measure {
    /// Create a measure with an explicit pattern and no overrides
    pub fn new(beats: u32, subdivisions: u32, pattern: Vec<StepKind>) -> Self {
        Self {
            beats,
            subdivisions,
            pattern,
            bpm: None,
            swing: None,
            beat_sound_id: None,
            subdivision_sound_id: None,
            accent_volume: None,
            beat_volume: None,
        }
    }

    /// Standard pattern: accent on beat 1, beats on the others, subdivisions in between
    pub fn with_default_pattern(beats: u32, subdivisions: u32) -> Self {
        let total = beats as usize * subdivisions as usize;
        let pattern = (0..total)
            .map(|i| {
                if subdivisions > 0 && i % subdivisions as usize != 0 {
                    StepKind::Subdivision
                } else if i == 0 {
                    StepKind::AccentedBeat
                } else {
                    StepKind::Beat
                }
            })
            .collect();
        Self::new(beats, subdivisions, pattern)
    }

    /// Count-in measure: one click per beat, first one accented
    pub fn count_in(beats: u32) -> Self {
        Self::with_default_pattern(beats, 1)
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn with_swing(mut self, swing: f64) -> Self {
        self.swing = Some(swing);
        self
    }

    pub fn with_sounds(mut self, beat: &str, subdivision: &str) -> Self {
        self.beat_sound_id = Some(beat.to_string());
        self.subdivision_sound_id = Some(subdivision.to_string());
        self
    }

    /// Geometry invariant: beats, subdivisions > 0 and pattern length == beats * subdivisions
    pub fn is_valid(&self) -> bool {
        self.beats > 0
            && self.subdivisions > 0
            && self.pattern.len() == self.beats as usize * self.subdivisions as usize
    }

    /// Number of schedulable steps; an invalid measure counts as empty
    pub fn step_count(&self) -> usize {
        if self.is_valid() {
            self.pattern.len()
        } else {
            0
        }
    }

    pub fn step_kind(&self, step: usize) -> Option<StepKind> {
        if self.is_valid() {
            self.pattern.get(step).copied()
        } else {
            None
        }
    }
}

/// Global defaults applied when a measure carries no override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    pub bpm: f64,
    pub swing: f64,
    pub master_volume: f32,
    pub beat_sound_id: String,
    pub subdivision_sound_id: String,
    pub accent_volume: f32,
    pub beat_volume: f32,
    pub subdivision_volume: f32,
    pub count_in: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            swing: 0.0,
            master_volume: 0.8,
            beat_sound_id: "click".to_string(),
            subdivision_sound_id: "click".to_string(),
            accent_volume: 1.0,
            beat_volume: 0.8,
            subdivision_volume: 0.5,
            count_in: false,
            looping: true,
        }
    }
}

/// Complete value pushed by the settings source on every edit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub defaults: PlaybackDefaults,
    pub measures: Vec<Measure>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid tempo {bpm} in {context}: must be a finite value > 0")]
    InvalidTempo { bpm: f64, context: String },

    #[error("Invalid swing {swing} in {context}: must be in [0, 1)")]
    InvalidSwing { swing: f64, context: String },

    #[error("Invalid {name} {value} in {context}: must be in [0, 1]")]
    InvalidVolume {
        name: &'static str,
        value: f32,
        context: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

fn check_bpm(bpm: f64, context: &str) -> Result<(), SettingsError> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::InvalidTempo {
            bpm,
            context: context.to_string(),
        })
    }
}

fn check_swing(swing: f64, context: &str) -> Result<(), SettingsError> {
    if (0.0..1.0).contains(&swing) {
        Ok(())
    } else {
        Err(SettingsError::InvalidSwing {
            swing,
            context: context.to_string(),
        })
    }
}

fn check_volume(name: &'static str, value: f32, context: &str) -> Result<(), SettingsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidVolume {
            name,
            value,
            context: context.to_string(),
        })
    }
}

impl Settings {
    pub fn new(defaults: PlaybackDefaults, measures: Vec<Measure>) -> Self {
        Self { defaults, measures }
    }

    /// Parse settings from JSON (as produced by the settings source)
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_ron(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a `.json` or `.ron` file (RON for any other extension)
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_ron(&text),
        }
    }

    /// Reject out-of-domain values before they reach the scheduler
    /// Invalid measure geometry is not an error: such measures are skipped
    pub fn validate(&self) -> Result<(), SettingsError> {
        let d = &self.defaults;
        check_bpm(d.bpm, "defaults")?;
        check_swing(d.swing, "defaults")?;
        check_volume("master_volume", d.master_volume, "defaults")?;
        check_volume("accent_volume", d.accent_volume, "defaults")?;
        check_volume("beat_volume", d.beat_volume, "defaults")?;
        check_volume("subdivision_volume", d.subdivision_volume, "defaults")?;

        for (index, measure) in self.measures.iter().enumerate() {
            let context = format!("measure {}", index);
            if let Some(bpm) = measure.bpm {
                check_bpm(bpm, &context)?;
            }
            if let Some(swing) = measure.swing {
                check_swing(swing, &context)?;
            }
            if let Some(volume) = measure.accent_volume {
                check_volume("accent_volume", volume, &context)?;
            }
            if let Some(volume) = measure.beat_volume {
                check_volume("beat_volume", volume, &context)?;
            }
        }
        Ok(())
    }

    /// Sum of step counts of measures strictly before `index`
    pub fn steps_before(&self, index: usize) -> u64 {
        self.measures
            .iter()
            .take(index)
            .map(|m| m.step_count() as u64)
            .sum()
    }

    pub fn total_steps(&self) -> u64 {
        self.steps_before(self.measures.len())
    }

    /// Measure index a loop wraps back to (the count-in is never replayed)
    pub fn loop_restart_index(&self) -> usize {
        if self.defaults.count_in && self.measures.len() > 1 {
            1
        } else {
            0
        }
    }

    /// Steps in one loop cycle, excluding the count-in measure
    pub fn loop_steps(&self) -> u64 {
        self.total_steps() - self.steps_before(self.loop_restart_index())
    }

    pub fn has_playable_measure(&self) -> bool {
        self.measures.iter().any(|m| m.step_count() > 0)
    }
}

/// Parameters of one measure after applying overrides over the global defaults
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveParams {
    pub bpm: f64,
    pub swing: f64,
    pub beat_sound_id: String,
    pub subdivision_sound_id: String,
    pub accent_volume: f32,
    pub beat_volume: f32,
    pub subdivision_volume: f32,
}

impl EffectiveParams {
    /// Two-level inheritance: measure override ?? global default
    pub fn resolve(measure: Option<&Measure>, defaults: &PlaybackDefaults) -> Self {
        Self {
            bpm: measure.and_then(|m| m.bpm).unwrap_or(defaults.bpm),
            swing: measure.and_then(|m| m.swing).unwrap_or(defaults.swing),
            beat_sound_id: measure
                .and_then(|m| m.beat_sound_id.clone())
                .unwrap_or_else(|| defaults.beat_sound_id.clone()),
            subdivision_sound_id: measure
                .and_then(|m| m.subdivision_sound_id.clone())
                .unwrap_or_else(|| defaults.subdivision_sound_id.clone()),
            accent_volume: measure
                .and_then(|m| m.accent_volume)
                .unwrap_or(defaults.accent_volume),
            beat_volume: measure
                .and_then(|m| m.beat_volume)
                .unwrap_or(defaults.beat_volume),
            subdivision_volume: defaults.subdivision_volume,
        }
    }

    /// Resolve every measure of a sequence
    pub fn resolve_all(settings: &Settings) -> Vec<Self> {
        settings
            .measures
            .iter()
            .map(|m| Self::resolve(Some(m), &settings.defaults))
            .collect()
    }

    pub fn sound_for(&self, kind: StepKind) -> &str {
        if kind.uses_beat_voice() {
            &self.beat_sound_id
        } else {
            &self.subdivision_sound_id
        }
    }

    /// Gain bus level for a step kind
    pub fn volume_for(&self, kind: StepKind) -> f32 {
        match kind {
            StepKind::AccentedBeat => self.accent_volume,
            StepKind::Beat => self.beat_volume,
            StepKind::Subdivision => self.subdivision_volume,
            StepKind::Silent => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_layout() {
        let measure = Measure::with_default_pattern(4, 4);
        assert_eq!(measure.pattern.len(), 16);
        assert_eq!(measure.pattern[0], StepKind::AccentedBeat);
        assert_eq!(measure.pattern[4], StepKind::Beat);
        assert_eq!(measure.pattern[8], StepKind::Beat);
        assert_eq!(measure.pattern[12], StepKind::Beat);
        assert_eq!(measure.pattern[1], StepKind::Subdivision);
        assert!(measure.is_valid());
    }

    #[test]
    fn test_invalid_geometry_counts_as_empty() {
        let short = Measure::new(4, 2, vec![StepKind::Beat; 7]);
        assert!(!short.is_valid());
        assert_eq!(short.step_count(), 0);
        assert_eq!(short.step_kind(0), None);

        let zero_beats = Measure::new(0, 4, vec![]);
        assert_eq!(zero_beats.step_count(), 0);
    }

    #[test]
    fn test_validation_rejects_out_of_domain_values() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.defaults.swing = 1.0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidSwing { .. })
        ));

        settings.defaults.swing = 0.2;
        settings.defaults.bpm = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidTempo { .. })
        ));

        settings.defaults.bpm = 90.0;
        settings.measures = vec![Measure::with_default_pattern(3, 1).with_bpm(-10.0)];
        match settings.validate() {
            Err(SettingsError::InvalidTempo { context, .. }) => assert_eq!(context, "measure 0"),
            other => panic!("unexpected result: {:?}", other),
        }

        settings.measures = vec![Measure::with_default_pattern(3, 1)];
        settings.defaults.master_volume = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidVolume { name: "master_volume", .. })
        ));
    }

    #[test]
    fn test_effective_params_inheritance() {
        let defaults = PlaybackDefaults::default();
        let measure = Measure::with_default_pattern(4, 2)
            .with_bpm(90.0)
            .with_sounds("woodblock", "hihat");

        let params = EffectiveParams::resolve(Some(&measure), &defaults);
        assert_eq!(params.bpm, 90.0);
        assert_eq!(params.swing, defaults.swing);
        assert_eq!(params.beat_sound_id, "woodblock");
        assert_eq!(params.sound_for(StepKind::Subdivision), "hihat");
        assert_eq!(params.sound_for(StepKind::AccentedBeat), "woodblock");
        assert_eq!(params.volume_for(StepKind::Beat), defaults.beat_volume);
        assert_eq!(params.volume_for(StepKind::Silent), 0.0);

        let global = EffectiveParams::resolve(None, &defaults);
        assert_eq!(global.bpm, 120.0);
    }

    #[test]
    fn test_json_tolerates_missing_overrides() {
        let json = r#"{
            "defaults": { "bpm": 100.0, "loop": false, "count_in": true },
            "measures": [
                { "beats": 2, "subdivisions": 1, "pattern": ["accent", "beat"] },
                { "beats": 1, "subdivisions": 2, "pattern": ["beat", "silent"], "swing": 0.3 }
            ]
        }"#;

        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.defaults.bpm, 100.0);
        assert!(!settings.defaults.looping);
        assert!(settings.defaults.count_in);
        assert_eq!(settings.defaults.beat_sound_id, "click");
        assert_eq!(settings.measures[0].pattern[0], StepKind::AccentedBeat);
        assert_eq!(settings.measures[0].bpm, None);
        assert_eq!(settings.measures[1].swing, Some(0.3));
    }

    #[test]
    fn test_json_rejects_invalid_swing() {
        let json = r#"{ "defaults": { "swing": 1.2 }, "measures": [] }"#;
        assert!(matches!(
            Settings::from_json(json),
            Err(SettingsError::InvalidSwing { .. })
        ));
    }

    #[test]
    fn test_ron_settings() {
        let text = r#"(
            defaults: (bpm: 140.0, beat_sound_id: "cowbell"),
            measures: [
                (beats: 3, subdivisions: 1, pattern: [accented_beat, beat, beat]),
            ],
        )"#;
        let settings = Settings::from_ron(text).unwrap();
        assert_eq!(settings.defaults.bpm, 140.0);
        assert_eq!(settings.defaults.beat_sound_id, "cowbell");
        assert_eq!(settings.measures[0].step_count(), 3);
    }

    #[test]
    fn test_step_totals_and_loop_steps() {
        let mut settings = Settings::new(
            PlaybackDefaults::default(),
            vec![
                Measure::count_in(4),
                Measure::with_default_pattern(4, 4),
                Measure::new(4, 4, vec![]),
                Measure::with_default_pattern(3, 2),
            ],
        );
        assert_eq!(settings.steps_before(0), 0);
        assert_eq!(settings.steps_before(2), 20);
        assert_eq!(settings.total_steps(), 26);
        assert_eq!(settings.loop_steps(), 26);

        settings.defaults.count_in = true;
        assert_eq!(settings.loop_restart_index(), 1);
        assert_eq!(settings.loop_steps(), 22);
    }
}
