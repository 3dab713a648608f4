//! Compare-engine configuration and the controller that drives it. The
//! engine itself is an external capability: the controller builds requests,
//! tags each with a monotonically increasing generation, and discards any
//! completion whose generation is no longer the latest issued. There is no
//! cancellation of in-flight work; stale results are simply dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{DiffConfig, DiffResult};
use crate::geometry::Rect;
use crate::regions::Region;
use crate::SessionError;

/// Resemble-style antialiasing escape hatch: above this dimension the
/// per-pixel antialiasing test is skipped.
pub const LARGE_IMAGE_THRESHOLD: u32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreLevel {
    Nothing,
    #[default]
    Less,
    Colors,
    Antialiasing,
    Alpha,
}

impl IgnoreLevel {
    /// Unknown values are a configuration error, not a silent no-op.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nothing" => Ok(IgnoreLevel::Nothing),
            "less" => Ok(IgnoreLevel::Less),
            "colors" => Ok(IgnoreLevel::Colors),
            "antialiasing" => Ok(IgnoreLevel::Antialiasing),
            "alpha" => Ok(IgnoreLevel::Alpha),
            other => Err(SessionError::InvalidConfiguration(format!(
                "unknown ignore option: {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreLevel::Nothing => "nothing",
            IgnoreLevel::Less => "less",
            IgnoreLevel::Colors => "colors",
            IgnoreLevel::Antialiasing => "antialiasing",
            IgnoreLevel::Alpha => "alpha",
        }
    }
}

impl fmt::Display for IgnoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel tolerance overrides. Only channels actually present are
/// applied on top of the ignore-level preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tolerances {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub red: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub green: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub blue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alpha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_brightness: Option<f64>,
}

impl Tolerances {
    pub fn is_empty(&self) -> bool {
        self.red.is_none()
            && self.green.is_none()
            && self.blue.is_none()
            && self.alpha.is_none()
            && self.min_brightness.is_none()
            && self.max_brightness.is_none()
    }

    pub fn set(&mut self, channel: &str, value: f64) -> Result<(), SessionError> {
        match channel {
            "red" => self.red = Some(value),
            "green" => self.green = Some(value),
            "blue" => self.blue = Some(value),
            "alpha" => self.alpha = Some(value),
            "minBrightness" => self.min_brightness = Some(value),
            "maxBrightness" => self.max_brightness = Some(value),
            other => {
                return Err(SessionError::InvalidConfiguration(format!(
                    "unknown tolerance channel: {other}"
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Magenta,
    Yellow,
}

impl HighlightColor {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            HighlightColor::Magenta => [255, 0, 255],
            HighlightColor::Yellow => [255, 255, 0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    #[default]
    Opaque,
    Faded,
}

impl Transparency {
    pub fn value(self) -> f64 {
        match self {
            Transparency::Opaque => 1.0,
            Transparency::Faded => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    #[default]
    #[serde(rename = "flat")]
    Flat,
    #[serde(rename = "movement")]
    Movement,
    #[serde(rename = "flatDifferenceIntensity")]
    FlatDifferenceIntensity,
    #[serde(rename = "movementDifferenceIntensity")]
    MovementDifferenceIntensity,
    #[serde(rename = "diffOnly")]
    DiffOnly,
}

impl OutputMode {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        match raw.trim() {
            "flat" => Ok(OutputMode::Flat),
            "movement" => Ok(OutputMode::Movement),
            "flatDifferenceIntensity" => Ok(OutputMode::FlatDifferenceIntensity),
            "movementDifferenceIntensity" => Ok(OutputMode::MovementDifferenceIntensity),
            "diffOnly" => Ok(OutputMode::DiffOnly),
            other => Err(SessionError::InvalidConfiguration(format!(
                "unknown output mode: {other}"
            ))),
        }
    }
}

/// Color of baseline areas excluded from comparison, keys `r`/`g`/`b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub ignored_boxes: Vec<Rect>,
    pub large_image_threshold: u32,
    pub ignore_areas_colored_with: Option<Rgb>,
    pub error_color: HighlightColor,
    pub transparency: Transparency,
    pub error_type: OutputMode,
}

/// One configured engine invocation. `generation` makes the completion
/// attributable when it eventually arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareRequest {
    pub generation: u64,
    pub baseline: String,
    pub latest: String,
    pub ignore: IgnoreLevel,
    pub tolerances: Tolerances,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompareCompletion {
    pub generation: u64,
    /// Rendered diff image reference: a file path or a data URL.
    pub image: Option<String>,
    pub mismatch_percentage: f64,
}

/// External pixel-comparison capability. The host schedules the call;
/// latency and completion ordering are outside this core's control.
pub trait CompareEngine {
    fn repaint(&mut self, request: &CompareRequest) -> anyhow::Result<CompareCompletion>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The completion matched the latest issued generation and was applied.
    /// `first_paint` is true exactly once per session: the host must then
    /// materialize the seeded regions into interactive elements.
    Applied { first_paint: bool },
    /// Superseded by a newer request; discarded without touching state.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CompareController {
    baseline: String,
    latest: String,
    ignore: IgnoreLevel,
    original_ignore: IgnoreLevel,
    tolerances: Tolerances,
    highlight: HighlightColor,
    transparency: Transparency,
    output_mode: OutputMode,
    ignore_areas_colored_with: Option<Rgb>,
    generation: u64,
    first_paint_done: bool,
    last_mismatch_percentage: f64,
}

impl CompareController {
    pub fn new(result: &DiffResult, config: &DiffConfig) -> Result<Self, SessionError> {
        let ignore = match &config.ignore {
            Some(raw) => IgnoreLevel::parse(raw)?,
            None => IgnoreLevel::Less,
        };
        Ok(CompareController {
            baseline: result.baseline.clone(),
            latest: result.latest.clone(),
            ignore,
            original_ignore: ignore,
            tolerances: config.tolerances.unwrap_or_default(),
            highlight: HighlightColor::default(),
            transparency: Transparency::default(),
            output_mode: OutputMode::default(),
            ignore_areas_colored_with: config.ignore_areas_colored_with,
            generation: 0,
            first_paint_done: false,
            last_mismatch_percentage: 100.0,
        })
    }

    pub fn ignore(&self) -> IgnoreLevel {
        self.ignore
    }

    /// The session's ignore level as originally configured, which gates
    /// whether custom tolerances survive into the exported config.
    pub fn original_ignore(&self) -> IgnoreLevel {
        self.original_ignore
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    pub fn set_ignore(&mut self, level: IgnoreLevel) {
        self.ignore = level;
    }

    pub fn set_tolerance(&mut self, channel: &str, value: f64) -> Result<(), SessionError> {
        self.tolerances.set(channel, value)
    }

    pub fn set_highlight(&mut self, color: HighlightColor) {
        self.highlight = color;
    }

    pub fn set_transparency(&mut self, transparency: Transparency) {
        self.transparency = transparency;
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
    }

    pub fn last_mismatch_percentage(&self) -> f64 {
        self.last_mismatch_percentage
    }

    /// Issues a new generation and builds the request for the current
    /// configuration and region set.
    pub fn request_repaint(&mut self, regions: &[Region]) -> CompareRequest {
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            regions = regions.len(),
            ignore = %self.ignore,
            "issuing compare repaint"
        );
        CompareRequest {
            generation: self.generation,
            baseline: self.baseline.clone(),
            latest: self.latest.clone(),
            ignore: self.ignore,
            tolerances: self.tolerances,
            output: OutputSettings {
                ignored_boxes: regions.iter().map(Region::rect).collect(),
                large_image_threshold: LARGE_IMAGE_THRESHOLD,
                ignore_areas_colored_with: self.ignore_areas_colored_with,
                error_color: self.highlight,
                transparency: self.transparency,
                error_type: self.output_mode,
            },
        }
    }

    /// Last-issued-wins: a completion is applied only if its generation is
    /// still the latest one handed out by `request_repaint`.
    pub fn apply_completion(&mut self, completion: &CompareCompletion) -> CompletionOutcome {
        if completion.generation != self.generation {
            tracing::warn!(
                completion = completion.generation,
                latest = self.generation,
                "discarding stale compare completion"
            );
            return CompletionOutcome::Stale;
        }
        self.last_mismatch_percentage = completion.mismatch_percentage;
        let first_paint = !self.first_paint_done;
        self.first_paint_done = true;
        CompletionOutcome::Applied { first_paint }
    }
}

/// Engine selection parsed from the configured engine string. A `|` chain
/// stops as soon as the mismatch drops below the failure threshold; a `,`
/// chain always runs every engine. The minimum mismatch across the chain
/// wins either way.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineChain {
    pub engines: Vec<String>,
    pub stop_when_mismatch_is_less_than: f64,
}

pub fn parse_engine_chain(raw: &str, failure_threshold: f64) -> EngineChain {
    let cleaned: String = raw
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == ',' || *c == '|')
        .collect();

    if cleaned.contains('|') {
        EngineChain {
            engines: cleaned
                .split('|')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            stop_when_mismatch_is_less_than: failure_threshold,
        }
    } else {
        EngineChain {
            engines: cleaned
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            stop_when_mismatch_is_less_than: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchVerdict {
    pub mismatch_percentage: f64,
    pub failure_threshold: f64,
    pub is_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A comparison passes when nothing mismatched at all or the mismatch stays
/// under the failure threshold.
pub fn check_mismatch(mismatch_percentage: f64, failure_threshold: f64) -> MismatchVerdict {
    let pass = mismatch_percentage <= 0.0 || mismatch_percentage < failure_threshold;
    MismatchVerdict {
        mismatch_percentage,
        failure_threshold,
        is_mismatch: !pass,
        error: (!pass).then(|| {
            format!(
                "latest image differed from baseline more than allowable threshold: \
                 {mismatch_percentage}% >= {failure_threshold}%"
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> DiffResult {
        DiffResult {
            baseline: "baseline.png".to_string(),
            latest: "latest.png".to_string(),
            engine: "resemble".to_string(),
            default_engine: "resemble".to_string(),
            failure_threshold: 0.0,
            default_failure_threshold: 0.0,
            ssim_mismatch_percentage: None,
        }
    }

    fn controller() -> CompareController {
        CompareController::new(&result(), &DiffConfig::default()).unwrap()
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut ctl = controller();
        let first = ctl.request_repaint(&[]);
        let second = ctl.request_repaint(&[]);
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);

        let stale = CompareCompletion {
            generation: first.generation,
            image: None,
            mismatch_percentage: 3.0,
        };
        assert_eq!(ctl.apply_completion(&stale), CompletionOutcome::Stale);
        assert_eq!(ctl.last_mismatch_percentage(), 100.0);

        let fresh = CompareCompletion {
            generation: second.generation,
            image: None,
            mismatch_percentage: 1.5,
        };
        assert_eq!(
            ctl.apply_completion(&fresh),
            CompletionOutcome::Applied { first_paint: true }
        );
        assert_eq!(ctl.last_mismatch_percentage(), 1.5);
    }

    #[test]
    fn first_paint_fires_exactly_once() {
        let mut ctl = controller();
        let req = ctl.request_repaint(&[]);
        let completion = CompareCompletion {
            generation: req.generation,
            image: None,
            mismatch_percentage: 0.0,
        };
        assert_eq!(
            ctl.apply_completion(&completion),
            CompletionOutcome::Applied { first_paint: true }
        );

        let req = ctl.request_repaint(&[]);
        let completion = CompareCompletion {
            generation: req.generation,
            image: None,
            mismatch_percentage: 0.0,
        };
        assert_eq!(
            ctl.apply_completion(&completion),
            CompletionOutcome::Applied { first_paint: false }
        );
    }

    #[test]
    fn unknown_ignore_option_is_rejected() {
        let config = DiffConfig {
            ignore: Some("everything".to_string()),
            ..DiffConfig::default()
        };
        let err = CompareController::new(&result(), &config).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfiguration(_)));
        assert!(IgnoreLevel::parse("Antialiasing").is_ok());
    }

    #[test]
    fn unknown_tolerance_channel_is_rejected() {
        let mut ctl = controller();
        assert!(ctl.set_tolerance("red", 32.0).is_ok());
        assert!(ctl.set_tolerance("cyan", 32.0).is_err());
        assert_eq!(ctl.tolerances().red, Some(32.0));
    }

    #[test]
    fn request_carries_current_settings() {
        let mut ctl = controller();
        ctl.set_ignore(IgnoreLevel::Colors);
        ctl.set_highlight(HighlightColor::Yellow);
        ctl.set_transparency(Transparency::Faded);
        ctl.set_output_mode(OutputMode::DiffOnly);
        let req = ctl.request_repaint(&[]);
        assert_eq!(req.ignore, IgnoreLevel::Colors);
        assert_eq!(req.output.error_color, HighlightColor::Yellow);
        assert_eq!(req.output.transparency, Transparency::Faded);
        assert_eq!(req.output.error_type, OutputMode::DiffOnly);
    }

    #[test]
    fn pipe_chain_stops_early_comma_chain_does_not() {
        let piped = parse_engine_chain("resemble|ssim", 2.5);
        assert_eq!(piped.engines, vec!["resemble", "ssim"]);
        assert_eq!(piped.stop_when_mismatch_is_less_than, 2.5);

        let listed = parse_engine_chain("Resemble, SSIM!", 2.5);
        assert_eq!(listed.engines, vec!["resemble", "ssim"]);
        assert_eq!(listed.stop_when_mismatch_is_less_than, -1.0);
    }

    #[test]
    fn mismatch_verdict_boundaries() {
        assert!(!check_mismatch(0.0, 0.0).is_mismatch);
        assert!(!check_mismatch(1.0, 2.0).is_mismatch);
        let failed = check_mismatch(5.0, 5.0);
        assert!(failed.is_mismatch);
        assert!(failed.error.unwrap().contains("5% >= 5%"));
    }
}
