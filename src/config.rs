//! Caller-supplied comparison inputs and the minimal override config derived
//! from them. `minimal_overrides` is the value behind the "show config" and
//! rebase workflows: only settings that differ from the defaults survive
//! into the export, so an untouched session produces an empty object.

use serde::{Deserialize, Serialize};

use crate::compare::{IgnoreLevel, Rgb, Tolerances};
use crate::geometry::Rect;
use crate::regions::Region;
use crate::SessionError;

fn default_engine_name() -> String {
    "resemble".to_string()
}

/// Per-comparison configuration, supplied once at session start. Raw boxes
/// are normalized and tagged with ids when the session seeds its store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffConfig {
    pub ignore: Option<String>,
    pub tolerances: Option<Tolerances>,
    pub ignored_boxes: Vec<Rect>,
    pub ignore_areas_colored_with: Option<Rgb>,
}

/// Immutable comparison outcome data handed to the session by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub baseline: String,
    pub latest: String,
    #[serde(default = "default_engine_name")]
    pub engine: String,
    #[serde(default = "default_engine_name")]
    pub default_engine: String,
    #[serde(default)]
    pub failure_threshold: f64,
    #[serde(default)]
    pub default_failure_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssim_mismatch_percentage: Option<f64>,
}

/// Exported ignored box, id dropped, coordinates rounded to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBox {
    pub top: i64,
    pub left: i64,
    pub bottom: i64,
    pub right: i64,
}

impl From<&Region> for ExportBox {
    fn from(region: &Region) -> Self {
        ExportBox {
            top: region.top.round() as i64,
            left: region.left.round() as i64,
            bottom: region.bottom.round() as i64,
            right: region.right.round() as i64,
        }
    }
}

/// Minimal override object. Field order is fixed for reproducible output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<IgnoreLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerances: Option<Tolerances>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_areas_colored_with: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_boxes: Option<Vec<ExportBox>>,
}

impl DiffOptions {
    pub fn is_empty(&self) -> bool {
        self.engine.is_none()
            && self.failure_threshold.is_none()
            && self.ignore.is_none()
            && self.tolerances.is_none()
            && self.ignore_areas_colored_with.is_none()
            && self.ignored_boxes.is_none()
    }
}

/// Live UI selection state at export time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiState<'a> {
    pub ignore: IgnoreLevel,
    pub tolerances: Tolerances,
    pub regions: &'a [Region],
}

/// Computes the minimal override relative to defaults. Invoked on demand,
/// not on every mutation.
pub fn minimal_overrides(
    result: &DiffResult,
    config: &DiffConfig,
    ui: &UiState<'_>,
) -> Result<DiffOptions, SessionError> {
    let original_ignore = match &config.ignore {
        Some(raw) => IgnoreLevel::parse(raw)?,
        None => IgnoreLevel::Less,
    };

    let mut out = DiffOptions::default();
    if result.engine != result.default_engine {
        out.engine = Some(result.engine.clone());
    }
    if result.failure_threshold != result.default_failure_threshold {
        out.failure_threshold = Some(result.failure_threshold);
    }
    if ui.ignore != IgnoreLevel::Less {
        out.ignore = Some(ui.ignore);
    }
    // Tolerances only make sense against the ignore level they were tuned
    // for; a changed selection drops them.
    if ui.ignore == original_ignore && !ui.tolerances.is_empty() {
        out.tolerances = Some(ui.tolerances);
    }
    if let Some(color) = config.ignore_areas_colored_with {
        out.ignore_areas_colored_with = Some(color);
    }
    if !ui.regions.is_empty() {
        out.ignored_boxes = Some(ui.regions.iter().map(ExportBox::from).collect());
    }
    Ok(out)
}

/// Name for the downloaded "latest" artifact: the format comes from the
/// embedded MIME declaration of a data URL, or the file extension of a
/// plain path, defaulting to png.
pub fn download_file_name(image_ref: &str) -> String {
    let format = image_ref
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split(';').next())
        .or_else(|| {
            image_ref
                .rsplit_once('.')
                .map(|(_, ext)| ext)
                .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        })
        .filter(|f| !f.is_empty())
        .unwrap_or("png");
    format!("latest.{format}")
}

/// Renders the export for the "show config" workflow, delegating to the
/// caller's hook when one is supplied.
pub fn show_config(
    options: &DiffOptions,
    hook: Option<&dyn Fn(&str, &DiffOptions) -> String>,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(options)?;
    Ok(match hook {
        Some(hook) => hook(&json, options),
        None => json,
    })
}

/// The rebase workflow: the hook receives the minimal config plus a download
/// trigger for the latest image, and may return replacement text. Without a
/// hook the caller falls back to its default presentation.
pub fn show_rebase(
    options: &DiffOptions,
    download: &dyn Fn(),
    hook: Option<&dyn Fn(&DiffOptions, &dyn Fn()) -> Option<String>>,
) -> Option<String> {
    match hook {
        Some(hook) => hook(options, download),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> DiffResult {
        DiffResult {
            baseline: "data:image/png;base64,xxxx".to_string(),
            latest: "data:image/png;base64,yyyy".to_string(),
            engine: "resemble".to_string(),
            default_engine: "resemble".to_string(),
            failure_threshold: 0.0,
            default_failure_threshold: 0.0,
            ssim_mismatch_percentage: None,
        }
    }

    fn region(id: u64, left: f64, top: f64, right: f64, bottom: f64) -> Region {
        Region {
            id,
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn unmodified_session_exports_nothing() {
        let options = minimal_overrides(
            &result(),
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Less,
                tolerances: Tolerances::default(),
                regions: &[],
            },
        )
        .unwrap();
        assert!(options.is_empty());
        assert_eq!(serde_json::to_string(&options).unwrap(), "{}");
    }

    #[test]
    fn changed_ignore_is_the_only_export() {
        let options = minimal_overrides(
            &result(),
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Colors,
                tolerances: Tolerances::default(),
                regions: &[],
            },
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&options).unwrap(),
            r#"{"ignore":"colors"}"#
        );
    }

    #[test]
    fn tolerances_survive_only_with_unchanged_ignore() {
        let tolerances = Tolerances {
            red: Some(32.0),
            ..Tolerances::default()
        };
        let unchanged = minimal_overrides(
            &result(),
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Less,
                tolerances,
                regions: &[],
            },
        )
        .unwrap();
        assert_eq!(unchanged.tolerances, Some(tolerances));

        let changed = minimal_overrides(
            &result(),
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Colors,
                tolerances,
                regions: &[],
            },
        )
        .unwrap();
        assert_eq!(changed.tolerances, None);
        assert_eq!(changed.ignore, Some(IgnoreLevel::Colors));
    }

    #[test]
    fn non_default_engine_and_threshold_are_exported() {
        let mut result = result();
        result.engine = "ssim".to_string();
        result.failure_threshold = 1.5;
        let options = minimal_overrides(
            &result,
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Less,
                tolerances: Tolerances::default(),
                regions: &[],
            },
        )
        .unwrap();
        assert_eq!(options.engine.as_deref(), Some("ssim"));
        assert_eq!(options.failure_threshold, Some(1.5));
    }

    #[test]
    fn regions_export_as_integer_boxes_without_ids() {
        let regions = [region(7, 10.4, 20.6, 110.5, 220.0)];
        let options = minimal_overrides(
            &result(),
            &DiffConfig::default(),
            &UiState {
                ignore: IgnoreLevel::Less,
                tolerances: Tolerances::default(),
                regions: &regions,
            },
        )
        .unwrap();
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(
            json,
            r#"{"ignoredBoxes":[{"top":21,"left":10,"bottom":220,"right":111}]}"#
        );
    }

    #[test]
    fn colored_area_exclusion_passes_through_verbatim() {
        let config = DiffConfig {
            ignore_areas_colored_with: Some(Rgb { r: 255, g: 0, b: 0 }),
            ..DiffConfig::default()
        };
        let options = minimal_overrides(
            &result(),
            &config,
            &UiState {
                ignore: IgnoreLevel::Less,
                tolerances: Tolerances::default(),
                regions: &[],
            },
        )
        .unwrap();
        assert_eq!(
            options.ignore_areas_colored_with,
            Some(Rgb { r: 255, g: 0, b: 0 })
        );
    }

    #[test]
    fn download_name_comes_from_mime_or_extension() {
        assert_eq!(
            download_file_name("data:image/jpeg;base64,abcd"),
            "latest.jpeg"
        );
        assert_eq!(download_file_name("shots/latest.png"), "latest.png");
        assert_eq!(download_file_name("no-extension"), "latest.png");
    }

    #[test]
    fn show_config_prefers_the_hook() {
        let options = DiffOptions::default();
        let rendered = show_config(&options, None).unwrap();
        assert_eq!(rendered, "{}");
        let hook: &dyn Fn(&str, &DiffOptions) -> String =
            &|json, _| format!("wrapped:{json}");
        let rendered = show_config(&options, Some(hook)).unwrap();
        assert_eq!(rendered, "wrapped:{}");
    }

    #[test]
    fn show_rebase_without_hook_falls_through() {
        let options = DiffOptions::default();
        let download = || {};
        assert_eq!(show_rebase(&options, &download, None), None);
        let hook: &dyn Fn(&DiffOptions, &dyn Fn()) -> Option<String> = &|_, download| {
            download();
            Some("rebased".to_string())
        };
        assert_eq!(
            show_rebase(&options, &download, Some(hook)).as_deref(),
            Some("rebased")
        );
    }

    #[test]
    fn diff_config_parses_wire_names() {
        let raw = r#"{
            "ignore": "colors",
            "tolerances": {"red": 16, "minBrightness": 8},
            "ignoredBoxes": [{"left": 0, "top": 0, "right": 10, "bottom": 10}],
            "ignoreAreasColoredWith": {"r": 0, "g": 255, "b": 0}
        }"#;
        let config: DiffConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.ignore.as_deref(), Some("colors"));
        assert_eq!(config.tolerances.unwrap().min_brightness, Some(8.0));
        assert_eq!(config.ignored_boxes.len(), 1);
        assert_eq!(
            config.ignore_areas_colored_with,
            Some(Rgb { r: 0, g: 255, b: 0 })
        );
    }
}
