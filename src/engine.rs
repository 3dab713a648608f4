//! File-backed reference implementation of the compare capability. The core
//! never touches pixels; this adapter exists so the CLI can drive a real
//! comparison end to end, and doubles as the template for binding any other
//! pixel engine to [`CompareEngine`].

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compare::{
    CompareCompletion, CompareEngine, CompareRequest, IgnoreLevel, OutputMode, Rgb,
};
use crate::geometry::Rect;

/// Concrete per-channel tolerances after applying an ignore-level preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTolerances {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
}

#[derive(Debug, Clone, Copy)]
struct CompareMode {
    tolerances: ResolvedTolerances,
    ignore_colors: bool,
    ignore_antialiasing: bool,
}

/// Resemble preset values for each ignore level.
pub fn preset_tolerances(level: IgnoreLevel) -> ResolvedTolerances {
    match level {
        IgnoreLevel::Nothing => ResolvedTolerances {
            red: 0.0,
            green: 0.0,
            blue: 0.0,
            alpha: 0.0,
            min_brightness: 0.0,
            max_brightness: 255.0,
        },
        IgnoreLevel::Less => ResolvedTolerances {
            red: 16.0,
            green: 16.0,
            blue: 16.0,
            alpha: 16.0,
            min_brightness: 16.0,
            max_brightness: 240.0,
        },
        IgnoreLevel::Colors => ResolvedTolerances {
            red: 16.0,
            green: 16.0,
            blue: 16.0,
            alpha: 16.0,
            min_brightness: 16.0,
            max_brightness: 240.0,
        },
        IgnoreLevel::Antialiasing => ResolvedTolerances {
            red: 32.0,
            green: 32.0,
            blue: 32.0,
            alpha: 32.0,
            min_brightness: 64.0,
            max_brightness: 96.0,
        },
        IgnoreLevel::Alpha => ResolvedTolerances {
            red: 16.0,
            green: 16.0,
            blue: 16.0,
            alpha: 255.0,
            min_brightness: 16.0,
            max_brightness: 240.0,
        },
    }
}

fn compare_mode(request: &CompareRequest) -> CompareMode {
    let mut tolerances = preset_tolerances(request.ignore);
    let overrides = &request.tolerances;
    if let Some(v) = overrides.red {
        tolerances.red = v;
    }
    if let Some(v) = overrides.green {
        tolerances.green = v;
    }
    if let Some(v) = overrides.blue {
        tolerances.blue = v;
    }
    if let Some(v) = overrides.alpha {
        tolerances.alpha = v;
    }
    if let Some(v) = overrides.min_brightness {
        tolerances.min_brightness = v;
    }
    if let Some(v) = overrides.max_brightness {
        tolerances.max_brightness = v;
    }
    CompareMode {
        tolerances,
        ignore_colors: request.ignore == IgnoreLevel::Colors,
        ignore_antialiasing: request.ignore == IgnoreLevel::Antialiasing,
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelBox {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl PixelBox {
    fn from_rect(rect: &Rect, width: u32, height: u32) -> Self {
        PixelBox {
            left: rect.left.max(0.0).round() as u32,
            top: rect.top.max(0.0).round() as u32,
            right: (rect.right.round().max(0.0) as u32).min(width),
            bottom: (rect.bottom.round().max(0.0) as u32).min(height),
        }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

fn brightness(p: [u8; 4]) -> f64 {
    0.3 * f64::from(p[0]) + 0.59 * f64::from(p[1]) + 0.11 * f64::from(p[2])
}

// A pixel sitting between both darker and lighter neighbors is treated as
// antialiasing rather than content.
fn is_antialiased(img: &RgbaImage, x: u32, y: u32, brightness_tolerance: f64) -> bool {
    let (width, height) = img.dimensions();
    let center = brightness(img.get_pixel(x, y).0);
    let mut darker = 0;
    let mut lighter = 0;

    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x1 = (x + 1).min(width - 1);
    let y1 = (y + 1).min(height - 1);
    for ny in y0..=y1 {
        for nx in x0..=x1 {
            if nx == x && ny == y {
                continue;
            }
            let diff = brightness(img.get_pixel(nx, ny).0) - center;
            if diff < -brightness_tolerance {
                darker += 1;
            } else if diff > brightness_tolerance {
                lighter += 1;
            }
        }
    }
    darker > 0 && lighter > 0
}

/// Compares a baseline/latest pair loaded from disk and renders the diff per
/// the request's output settings.
#[derive(Debug, Default)]
pub struct PixelCompareEngine {
    diff_out: Option<PathBuf>,
    allow_scaling: bool,
}

impl PixelCompareEngine {
    pub fn new() -> Self {
        PixelCompareEngine::default()
    }

    pub fn with_diff_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.diff_out = Some(path.into());
        self
    }

    pub fn allow_scaling(mut self, allow: bool) -> Self {
        self.allow_scaling = allow;
        self
    }
}

impl CompareEngine for PixelCompareEngine {
    fn repaint(&mut self, request: &CompareRequest) -> Result<CompareCompletion> {
        let baseline_path = Path::new(&request.baseline);
        let latest_path = Path::new(&request.latest);
        if !baseline_path.exists() {
            bail!("baseline not found: {}", baseline_path.display());
        }
        if !latest_path.exists() {
            bail!("latest not found: {}", latest_path.display());
        }

        let baseline_image = image::open(baseline_path).with_context(|| {
            format!("failed to open baseline image: {}", baseline_path.display())
        })?;
        let mut latest_image = image::open(latest_path)
            .with_context(|| format!("failed to open latest image: {}", latest_path.display()))?;

        if baseline_image.dimensions() != latest_image.dimensions() {
            if self.allow_scaling {
                let (w, h) = baseline_image.dimensions();
                latest_image = latest_image.resize_exact(w, h, FilterType::Lanczos3);
            } else {
                bail!("latest image dimensions != baseline image dimensions");
            }
        }

        let baseline = baseline_image.to_rgba8();
        let latest = latest_image.to_rgba8();
        let (width, height) = baseline.dimensions();
        let total_pixels = u64::from(width) * u64::from(height);

        let mode = compare_mode(request);
        let skip_antialiasing =
            width.max(height) > request.output.large_image_threshold;
        let boxes: Vec<PixelBox> = request
            .output
            .ignored_boxes
            .iter()
            .map(|r| PixelBox::from_rect(r, width, height))
            .collect();
        let ignored_color = request.output.ignore_areas_colored_with;
        let error_rgb = request.output.error_color.rgb();
        let background_alpha =
            (request.output.transparency.value() * 255.0).round() as u8;

        let mut mismatched: u64 = 0;
        let mut rendered = RgbaImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let a = baseline.get_pixel(x, y).0;
                let b = latest.get_pixel(x, y).0;

                let excluded = boxes.iter().any(|bx| bx.contains(x, y))
                    || matches!(ignored_color, Some(Rgb { r, g, b: cb }) if a[0] == r && a[1] == g && a[2] == cb);
                if excluded {
                    rendered.put_pixel(x, y, background_pixel(b, background_alpha, request.output.error_type));
                    continue;
                }

                let dr = f64::from(a[0].abs_diff(b[0]));
                let dg = f64::from(a[1].abs_diff(b[1]));
                let db = f64::from(a[2].abs_diff(b[2]));
                let da = f64::from(a[3].abs_diff(b[3]));
                let brightness_diff = (brightness(a) - brightness(b)).abs();

                let mut matched = if mode.ignore_colors {
                    brightness_diff <= mode.tolerances.min_brightness
                        && da <= mode.tolerances.alpha
                } else {
                    dr <= mode.tolerances.red
                        && dg <= mode.tolerances.green
                        && db <= mode.tolerances.blue
                        && da <= mode.tolerances.alpha
                };

                if !matched && mode.ignore_antialiasing && !skip_antialiasing {
                    let antialiased = is_antialiased(&baseline, x, y, mode.tolerances.min_brightness)
                        || is_antialiased(&latest, x, y, mode.tolerances.min_brightness);
                    if antialiased && brightness_diff <= mode.tolerances.max_brightness {
                        matched = true;
                    }
                }

                if matched {
                    rendered.put_pixel(x, y, background_pixel(b, background_alpha, request.output.error_type));
                } else {
                    mismatched += 1;
                    let intensity = (dr.max(dg).max(db) / 255.0).clamp(0.0, 1.0);
                    rendered.put_pixel(x, y, error_pixel(b, error_rgb, intensity, request.output.error_type));
                }
            }
        }

        let image = match &self.diff_out {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).with_context(|| {
                            format!("failed to create parent directory: {}", parent.display())
                        })?;
                    }
                }
                DynamicImage::ImageRgba8(rendered)
                    .save(path)
                    .with_context(|| format!("failed to save diff image: {}", path.display()))?;
                Some(path.display().to_string())
            }
            None => None,
        };

        let mismatch_percentage = if total_pixels > 0 {
            round_to((mismatched as f64 / total_pixels as f64) * 100.0, 2)
        } else {
            0.0
        };

        Ok(CompareCompletion {
            generation: request.generation,
            image,
            mismatch_percentage,
        })
    }
}

fn background_pixel(latest: [u8; 4], alpha: u8, mode: OutputMode) -> image::Rgba<u8> {
    if mode == OutputMode::DiffOnly {
        return image::Rgba([0, 0, 0, 0]);
    }
    let scaled = (u16::from(latest[3]) * u16::from(alpha) / 255) as u8;
    image::Rgba([latest[0], latest[1], latest[2], scaled])
}

fn error_pixel(
    latest: [u8; 4],
    error_rgb: [u8; 3],
    intensity: f64,
    mode: OutputMode,
) -> image::Rgba<u8> {
    let scale = |c: u8, f: f64| -> u8 { (f64::from(c) * f).round().clamp(0.0, 255.0) as u8 };
    let mix = |e: u8, l: u8| -> u8 { ((u16::from(e) + u16::from(l)) / 2) as u8 };
    match mode {
        OutputMode::Flat | OutputMode::DiffOnly => {
            image::Rgba([error_rgb[0], error_rgb[1], error_rgb[2], 255])
        }
        OutputMode::Movement => image::Rgba([
            mix(error_rgb[0], latest[0]),
            mix(error_rgb[1], latest[1]),
            mix(error_rgb[2], latest[2]),
            255,
        ]),
        OutputMode::FlatDifferenceIntensity => image::Rgba([
            scale(error_rgb[0], intensity),
            scale(error_rgb[1], intensity),
            scale(error_rgb[2], intensity),
            255,
        ]),
        OutputMode::MovementDifferenceIntensity => image::Rgba([
            mix(scale(error_rgb[0], intensity), latest[0]),
            mix(scale(error_rgb[1], intensity), latest[1]),
            mix(scale(error_rgb[2], intensity), latest[2]),
            255,
        ]),
    }
}

pub fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}
