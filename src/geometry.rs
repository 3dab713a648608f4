//! Pure coordinate math shared by the region store and the session. Natural
//! space is the unscaled source image; display space is whatever the host is
//! currently rendering, related by a uniform `scale` factor.

use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Smallest span a normalized region may have on either axis, in natural
/// pixels. Degenerate rectangles are expanded to this rather than rejected.
pub const MIN_REGION_SPAN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    /// Builds a rectangle, rejecting non-finite coordinates instead of
    /// coercing them to zero.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, SessionError> {
        for (name, value) in [
            ("left", left),
            ("top", top),
            ("right", right),
            ("bottom", bottom),
        ] {
            if !value.is_finite() {
                return Err(SessionError::InvalidGeometry(format!(
                    "{name} is not a finite number: {value}"
                )));
            }
        }
        Ok(Rect {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Natural dimensions of the baseline image. Immutable for the lifetime of a
/// comparison session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub max_width: f64,
    pub max_height: f64,
}

/// Clamps a rectangle into `bounds` and enforces the minimum span, anchored
/// at `left`/`top`. Idempotent: normalizing a normalized rect is a no-op.
pub fn normalize(rect: Rect, bounds: Bounds) -> Rect {
    let mut left = rect.left.max(0.0);
    let mut top = rect.top.max(0.0);
    let mut right = rect.right.min(bounds.max_width);
    let mut bottom = rect.bottom.min(bounds.max_height);

    if left >= right {
        right = (left + MIN_REGION_SPAN).min(bounds.max_width);
        left = (right - MIN_REGION_SPAN).max(0.0);
    }
    if top >= bottom {
        bottom = (top + MIN_REGION_SPAN).min(bounds.max_height);
        top = (bottom - MIN_REGION_SPAN).max(0.0);
    }

    Rect {
        left,
        top,
        right,
        bottom,
    }
}

/// Conversion between natural and display pixel coordinates. Must be rebuilt
/// whenever the rendered element is resized, since `scale` depends on live
/// layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform {
    scale: f64,
    max_width: f64,
    max_height: f64,
}

impl ScaleTransform {
    /// Fails with `NotReady` until both dimensions pairs are valid, which is
    /// the gate that blocks comparison before the images finish loading.
    pub fn from_layout(
        natural_width: f64,
        natural_height: f64,
        client_width: f64,
        client_height: f64,
    ) -> Result<Self, SessionError> {
        for (name, value) in [
            ("natural width", natural_width),
            ("natural height", natural_height),
            ("client width", client_width),
            ("client height", client_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SessionError::NotReady(format!(
                    "{name} is not available yet: {value}"
                )));
            }
        }
        // Aspect ratio is preserved by the host, so one axis determines the
        // uniform scale.
        Ok(ScaleTransform {
            scale: natural_width / client_width,
            max_width: natural_width,
            max_height: natural_height,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn max_width(&self) -> f64 {
        self.max_width
    }

    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }

    pub fn to_natural(&self, display_value: f64) -> f64 {
        display_value * self.scale
    }

    pub fn to_display(&self, natural_value: f64) -> f64 {
        natural_value / self.scale
    }

    pub fn rect_to_natural(&self, rect: Rect) -> Rect {
        Rect {
            left: self.to_natural(rect.left),
            top: self.to_natural(rect.top),
            right: self.to_natural(rect.right),
            bottom: self.to_natural(rect.bottom),
        }
    }

    pub fn rect_to_display(&self, rect: Rect) -> Rect {
        Rect {
            left: self.to_display(rect.left),
            top: self.to_display(rect.top),
            right: self.to_display(rect.right),
            bottom: self.to_display(rect.bottom),
        }
    }
}
