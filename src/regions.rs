//! Owned set of ignored regions for one comparison session. The store
//! enforces the geometric invariants via [`crate::geometry::normalize`] and
//! assigns identity; whether a mutation triggers a compare repaint is decided
//! one layer up, in [`crate::session::Session`].

use serde::Serialize;

use crate::geometry::{normalize, Bounds, Rect};
use crate::SessionError;

/// One ignored box in natural-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub id: u64,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Region {
    fn from_rect(id: u64, rect: Rect) -> Self {
        Region {
            id,
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect {
            left: self.left,
            top: self.top,
            right: self.right,
            bottom: self.bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Partial geometry update. Absent edges keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectPatch {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

impl RectPatch {
    pub fn from_rect(rect: Rect) -> Self {
        RectPatch {
            left: Some(rect.left),
            top: Some(rect.top),
            right: Some(rect.right),
            bottom: Some(rect.bottom),
        }
    }

    fn validate(&self) -> Result<(), SessionError> {
        for (name, value) in [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
        ] {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(SessionError::InvalidGeometry(format!(
                        "{name} is not a finite number: {value}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, rect: Rect) -> Rect {
        Rect {
            left: self.left.unwrap_or(rect.left),
            top: self.top.unwrap_or(rect.top),
            right: self.right.unwrap_or(rect.right),
            bottom: self.bottom.unwrap_or(rect.bottom),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IgnoredRegionStore {
    bounds: Bounds,
    regions: Vec<Region>,
    // Strictly monotonic, never reused after deletion.
    next_id: u64,
}

impl IgnoredRegionStore {
    pub fn new(bounds: Bounds) -> Self {
        IgnoredRegionStore {
            bounds,
            regions: Vec::new(),
            next_id: 0,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Bulk-loads the persisted boxes at session start. Never triggers a
    /// repaint; the first compare completion materializes these.
    pub fn seed(&mut self, rects: &[Rect]) {
        for rect in rects {
            self.add(*rect);
        }
    }

    pub fn add(&mut self, rect: Rect) -> Region {
        let id = self.next_id;
        self.next_id += 1;
        let region = Region::from_rect(id, normalize(rect, self.bounds));
        self.regions.push(region);
        region
    }

    pub fn remove(&mut self, id: u64) -> Result<Region, SessionError> {
        let index = self
            .regions
            .iter()
            .position(|r| r.id == id)
            .ok_or(SessionError::UnknownRegion(id))?;
        Ok(self.regions.remove(index))
    }

    pub fn update(&mut self, id: u64, patch: RectPatch) -> Result<Region, SessionError> {
        patch.validate()?;
        let bounds = self.bounds;
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(SessionError::UnknownRegion(id))?;
        *region = Region::from_rect(id, normalize(patch.apply(region.rect()), bounds));
        Ok(*region)
    }

    pub fn get(&self, id: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn rects(&self) -> Vec<Rect> {
        self.regions.iter().map(Region::rect).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IgnoredRegionStore {
        IgnoredRegionStore::new(Bounds {
            max_width: 1000.0,
            max_height: 800.0,
        })
    }

    fn rect(left: f64, top: f64, right: f64, bottom: f64) -> Rect {
        Rect::new(left, top, right, bottom).unwrap()
    }

    #[test]
    fn ids_are_never_reused_after_deletion() {
        let mut store = store();
        for i in 0..3 {
            let r = store.add(rect(10.0 * i as f64, 0.0, 10.0 * i as f64 + 5.0, 10.0));
            assert_eq!(r.id, i);
        }
        store.remove(2).unwrap();
        let next = store.add(rect(0.0, 100.0, 50.0, 150.0));
        assert_eq!(next.id, 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn add_normalizes_out_of_bounds_input() {
        let mut store = store();
        let region = store.add(rect(-10.0, -10.0, 2000.0, 2000.0));
        assert_eq!(region.left, 0.0);
        assert_eq!(region.top, 0.0);
        assert_eq!(region.right, 1000.0);
        assert_eq!(region.bottom, 800.0);
    }

    #[test]
    fn seed_assigns_sequential_ids() {
        let mut store = store();
        store.seed(&[rect(0.0, 0.0, 10.0, 10.0), rect(20.0, 20.0, 40.0, 40.0)]);
        let ids: Vec<u64> = store.regions().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn update_applies_partial_patch_and_renormalizes() {
        let mut store = store();
        let region = store.add(rect(100.0, 100.0, 200.0, 200.0));
        let updated = store
            .update(
                region.id,
                RectPatch {
                    right: Some(5000.0),
                    ..RectPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.left, 100.0);
        assert_eq!(updated.right, 1000.0);
    }

    #[test]
    fn update_rejects_non_finite_patch() {
        let mut store = store();
        let region = store.add(rect(0.0, 0.0, 10.0, 10.0));
        let err = store
            .update(
                region.id,
                RectPatch {
                    left: Some(f64::NAN),
                    ..RectPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidGeometry(_)));
    }

    #[test]
    fn remove_unknown_id_is_an_error() {
        let mut store = store();
        assert!(matches!(
            store.remove(7),
            Err(SessionError::UnknownRegion(7))
        ));
    }
}
