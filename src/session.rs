//! One comparison session for one baseline/latest pair: the scale transform,
//! the ignored-region set, and the selection state, owned as one explicit
//! value instead of being scattered across callbacks. Mutating operations
//! report whether the compare engine now needs a repaint; intermediate
//! gesture frames never do.

use crate::geometry::{Rect, ScaleTransform};
use crate::regions::{IgnoredRegionStore, RectPatch, Region};
use crate::selection::{ClickOutcome, Gesture, Handle, SelectionController};
use crate::SessionError;

/// Half of the display-space span of a region created by a context click.
pub const CONTEXT_CLICK_HALF_SPAN: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Session {
    transform: ScaleTransform,
    store: IgnoredRegionStore,
    selection: SelectionController,
    last_mismatch_percentage: f64,
}

impl Session {
    /// Seeds the region set from the persisted config. The seeded regions
    /// stay dormant until the first compare completion materializes them.
    pub fn new(transform: ScaleTransform, seeded: &[Rect]) -> Self {
        let mut store = IgnoredRegionStore::new(transform.bounds());
        store.seed(seeded);
        Session {
            transform,
            store,
            selection: SelectionController::new(),
            last_mismatch_percentage: 100.0,
        }
    }

    pub fn transform(&self) -> &ScaleTransform {
        &self.transform
    }

    pub fn regions(&self) -> &[Region] {
        self.store.regions()
    }

    pub fn region_rects(&self) -> Vec<Rect> {
        self.store.rects()
    }

    pub fn active_region(&self) -> Option<u64> {
        self.selection.active()
    }

    pub fn last_mismatch_percentage(&self) -> f64 {
        self.last_mismatch_percentage
    }

    pub fn record_mismatch(&mut self, percentage: f64) {
        self.last_mismatch_percentage = percentage;
    }

    /// Creates a region from a context click at display coordinates: a
    /// 100x100 display-pixel box centered on the click, converted to natural
    /// space and normalized. The new region becomes active. The caller must
    /// repaint.
    pub fn create_region_at(
        &mut self,
        click_x: f64,
        click_y: f64,
    ) -> Result<Region, SessionError> {
        let display = Rect::new(
            click_x - CONTEXT_CLICK_HALF_SPAN,
            click_y - CONTEXT_CLICK_HALF_SPAN,
            click_x + CONTEXT_CLICK_HALF_SPAN,
            click_y + CONTEXT_CLICK_HALF_SPAN,
        )?;
        let region = self.store.add(self.transform.rect_to_natural(display));
        self.selection.activate(region.id);
        Ok(region)
    }

    /// Removes a region, clearing the selection if it was active. Returns
    /// true: the exclusion set changed and a repaint is required.
    pub fn remove_region(&mut self, id: u64) -> Result<bool, SessionError> {
        let removed = self.store.remove(id)?;
        if self.selection.active() == Some(removed.id) {
            self.selection.deactivate();
        }
        Ok(true)
    }

    /// Applies a partial geometry update. Returns the updated region and
    /// whether a repaint is required; the bulk-restore path on first paint
    /// passes `suppress_repaint` to avoid a repaint cascade.
    pub fn update_region(
        &mut self,
        id: u64,
        patch: RectPatch,
        suppress_repaint: bool,
    ) -> Result<(Region, bool), SessionError> {
        let region = self.store.update(id, patch)?;
        Ok((region, !suppress_repaint))
    }

    pub fn click_region(&mut self, id: u64) -> Result<ClickOutcome, SessionError> {
        if self.store.get(id).is_none() {
            return Err(SessionError::UnknownRegion(id));
        }
        Ok(self.selection.click(id))
    }

    pub fn activate_region(&mut self, id: u64) -> Result<Option<u64>, SessionError> {
        if self.store.get(id).is_none() {
            return Err(SessionError::UnknownRegion(id));
        }
        Ok(self.selection.activate(id))
    }

    pub fn deactivate(&mut self) {
        self.selection.deactivate();
    }

    /// Starts a free-form drag from a pointer position in display space.
    pub fn begin_drag(
        &mut self,
        id: u64,
        pointer_x: f64,
        pointer_y: f64,
    ) -> Result<(), SessionError> {
        let region = *self
            .store
            .get(id)
            .ok_or(SessionError::UnknownRegion(id))?;
        let grab_dx = pointer_x - self.transform.to_display(region.left);
        let grab_dy = pointer_y - self.transform.to_display(region.top);
        self.selection.begin_drag(id, grab_dx, grab_dy);
        Ok(())
    }

    /// Moves the dragged region to follow the pointer. Intermediate frames
    /// update geometry only; the engine sees the result at gesture end.
    /// Returns None when no drag is in progress (stray pointer events).
    pub fn drag_to(&mut self, pointer_x: f64, pointer_y: f64) -> Option<Region> {
        let Gesture::Drag {
            region_id,
            grab_dx,
            grab_dy,
        } = self.selection.gesture()
        else {
            return None;
        };
        let region = *self.store.get(region_id)?;
        let width = region.width();
        let height = region.height();

        let mut left = self.transform.to_natural(pointer_x - grab_dx);
        let mut top = self.transform.to_natural(pointer_y - grab_dy);

        // A region spanning the full image on an axis is pinned there.
        if width >= self.transform.max_width() {
            left = 0.0;
        } else {
            left = left.clamp(0.0, self.transform.max_width() - width);
        }
        if height >= self.transform.max_height() {
            top = 0.0;
        } else {
            top = top.clamp(0.0, self.transform.max_height() - height);
        }

        let patch = RectPatch {
            left: Some(left),
            top: Some(top),
            right: Some(left + width),
            bottom: Some(top + height),
        };
        self.store.update(region_id, patch).ok()
    }

    pub fn begin_resize(&mut self, id: u64, handle: Handle) -> Result<(), SessionError> {
        if self.store.get(id).is_none() {
            return Err(SessionError::UnknownRegion(id));
        }
        self.selection.begin_resize(id, handle);
        Ok(())
    }

    /// Moves the grabbed handle to the pointer, in display space. The new
    /// geometry is converted to natural space and clamped through normalize,
    /// so dragging an edge past its opposite collapses to the minimum span.
    pub fn resize_to(&mut self, pointer_x: f64, pointer_y: f64) -> Option<Region> {
        let Gesture::Resize { region_id, handle } = self.selection.gesture() else {
            return None;
        };
        let region = *self.store.get(region_id)?;
        let px = self.transform.to_natural(pointer_x);
        let py = self.transform.to_natural(pointer_y);

        let mut patch = RectPatch::from_rect(region.rect());
        if handle.moves_left() {
            patch.left = Some(px);
        }
        if handle.moves_right() {
            patch.right = Some(px);
        }
        if handle.moves_top() {
            patch.top = Some(py);
        }
        if handle.moves_bottom() {
            patch.bottom = Some(py);
        }
        self.store.update(region_id, patch).ok()
    }

    /// Ends the in-progress gesture. Returns true when a gesture completed,
    /// which is the one moment gesture geometry is pushed to the engine.
    pub fn end_gesture(&mut self) -> bool {
        self.selection.end_gesture()
    }

    /// Rebuilds the scale transform after a viewport resize. Natural
    /// dimensions are immutable per session; only the client size may vary.
    pub fn viewport_resized(
        &mut self,
        natural_width: f64,
        natural_height: f64,
        client_width: f64,
        client_height: f64,
    ) -> Result<(), SessionError> {
        if natural_width != self.transform.max_width()
            || natural_height != self.transform.max_height()
        {
            return Err(SessionError::InvalidConfiguration(format!(
                "baseline dimensions changed mid-session: {natural_width}x{natural_height}"
            )));
        }
        self.transform =
            ScaleTransform::from_layout(natural_width, natural_height, client_width, client_height)?;
        Ok(())
    }

    /// First-paint materialization: re-normalizes every seeded region through
    /// the suppressed update path and hands the list to the host so it can
    /// attach interactive elements. Never requests a repaint.
    pub fn restore_regions(&mut self) -> Vec<Region> {
        let ids: Vec<u64> = self.store.regions().iter().map(|r| r.id).collect();
        let mut restored = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(region) = self.store.get(id).copied() {
                if let Ok((region, _)) =
                    self.update_region(id, RectPatch::from_rect(region.rect()), true)
                {
                    restored.push(region);
                }
            }
        }
        restored
    }
}
