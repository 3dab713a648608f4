//! Tracks which single region is interactively active and the in-progress
//! drag or resize gesture. Session-wide invariant: at most one region is
//! active at any time.

/// Resize affordances attached to the active region, one per side and corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Handle {
    pub fn moves_left(self) -> bool {
        matches!(self, Handle::Left | Handle::TopLeft | Handle::BottomLeft)
    }

    pub fn moves_right(self) -> bool {
        matches!(self, Handle::Right | Handle::TopRight | Handle::BottomRight)
    }

    pub fn moves_top(self) -> bool {
        matches!(self, Handle::Top | Handle::TopLeft | Handle::TopRight)
    }

    pub fn moves_bottom(self) -> bool {
        matches!(self, Handle::Bottom | Handle::BottomLeft | Handle::BottomRight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Idle,
    Drag {
        region_id: u64,
        // Pointer offset from the region origin at grab time, display space.
        grab_dx: f64,
        grab_dy: f64,
    },
    Resize {
        region_id: u64,
        handle: Handle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click activated an inactive region.
    Activated,
    /// The region was already active; nothing changed.
    AlreadyActive,
    /// The click was the tail end of a drag/resize gesture and was swallowed.
    Suppressed,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    active: Option<u64>,
    gesture: Option<Gesture>,
    suppress_next_click: bool,
}

impl SelectionController {
    pub fn new() -> Self {
        SelectionController::default()
    }

    pub fn active(&self) -> Option<u64> {
        self.active
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture.unwrap_or(Gesture::Idle)
    }

    pub fn is_gesturing(&self) -> bool {
        self.gesture.is_some()
    }

    /// Activates `id`, detaching the previous region's affordances. Returns
    /// the previously active id, if any.
    pub fn activate(&mut self, id: u64) -> Option<u64> {
        if self.active == Some(id) {
            return None;
        }
        let previous = self.active.take();
        self.active = Some(id);
        self.gesture = None;
        previous
    }

    /// Idempotent; also aborts any in-progress gesture.
    pub fn deactivate(&mut self) {
        self.active = None;
        self.gesture = None;
    }

    pub fn click(&mut self, id: u64) -> ClickOutcome {
        if self.suppress_next_click {
            self.suppress_next_click = false;
            return ClickOutcome::Suppressed;
        }
        if self.active == Some(id) {
            return ClickOutcome::AlreadyActive;
        }
        self.activate(id);
        ClickOutcome::Activated
    }

    pub fn begin_drag(&mut self, id: u64, grab_dx: f64, grab_dy: f64) {
        self.activate(id);
        self.gesture = Some(Gesture::Drag {
            region_id: id,
            grab_dx,
            grab_dy,
        });
    }

    pub fn begin_resize(&mut self, id: u64, handle: Handle) {
        self.activate(id);
        self.gesture = Some(Gesture::Resize {
            region_id: id,
            handle,
        });
    }

    /// Ends the current gesture. Returns true if one was in progress, in
    /// which case the click that ends the pointer sequence is suppressed.
    pub fn end_gesture(&mut self) -> bool {
        if self.gesture.take().is_some() {
            self.suppress_next_click = true;
            true
        } else {
            false
        }
    }
}
