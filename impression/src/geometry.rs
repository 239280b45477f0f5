//! Rectangle geometry and visible-fraction computation.
//!
//! All rectangles are expressed in the coordinate space of the tracked
//! element's visible container (typically window coordinates). The host
//! reports two rectangles per layout pass:
//!
//! - the element's own bounds
//! - the container's currently visible rectangle, which may be smaller than
//!   the container itself because of clipping by ancestors or system bars
//!
//! Degenerate input is never an error. Bounds that do not overlap, zero-area
//! elements, and non-finite coordinates all produce [`Visibility::Hidden`].

/// Axis-aligned rectangle in container coordinates.
///
/// `left <= right` and `top <= bottom` for well-formed rectangles, but the
/// type does not enforce it: hosts occasionally report inverted bounds during
/// layout and those must degrade to "not visible" rather than panic.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// Create a rectangle from its edges.
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from an origin and a size.
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Horizontal extent. Negative for inverted rectangles.
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Vertical extent. Negative for inverted rectangles.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area, or `0.0` when either extent is not positive.
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// True when the rectangle covers no area (or has non-finite edges).
    pub fn is_empty(&self) -> bool {
        !self.is_finite() || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// True when every edge is a finite number.
    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Translate the rectangle by the given offsets.
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Raw overlap of two rectangles.
    ///
    /// The result has negative width or height when the rectangles do not
    /// overlap on that axis. Callers decide how to treat that case; see
    /// [`Rect::intersect`] for the checked form.
    pub fn overlap(&self, other: &Rect) -> Rect {
        Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    /// Intersection of two rectangles, or `None` when they do not overlap.
    ///
    /// Rectangles that only touch along an edge intersect in a zero-area
    /// rectangle and return `Some`.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let overlap = self.overlap(other);
        if overlap.height() < 0.0 || overlap.width() < 0.0 {
            None
        } else {
            Some(overlap)
        }
    }
}

/// How much of an element is on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    /// No geometric overlap, zero-area element, or malformed bounds.
    Hidden,
    /// Fraction of the element's area inside the visible container, `0.0..=1.0`.
    Visible(f32),
}

impl Visibility {
    /// Visible fraction, `0.0` when hidden.
    pub fn fraction(&self) -> f32 {
        match self {
            Visibility::Hidden => 0.0,
            Visibility::Visible(fraction) => *fraction,
        }
    }

    /// True when at least `threshold` of the element is visible.
    pub fn meets(&self, threshold: f32) -> bool {
        match self {
            Visibility::Hidden => false,
            Visibility::Visible(fraction) => *fraction >= threshold,
        }
    }
}

/// Compute how much of `element` lies inside `container_visible`.
///
/// The vertical axis is checked first, then the horizontal axis; a negative
/// overlap on either short-circuits to [`Visibility::Hidden`] before any area
/// is computed.
pub fn visibility(element: &Rect, container_visible: &Rect) -> Visibility {
    if !element.is_finite() || !container_visible.is_finite() {
        return Visibility::Hidden;
    }

    let visible_top = element.top.max(container_visible.top);
    let visible_bottom = element.bottom.min(container_visible.bottom);
    let visible_height = visible_bottom - visible_top;
    if visible_height < 0.0 {
        // vertically off-screen
        return Visibility::Hidden;
    }

    let visible_left = element.left.max(container_visible.left);
    let visible_right = element.right.min(container_visible.right);
    let visible_width = visible_right - visible_left;
    if visible_width < 0.0 {
        // horizontally off-screen
        return Visibility::Hidden;
    }

    let element_area = element.area();
    if element_area <= 0.0 {
        return Visibility::Hidden;
    }

    let fraction = (visible_width * visible_height) / element_area;
    if !fraction.is_finite() {
        return Visibility::Hidden;
    }

    Visibility::Visible(fraction.clamp(0.0, 1.0))
}
