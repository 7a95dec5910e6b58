//! Plain geometry types shared by the layout tree and the window service.
//!
//! Coordinates are in the window service's global space with the origin at
//! the top-left corner and `y` growing downwards.

use serde::{Deserialize, Serialize};

/// A point in global screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis along which a split divides its area.
///
/// `Vertical` places the two children side by side (the divider line is
/// vertical); `Horizontal` stacks them top over bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

impl Orientation {
    /// The other orientation.
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Vertical => Orientation::Horizontal,
            Orientation::Horizontal => Orientation::Vertical,
        }
    }
}

/// Space reserved around the edges of a display's content area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Padding {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Padding {
    /// Same padding on all four edges.
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether `point` lies inside the rectangle (edges inclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Width divided by height.  A degenerate (zero-height) rectangle is
    /// treated as infinitely wide.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height <= 0.0 {
            f64::INFINITY
        } else {
            self.width / self.height
        }
    }

    /// Shrink the rectangle by `padding`, never below zero size.
    pub fn inset(&self, padding: &Padding) -> Rect {
        Rect::new(
            self.x + padding.left,
            self.y + padding.top,
            (self.width - padding.left - padding.right).max(0.0),
            (self.height - padding.top - padding.bottom).max(0.0),
        )
    }

    /// Split into two parts along `orientation`.
    ///
    /// `ratio` is the share of the first (left or top) part after `gap` has
    /// been taken out of the available length.
    pub fn split(&self, orientation: Orientation, ratio: f64, gap: f64) -> (Rect, Rect) {
        match orientation {
            Orientation::Vertical => {
                let available = (self.width - gap).max(0.0);
                let left = available * ratio;
                (
                    Rect::new(self.x, self.y, left, self.height),
                    Rect::new(self.x + left + gap, self.y, available - left, self.height),
                )
            }
            Orientation::Horizontal => {
                let available = (self.height - gap).max(0.0);
                let top = available * ratio;
                (
                    Rect::new(self.x, self.y, self.width, top),
                    Rect::new(self.x, self.y + top + gap, self.width, available - top),
                )
            }
        }
    }

    /// Keep the size but move the rectangle so it is centred inside `area`.
    pub fn centered_in(&self, area: &Rect) -> Rect {
        let c = area.center();
        Rect::new(
            c.x - self.width / 2.0,
            c.y - self.height / 2.0,
            self.width,
            self.height,
        )
    }
}
