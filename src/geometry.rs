// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Plain geometric value types shared by the pipeline stages.

/// A 2-D floating point coordinate in image space.
///
/// A position with `NaN` on both axes is the undefined sentinel: the model
/// produced no confident detection for that body part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2f {
    /// Horizontal coordinate in pixels.
    pub x: f32,
    /// Vertical coordinate in pixels.
    pub y: f32,
}

impl Point2f {
    /// The undefined position sentinel.
    pub const UNDEFINED: Self = Self {
        x: f32::NAN,
        y: f32::NAN,
    };

    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns `true` if neither axis is `NaN`.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        !self.x.is_nan() && !self.y.is_nan()
    }
}

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An integer width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if both dimensions are strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// An axis-aligned integer rectangle, `x`/`y` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Top-left corner.
    #[must_use]
    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Width and height.
    #[must_use]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Returns `true` for a zero-area rectangle.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_point() {
        assert!(!Point2f::UNDEFINED.is_defined());
        assert!(Point2f::new(0.0, 0.0).is_defined());
        assert!(!Point2f::new(1.0, f32::NAN).is_defined());
    }

    #[test]
    fn test_rect_edges() {
        let rect = Rect::new(5, 5, 51, 41);
        assert_eq!(rect.right(), 56);
        assert_eq!(rect.bottom(), 46);
        assert!(!rect.is_empty());
        assert!(Rect::default().is_empty());
        assert_eq!(rect.to_string(), "5,5 51x41");
    }
}
