use std::ops::{Add, Div, Mul, Sub};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f64 = 0.2;
pub const MAX_SCALE: f64 = 2.0;

/// A 2D point, in canvas or device space depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;
    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// The pan/scale transform between device pixels and canvas coordinates.
/// All coordinate conversions go through here; nothing else is allowed to
/// own scale or pan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Viewport {
    scale: f64,
    pan: Point,
    min_scale: f64,
    max_scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            pan: Point::ZERO,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl Viewport {
    pub fn new(min_scale: f64, max_scale: f64) -> Self {
        Self {
            min_scale,
            max_scale,
            ..Self::default()
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn to_canvas(&self, device: Point) -> Point {
        device / self.scale - self.pan
    }

    pub fn to_device(&self, canvas: Point) -> Point {
        (canvas + self.pan) * self.scale
    }

    /// Zoom toward the cursor: the canvas point currently under
    /// `device_point` stays under it after the scale change.
    pub fn zoom_at(&mut self, device_point: Point, delta_scale: f64) {
        let anchor = self.to_canvas(device_point);
        self.scale = (self.scale + delta_scale).clamp(self.min_scale, self.max_scale);
        self.pan = device_point / self.scale - anchor;
    }

    /// Pan by a device-space delta. Dividing by scale keeps panning speed
    /// constant in canvas units at any zoom level.
    pub fn pan_by(&mut self, delta_device: Point) {
        self.pan = self.pan + delta_device / self.scale;
    }
}
