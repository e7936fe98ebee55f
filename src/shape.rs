use image::Rgba;
use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) RGBA color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, u8::MAX)
    }
}

impl From<Rgba<u8>> for Color {
    fn from(pixel: Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        Self { r, g, b, a }
    }
}

impl From<Color> for Rgba<u8> {
    fn from(color: Color) -> Self {
        Rgba([color.r, color.g, color.b, color.a])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Circle,
    Rectangle,
}

impl ShapeKind {
    pub fn flipped(self) -> Self {
        match self {
            Self::Circle => Self::Rectangle,
            Self::Rectangle => Self::Circle,
        }
    }
}

/// One filled primitive. `size` is the radius of a circle or the half-width
/// of a (square) rectangle, both centered on (`x`, `y`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub x: i32,
    pub y: i32,
    pub size: i32,
    pub color: Color,
}

impl Shape {
    pub fn is_degenerate(&self) -> bool {
        self.size <= 0
    }
}

/// An ordered drawing program. Later shapes are painted over earlier ones.
///
/// Cloning performs a deep copy of the shape sequence, which is what every
/// ownership handoff (job dispatch, worker intake) relies on: a worker only
/// ever mutates a genome it owns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub shapes: Vec<Shape>,
}

impl Genome {
    pub fn new() -> Self {
        Self { shapes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Shape> {
        self.shapes.iter()
    }
}

impl From<Vec<Shape>> for Genome {
    fn from(shapes: Vec<Shape>) -> Self {
        Self { shapes }
    }
}

impl<'a> IntoIterator for &'a Genome {
    type Item = &'a Shape;
    type IntoIter = std::slice::Iter<'a, Shape>;

    fn into_iter(self) -> Self::IntoIter {
        self.shapes.iter()
    }
}
