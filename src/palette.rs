//! Automatic color assignment.

use crate::render::Color;

const SET1: [Color; 9] = [
    Color::rgb8(0xe4, 0x1a, 0x1c),
    Color::rgb8(0x37, 0x7e, 0xb8),
    Color::rgb8(0x4d, 0xaf, 0x4a),
    Color::rgb8(0x98, 0x4e, 0xa3),
    Color::rgb8(0xff, 0x7f, 0x00),
    Color::rgb8(0xff, 0xff, 0x33),
    Color::rgb8(0xa6, 0x56, 0x28),
    Color::rgb8(0xf7, 0x81, 0xbf),
    Color::rgb8(0x99, 0x99, 0x99),
];

const SET2: [Color; 8] = [
    Color::rgb8(0x66, 0xc2, 0xa5),
    Color::rgb8(0xfc, 0x8d, 0x62),
    Color::rgb8(0x8d, 0xa0, 0xcb),
    Color::rgb8(0xe7, 0x8a, 0xc3),
    Color::rgb8(0xa6, 0xd8, 0x54),
    Color::rgb8(0xff, 0xd9, 0x2f),
    Color::rgb8(0xe5, 0xc4, 0x94),
    Color::rgb8(0xb3, 0xb3, 0xb3),
];

/// Fixed ordered set of colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Create a palette from explicit colors.
    pub fn new(colors: Vec<Color>) -> Self {
        Self { colors }
    }

    /// Number of colors in the palette.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Check whether the palette has no colors.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color at a palette index.
    pub fn get(&self, index: usize) -> Option<Color> {
        self.colors.get(index).copied()
    }
}

impl Default for Palette {
    /// Set1 followed by Set2, 17 colors in total.
    fn default() -> Self {
        Self::new(SET1.iter().chain(SET2.iter()).copied().collect())
    }
}

/// Palette with a cursor that hands out colors in order and wraps around.
#[derive(Debug, Clone, Default)]
pub struct ColorCursor {
    palette: Palette,
    assigned: usize,
}

impl ColorCursor {
    /// Start a cursor at the first color of the palette.
    pub fn new(palette: Palette) -> Self {
        Self {
            palette,
            assigned: 0,
        }
    }

    /// Number of colors handed out so far.
    pub fn assigned(&self) -> usize {
        self.assigned
    }

    /// Palette index the next call to [`Self::next_color`] will use.
    pub fn next_index(&self) -> usize {
        if self.palette.is_empty() {
            return 0;
        }
        self.assigned % self.palette.len()
    }

    /// Hand out the next color, wrapping to the first one after the last.
    pub fn next_color(&mut self) -> Color {
        let color = self.palette.get(self.next_index()).unwrap_or(Color::BLACK);
        self.assigned += 1;
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_to_first_color() {
        let palette = Palette::default();
        let count = palette.len();
        let first = palette.get(0).expect("non-empty palette");
        let mut cursor = ColorCursor::new(palette);
        let handed: Vec<Color> = (0..count).map(|_| cursor.next_color()).collect();
        assert_eq!(handed[0], first);
        assert_eq!(cursor.next_index(), 0);
        assert_eq!(cursor.next_color(), first);
    }

    #[test]
    fn empty_palette_does_not_panic() {
        let mut cursor = ColorCursor::new(Palette::new(Vec::new()));
        assert_eq!(cursor.next_color(), Color::BLACK);
        assert_eq!(cursor.next_color(), Color::BLACK);
    }

    #[test]
    fn default_palette_has_seventeen_colors() {
        assert_eq!(Palette::default().len(), 17);
    }
}
