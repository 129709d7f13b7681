use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BLOCKED_TILE_ID: u16 = 2;

/// Integer grid cell. World coordinates map to the cell containing them
/// (`floor(x), floor(y)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

/// A single stop along a computed path.
pub type Waypoint = GridCell;

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn from_world(x: f32, y: f32) -> Self {
        Self {
            x: x.floor() as i32,
            y: y.floor() as i32,
        }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    pub fn euclidean_distance(self, other: GridCell) -> f32 {
        let dx = (i64::from(other.x) - i64::from(self.x)) as f64;
        let dy = (i64::from(other.y) - i64::from(self.y)) as f64;
        (dx * dx + dy * dy).sqrt() as f32
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Map-side predicate deciding whether a cell can be entered.
pub trait WalkabilityOracle {
    fn is_walkable(&self, x: i32, y: i32) -> bool;

    fn is_cell_walkable(&self, cell: GridCell) -> bool {
        self.is_walkable(cell.x, cell.y)
    }
}

impl<F> WalkabilityOracle for F
where
    F: Fn(i32, i32) -> bool,
{
    fn is_walkable(&self, x: i32, y: i32) -> bool {
        self(x, y)
    }
}

/// Row-major tile grid. Tile `(0,0)` is the first entry; cells outside the grid
/// and cells holding [`BLOCKED_TILE_ID`] are not walkable.
#[derive(Debug, Clone, PartialEq)]
pub struct Tilemap {
    width: u32,
    height: u32,
    tiles: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("row {row} has width {actual}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("unknown tile glyph '{glyph}' at row {row}, column {column}")]
    UnknownGlyph {
        glyph: char,
        row: usize,
        column: usize,
    },
}

impl Tilemap {
    pub fn new(width: u32, height: u32, tiles: Vec<u16>) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn open(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![0; width as usize * height as usize],
        }
    }

    /// Builds a map from text rows: `.` floor, `#` wall. Row 0 is `y == 0`.
    pub fn from_ascii_rows(rows: &[&str]) -> Result<Self, TilemapError> {
        let height = rows.len();
        let width = rows.first().map(|row| row.chars().count()).unwrap_or(0);
        let mut tiles = Vec::with_capacity(width * height);
        for (row_index, row) in rows.iter().enumerate() {
            let row_width = row.chars().count();
            if row_width != width {
                return Err(TilemapError::RaggedRow {
                    row: row_index,
                    expected: width,
                    actual: row_width,
                });
            }
            for (column, glyph) in row.chars().enumerate() {
                let tile_id = match glyph {
                    '.' => 0,
                    '#' => BLOCKED_TILE_ID,
                    other => {
                        return Err(TilemapError::UnknownGlyph {
                            glyph: other,
                            row: row_index,
                            column,
                        })
                    }
                };
                tiles.push(tile_id);
            }
        }
        Self::new(width as u32, height as u32, tiles)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<u16> {
        self.index_of(x, y)
            .and_then(|index| self.tiles.get(index).copied())
    }

    /// Returns false when the coordinate is outside the map.
    pub fn set_tile(&mut self, x: i32, y: i32, tile_id: u16) -> bool {
        match self.index_of(x, y) {
            Some(index) => {
                self.tiles[index] = tile_id;
                true
            }
            None => false,
        }
    }
}

impl WalkabilityOracle for Tilemap {
    fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.tile_at(x, y)
            .is_some_and(|tile_id| tile_id != BLOCKED_TILE_ID)
    }
}
