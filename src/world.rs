use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{GameError, Result};
use crate::types::Position;

/// Abstract palette; the front-end decides what each tint looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tint {
    Default,
    Text,
    DarkGray,
    Red,
    Green,
    Yellow,
    Wall,
    WallBackground,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Empty,
    Wall,
    Vegetation,
    Player,
    Monster,
    Enemy,
    Guardian,
    Invisibility,
    Star,
}

impl CellKind {
    pub fn is_collectible(self) -> bool {
        matches!(self, CellKind::Invisibility | CellKind::Star)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub symbol: char,
    pub fg: Tint,
    pub bg: Tint,
    pub passable: bool,
    pub kind: CellKind,
}

impl Cell {
    pub const fn new(symbol: char, fg: Tint, bg: Tint, passable: bool, kind: CellKind) -> Self {
        Self {
            symbol,
            fg,
            bg,
            passable,
            kind,
        }
    }
}

/// What a map character stands for before any entity is created from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapGlyph {
    Empty,
    Wall,
    Vegetation,
    Player,
    Monster,
    Enemy,
    Guardian,
    Invisibility,
    Star,
}

/// Symbol table shared by the loader and the renderer. Built once per process.
#[derive(Clone, Debug)]
pub struct GlyphTable {
    pub empty: Cell,
    pub wall: Cell,
    pub vegetation: Cell,
    pub player: Cell,
    pub player_invisible: Cell,
    pub monster: Cell,
    pub enemy: Cell,
    pub guardian: Cell,
    pub invisibility: Cell,
    pub star_visible: Cell,
    pub star_pulsing: Cell,
    pub star_charging: Cell,
    pub star_hidden: Cell,
}

impl Default for GlyphTable {
    fn default() -> Self {
        Self {
            empty: Cell::new(' ', Tint::Default, Tint::Default, true, CellKind::Empty),
            wall: Cell::new('▤', Tint::Wall, Tint::WallBackground, false, CellKind::Wall),
            vegetation: Cell::new('♣', Tint::Green, Tint::Default, true, CellKind::Vegetation),
            player: Cell::new('☺', Tint::DarkGray, Tint::Default, false, CellKind::Player),
            player_invisible: Cell::new('☺', Tint::Text, Tint::Default, false, CellKind::Player),
            monster: Cell::new('☠', Tint::Red, Tint::Default, false, CellKind::Monster),
            enemy: Cell::new('☠', Tint::Red, Tint::Default, false, CellKind::Enemy),
            guardian: Cell::new('☥', Tint::Yellow, Tint::Default, false, CellKind::Guardian),
            invisibility: Cell::new('¤', Tint::Yellow, Tint::Default, true, CellKind::Invisibility),
            star_visible: Cell::new('★', Tint::Yellow, Tint::Default, true, CellKind::Star),
            star_pulsing: Cell::new('✦', Tint::DarkGray, Tint::Default, true, CellKind::Star),
            star_charging: Cell::new('◉', Tint::Red, Tint::Default, true, CellKind::Star),
            star_hidden: Cell::new(' ', Tint::Default, Tint::Default, true, CellKind::Star),
        }
    }
}

impl GlyphTable {
    /// Patrol enemies are drawn like monsters but placed in map files with a
    /// symbol of their own.
    pub const ENEMY_MAP_SYMBOL: char = '☣';

    pub fn classify(&self, ch: char) -> MapGlyph {
        if ch == self.wall.symbol {
            MapGlyph::Wall
        } else if ch == self.vegetation.symbol {
            MapGlyph::Vegetation
        } else if ch == self.player.symbol {
            MapGlyph::Player
        } else if ch == self.monster.symbol {
            MapGlyph::Monster
        } else if ch == Self::ENEMY_MAP_SYMBOL {
            MapGlyph::Enemy
        } else if ch == self.guardian.symbol {
            MapGlyph::Guardian
        } else if ch == self.invisibility.symbol {
            MapGlyph::Invisibility
        } else if ch == self.star_visible.symbol {
            MapGlyph::Star
        } else {
            MapGlyph::Empty
        }
    }
}

/// Rectangular cell grid. Shorter rows in the source text are padded with
/// empty cells, so every in-bounds coordinate has a cell.
#[derive(Clone, Debug, Serialize)]
pub struct Grid {
    width: i32,
    height: i32,
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_rows(mut rows: Vec<Vec<Cell>>, fill: Cell) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, fill);
        }
        Self {
            width: width as i32,
            height: rows.len() as i32,
            rows,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn get(&self, pos: Position) -> Option<Cell> {
        if !self.contains(pos) {
            return None;
        }
        Some(self.rows[pos.y as usize][pos.x as usize])
    }

    pub fn set(&mut self, pos: Position, cell: Cell) -> bool {
        if !self.contains(pos) {
            return false;
        }
        self.rows[pos.y as usize][pos.x as usize] = cell;
        true
    }

    pub fn can_enter(&self, pos: Position) -> bool {
        self.get(pos).is_some_and(|cell| cell.passable)
    }

    /// Moves whatever occupies `from` by (dx, dy). The cell being left gets
    /// back the content remembered in `under`, and `under` then remembers the
    /// destination's previous content.
    pub fn move_occupant(&mut self, from: Position, dx: i32, dy: i32, under: &mut Cell) -> bool {
        let to = from.offset(dx, dy);
        let (Some(occupant), Some(target)) = (self.get(from), self.get(to)) else {
            return false;
        };
        self.set(from, *under);
        *under = target;
        self.set(to, occupant);
        true
    }
}

#[derive(Clone, Debug, Default)]
pub struct Spawns {
    pub player: Option<Position>,
    pub monsters: Vec<Position>,
    pub enemies: Vec<Position>,
    pub guardians: Vec<Position>,
    pub stars: Vec<Position>,
    pub invisibility: Vec<Position>,
}

#[derive(Clone, Debug)]
pub struct LoadedMap {
    pub grid: Grid,
    pub player: Position,
    pub spawns: Spawns,
}

pub fn load_map_file(path: &Path, glyphs: &GlyphTable) -> Result<LoadedMap> {
    let text = fs::read_to_string(path).map_err(|source| GameError::MapLoad {
        path: path.to_path_buf(),
        source,
    })?;
    parse_map(&text, glyphs)
}

pub fn parse_map(text: &str, glyphs: &GlyphTable) -> Result<LoadedMap> {
    let mut spawns = Spawns::default();
    let mut rows = Vec::new();

    for (y, line) in text.lines().enumerate() {
        let mut row = Vec::new();
        for (x, ch) in line.chars().enumerate() {
            let pos = Position::new(x as i32, y as i32);
            let cell = match glyphs.classify(ch) {
                MapGlyph::Wall => glyphs.wall,
                MapGlyph::Vegetation => glyphs.vegetation,
                MapGlyph::Empty => glyphs.empty,
                MapGlyph::Player => {
                    if spawns.player.is_none() {
                        spawns.player = Some(pos);
                    }
                    glyphs.empty
                }
                MapGlyph::Monster => {
                    spawns.monsters.push(pos);
                    glyphs.empty
                }
                MapGlyph::Enemy => {
                    spawns.enemies.push(pos);
                    glyphs.enemy
                }
                MapGlyph::Guardian => {
                    spawns.guardians.push(pos);
                    glyphs.guardian
                }
                MapGlyph::Invisibility => {
                    spawns.invisibility.push(pos);
                    glyphs.invisibility
                }
                MapGlyph::Star => {
                    spawns.stars.push(pos);
                    glyphs.star_visible
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(GameError::EmptyMap);
    }
    let player = spawns.player.ok_or(GameError::MissingPlayer)?;

    Ok(LoadedMap {
        grid: Grid::from_rows(rows, glyphs.empty),
        player,
        spawns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_row_map_places_player_and_walls() {
        let glyphs = GlyphTable::default();
        let map = parse_map("▤▤▤\n▤☺ ▤\n▤▤▤", &glyphs).unwrap();
        assert_eq!(map.player, Position::new(1, 1));
        assert!(map.grid.can_enter(Position::new(1, 1)));
        assert!(!map.grid.can_enter(Position::new(0, 0)));
        assert!(!map.grid.can_enter(Position::new(-1, 1)));
        assert!(!map.grid.can_enter(Position::new(1, 3)));
    }

    #[test]
    fn short_rows_are_padded_with_empty_cells() {
        let glyphs = GlyphTable::default();
        let map = parse_map("▤▤▤▤▤\n☺\n▤▤", &glyphs).unwrap();
        assert_eq!(map.grid.width(), 5);
        assert_eq!(map.grid.get(Position::new(4, 1)), Some(glyphs.empty));
        assert!(map.grid.can_enter(Position::new(3, 2)));
    }

    #[test]
    fn unknown_characters_load_as_empty() {
        let glyphs = GlyphTable::default();
        let map = parse_map("☺x#", &glyphs).unwrap();
        assert_eq!(map.grid.get(Position::new(1, 0)), Some(glyphs.empty));
        assert_eq!(map.grid.get(Position::new(2, 0)), Some(glyphs.empty));
    }

    #[test]
    fn entity_glyphs_become_spawns() {
        let glyphs = GlyphTable::default();
        let map = parse_map("☺☠☣☥¤★♣", &glyphs).unwrap();
        assert_eq!(map.spawns.monsters, vec![Position::new(1, 0)]);
        assert_eq!(map.spawns.enemies, vec![Position::new(2, 0)]);
        assert_eq!(map.spawns.guardians, vec![Position::new(3, 0)]);
        assert_eq!(map.spawns.invisibility, vec![Position::new(4, 0)]);
        assert_eq!(map.spawns.stars, vec![Position::new(5, 0)]);
        assert_eq!(map.grid.get(Position::new(1, 0)), Some(glyphs.empty));
        assert_eq!(map.grid.get(Position::new(2, 0)), Some(glyphs.enemy));
        assert!(map.grid.can_enter(Position::new(6, 0)));
    }

    #[test]
    fn missing_player_is_rejected() {
        let glyphs = GlyphTable::default();
        assert!(matches!(
            parse_map("▤▤\n  ", &glyphs),
            Err(GameError::MissingPlayer)
        ));
        assert!(matches!(parse_map("", &glyphs), Err(GameError::EmptyMap)));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let glyphs = GlyphTable::default();
        let result = load_map_file(Path::new("/nonexistent/map.txt"), &glyphs);
        assert!(matches!(result, Err(GameError::MapLoad { .. })));
    }

    #[test]
    fn move_occupant_restores_and_remembers() {
        let glyphs = GlyphTable::default();
        let mut grid = Grid::from_rows(
            vec![vec![glyphs.enemy, glyphs.star_visible, glyphs.vegetation]],
            glyphs.empty,
        );
        let mut under = glyphs.empty;

        assert!(grid.move_occupant(Position::new(0, 0), 1, 0, &mut under));
        assert_eq!(grid.get(Position::new(0, 0)), Some(glyphs.empty));
        assert_eq!(grid.get(Position::new(1, 0)), Some(glyphs.enemy));
        assert_eq!(under, glyphs.star_visible);

        assert!(grid.move_occupant(Position::new(1, 0), 1, 0, &mut under));
        assert_eq!(grid.get(Position::new(1, 0)), Some(glyphs.star_visible));
        assert_eq!(grid.get(Position::new(2, 0)), Some(glyphs.enemy));
        assert_eq!(under, glyphs.vegetation);

        assert!(!grid.move_occupant(Position::new(2, 0), 1, 0, &mut under));
    }
}
