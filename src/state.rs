use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::entity::monster::MonsterMode;
use crate::types::{EntityId, Outcome, Position};
use crate::world::{Cell, CellKind, GlyphTable, Grid, LoadedMap};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MonsterMarker {
    pub id: EntityId,
    pub at: Position,
    pub mode: MonsterMode,
}

/// Canonical session state. Only reachable through the map gate.
#[derive(Clone, Debug)]
pub struct GameState {
    pub glyphs: Arc<GlyphTable>,
    pub grid: Grid,
    pub player: Position,
    pub under_player: Cell,
    pub status: String,
    pub invisible_steps: u32,
    pub double_jumps: u32,
    pub score: u32,
    pub lives: u32,
    pub steps: u64,
    pub monsters: BTreeMap<EntityId, MonsterMarker>,
    pub enemies: BTreeMap<EntityId, Position>,
    pub guardians: BTreeMap<EntityId, Position>,
    pub enemies_released: bool,
    pub outcome: Option<Outcome>,
}

impl GameState {
    pub fn new(map: LoadedMap, glyphs: Arc<GlyphTable>) -> Self {
        let under_player = glyphs.empty;
        Self {
            glyphs,
            grid: map.grid,
            player: map.player,
            under_player,
            status: String::new(),
            invisible_steps: 0,
            double_jumps: 0,
            score: 0,
            lives: 0,
            steps: 0,
            monsters: BTreeMap::new(),
            enemies: BTreeMap::new(),
            guardians: BTreeMap::new(),
            enemies_released: false,
            outcome: None,
        }
    }

    pub fn is_invisible(&self) -> bool {
        self.invisible_steps > 0
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn player_cell(&self) -> Cell {
        if self.is_invisible() {
            self.glyphs.player_invisible
        } else {
            self.glyphs.player
        }
    }

    pub fn can_enter(&self, pos: Position) -> bool {
        self.grid.can_enter(pos)
    }

    pub fn monster_at(&self, pos: Position) -> Option<EntityId> {
        self.monsters
            .values()
            .find(|marker| marker.at == pos)
            .map(|marker| marker.id)
    }

    /// Moves the player by (dx, dy) if the destination can be entered.
    /// Returns the cell content now under the player.
    pub fn move_player(&mut self, dx: i32, dy: i32) -> Option<Cell> {
        let target = self.player.offset(dx, dy);
        if !self.grid.can_enter(target) {
            return None;
        }
        if !self
            .grid
            .move_occupant(self.player, dx, dy, &mut self.under_player)
        {
            return None;
        }
        self.player = target;
        self.steps += 1;
        self.invisible_steps = self.invisible_steps.saturating_sub(1);
        Some(self.under_player)
    }

    /// Replaces a collectible's cell with empty ground, looking under the
    /// player first since that is where a freshly picked item sits.
    pub fn clear_item(&mut self, at: Position) -> bool {
        if at == self.player {
            if self.under_player.kind.is_collectible() {
                self.under_player = self.glyphs.empty;
                return true;
            }
            return false;
        }
        match self.grid.get(at) {
            Some(cell) if cell.kind.is_collectible() => self.grid.set(at, self.glyphs.empty),
            _ => false,
        }
    }

    /// Repaints a star cell in place, wherever it currently lives.
    pub fn paint_star(&mut self, at: Position, look: Cell) -> bool {
        if at == self.player {
            if self.under_player.kind == CellKind::Star {
                self.under_player = look;
                return true;
            }
            return false;
        }
        match self.grid.get(at) {
            Some(cell) if cell.kind == CellKind::Star => self.grid.set(at, look),
            _ => false,
        }
    }

    pub fn view(&self) -> GameView {
        GameView {
            grid: self.grid.clone(),
            player: self.player,
            player_cell: self.player_cell(),
            monster_cell: self.glyphs.monster,
            status: self.status.clone(),
            invisible_steps: self.invisible_steps,
            double_jumps: self.double_jumps,
            score: self.score,
            lives: self.lives,
            steps: self.steps,
            monsters: self.monsters.values().copied().collect(),
            enemies: self.enemies.len(),
            outcome: self.outcome,
        }
    }
}

/// Render snapshot: everything a front-end needs, detached from the gate.
#[derive(Clone, Debug, Serialize)]
pub struct GameView {
    pub grid: Grid,
    pub player: Position,
    pub player_cell: Cell,
    pub monster_cell: Cell,
    pub status: String,
    pub invisible_steps: u32,
    pub double_jumps: u32,
    pub score: u32,
    pub lives: u32,
    pub steps: u64,
    pub monsters: Vec<MonsterMarker>,
    pub enemies: usize,
    pub outcome: Option<Outcome>,
}

impl GameView {
    /// Cell to draw at `pos`, with the player and monsters layered on top of
    /// the grid.
    pub fn cell_at(&self, pos: Position) -> Option<Cell> {
        if pos == self.player {
            return Some(self.player_cell);
        }
        if self.monsters.iter().any(|marker| marker.at == pos) {
            return Some(self.monster_cell);
        }
        self.grid.get(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::parse_map;

    fn state(text: &str) -> GameState {
        let glyphs = Arc::new(GlyphTable::default());
        GameState::new(parse_map(text, &glyphs).unwrap(), glyphs)
    }

    #[test]
    fn player_move_remembers_item_underneath() {
        let mut state = state("▤▤▤▤\n▤☺★▤\n▤▤▤▤");
        let under = state.move_player(1, 0).unwrap();
        assert_eq!(under.kind, CellKind::Star);
        assert_eq!(state.player, Position::new(2, 1));
        assert!(state.clear_item(Position::new(2, 1)));
        state.move_player(-1, 0).unwrap();
        assert_eq!(state.grid.get(Position::new(2, 1)).unwrap().kind, CellKind::Empty);
    }

    #[test]
    fn walls_block_player() {
        let mut state = state("▤▤▤\n▤☺▤\n▤▤▤");
        assert!(state.move_player(1, 0).is_none());
        assert_eq!(state.player, Position::new(1, 1));
        assert_eq!(state.steps, 0);
    }

    #[test]
    fn invisibility_wears_off_per_step() {
        let mut state = state("☺   ");
        state.invisible_steps = 2;
        assert_eq!(state.player_cell(), state.glyphs.player_invisible);
        state.move_player(1, 0).unwrap();
        state.move_player(1, 0).unwrap();
        assert!(!state.is_invisible());
        assert_eq!(state.player_cell(), state.glyphs.player);
    }

    #[test]
    fn clearing_ignores_non_items() {
        let mut state = state("☺▤¤");
        assert!(!state.clear_item(Position::new(1, 0)));
        assert!(state.clear_item(Position::new(2, 0)));
        assert!(!state.clear_item(Position::new(2, 0)));
    }

    #[test]
    fn view_layers_player_over_grid() {
        let state = state("▤☺");
        let view = state.view();
        assert_eq!(view.cell_at(Position::new(1, 0)), Some(state.glyphs.player));
        assert_eq!(view.cell_at(Position::new(0, 0)), Some(state.glyphs.wall));
    }
}
