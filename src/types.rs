use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        self.offset(dx, dy)
    }

    pub fn distance(self, other: Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn chebyshev(self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// WASD layout, the keys the game has always used.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'w' => Some(Self::Up),
            'a' => Some(Self::Left),
            's' => Some(Self::Down),
            'd' => Some(Self::Right),
            _ => None,
        }
    }
}

/// Abstract player action produced by whatever polls the keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Move(Direction),
    Jump(Direction),
    Interact,
    Quit,
}

impl InputEvent {
    /// Lowercase WASD walks, uppercase jumps, `e` interacts, `q` quits.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'e' | 'E' => Some(Self::Interact),
            'q' | 'Q' => Some(Self::Quit),
            _ => {
                let direction = Direction::from_key(key)?;
                if key.is_ascii_uppercase() {
                    Some(Self::Jump(direction))
                } else {
                    Some(Self::Move(direction))
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Monster,
    Enemy,
    Guardian,
    Star,
    Invisibility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId {
    pub kind: EntityKind,
    pub index: usize,
}

impl EntityId {
    pub const fn new(kind: EntityKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            EntityKind::Monster => "monster",
            EntityKind::Enemy => "enemy",
            EntityKind::Guardian => "guardian",
            EntityKind::Star => "star",
            EntityKind::Invisibility => "invisibility",
        };
        write!(f, "{}_{}", prefix, self.index + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Outcome {
    Quit,
    Caught { by: EntityId },
    InputClosed,
}
