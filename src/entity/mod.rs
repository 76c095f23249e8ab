pub mod collectible;
pub mod guardian;
pub mod monster;
pub mod patrol;
pub mod star;
