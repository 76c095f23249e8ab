use std::f64::consts::TAU;

/// Small seedable generator; each actor owns one so its choices do not
/// contend on a shared source.
#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Derives an independent stream for entity `index` of a session.
    pub fn for_entity(session_seed: u32, index: usize) -> Self {
        Self::new(session_seed ^ (index as u32).wrapping_mul(0x9e37_79b9))
    }

    pub fn next_f64(&mut self) -> f64 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        out as f64 / 4_294_967_296.0
    }

    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f64;
        min + (self.next_f64() * span).floor() as i32
    }

    pub fn angle(&mut self) -> f64 {
        self.next_f64() * TAU
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        ((self.next_f64() * len as f64).floor() as usize).min(len - 1)
    }
}
