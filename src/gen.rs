pub use self::{config::*, engine::*};

mod config;
mod engine;
pub mod values;


use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

/// Random source for reproducible runs.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
