use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random source for the `random` opcode.
///
/// Starts nondeterministic; the opcode can reseed it either from entropy
/// (argument 0) or deterministically (negative argument), which games use
/// for scripted test runs.
pub struct ZRand {
    rng: StdRng,
}

impl ZRand {
    pub fn new() -> ZRand {
        ZRand {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn reseed_entropy(&mut self) {
        self.rng = StdRng::from_entropy();
    }

    /// Uniform value in `1..=bound`; `bound` must be nonzero.
    pub fn next_in_range(&mut self, bound: u16) -> u16 {
        self.rng.gen_range(1..=bound)
    }
}

impl Default for ZRand {
    fn default() -> Self {
        ZRand::new()
    }
}
