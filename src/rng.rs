use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub type SimRng = ChaCha8Rng;

pub fn seeded(seed: u64) -> SimRng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Seeds from `seed` when given, otherwise from OS entropy. Falls back to a
/// fixed seed if the platform has no entropy source.
pub fn from_seed_or_entropy(seed: Option<u64>) -> SimRng {
    match seed {
        Some(seed) => seeded(seed),
        None => {
            let mut bytes = [0u8; 8];
            match getrandom::fill(&mut bytes) {
                Ok(()) => seeded(u64::from_le_bytes(bytes)),
                Err(err) => {
                    log::warn!("entropy unavailable ({err}), using fixed seed");
                    seeded(0x5EED)
                }
            }
        }
    }
}

/// Uniform sample in `[-amount, amount]`; zero when `amount` is not positive.
pub fn symmetric(rng: &mut SimRng, amount: f32) -> f32 {
    if amount > 0.0 {
        rng.gen_range(-amount..=amount)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::{seeded, symmetric};

    #[test]
    fn same_seed_same_stream() {
        let mut a = seeded(7);
        let mut b = seeded(7);
        for _ in 0..16 {
            assert_eq!(symmetric(&mut a, 1.0), symmetric(&mut b, 1.0));
        }
    }

    #[test]
    fn symmetric_stays_in_range() {
        let mut rng = seeded(1);
        for _ in 0..1000 {
            let v = symmetric(&mut rng, 0.25);
            assert!((-0.25..=0.25).contains(&v));
        }
        assert_eq!(symmetric(&mut rng, 0.0), 0.0);
    }
}
