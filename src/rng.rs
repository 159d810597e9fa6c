use rand_core::{Error, RngCore};

// xoshiro256** seeded through SplitMix64.
// Reference: https://prng.di.unimi.it/

#[derive(Clone, Debug)]
pub struct Rng {
    state: [u64; 4],
}

impl Rng {
    pub fn from_seed(mut seed: u64) -> Self {
        let sm64 = |s: &mut u64| -> u64 {
            *s = s.wrapping_add(0x9e3779b97f4a7c15);
            let mut z = *s;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
            z ^ (z >> 31)
        };

        Rng {
            state: [
                sm64(&mut seed),
                sm64(&mut seed),
                sm64(&mut seed),
                sm64(&mut seed),
            ],
        }
    }

    /// Non-deterministic generator for interactive use.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random::<u64>())
    }

    /// Generator for Monte-Carlo chunk `chunk` of a run whose base seed is `base_seed`.
    /// Chunks are seeded independently of which thread picks them up.
    pub fn for_chunk(base_seed: u64, chunk: usize) -> Self {
        Self::from_seed(base_seed.wrapping_add(chunk as u64))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let result = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;

        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];

        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);

        result
    }

    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        unit_f64(self)
    }
}

/// Uniform float in [0.0, 1.0) from any `RngCore`: (u64 >> 11) * 2^-53.
#[inline]
pub fn unit_f64<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / 9007199254740992.0)
}

/// Bernoulli trial. `p >= 1.0` always succeeds, `p <= 0.0` never does.
#[inline]
pub fn chance<R: RngCore + ?Sized>(rng: &mut R, p: f64) -> bool {
    unit_f64(rng) < p
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        (Rng::next_u64(self) >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        Rng::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = Rng::next_u64(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Rng::from_seed(42);
        let mut b = Rng::from_seed(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn chunks_get_distinct_streams() {
        let mut a = Rng::for_chunk(7, 0);
        let mut b = Rng::for_chunk(7, 1);
        let same = (0..16).filter(|_| a.next_u64() == b.next_u64()).count();
        assert!(same < 16);
    }

    #[test]
    fn unit_floats_stay_in_range() {
        let mut rng = Rng::from_seed(9);
        let mut sum = 0.0;
        for _ in 0..10_000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
            sum += x;
        }
        assert!((sum / 10_000.0 - 0.5).abs() < 0.02);
    }

    #[test]
    fn chance_edges() {
        let mut rng = Rng::from_seed(3);
        for _ in 0..1000 {
            assert!(chance(&mut rng, 1.0));
            assert!(!chance(&mut rng, 0.0));
        }
    }

    #[test]
    fn fill_bytes_handles_partial_words() {
        let mut rng = Rng::from_seed(5);
        let mut buf = [0u8; 13];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
