//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples engines and stores from the process
//! entropy source. Production code uses the operating system RNG; tests use
//! a seeded generator so that failures reproduce exactly.
//!
//! # Invariants
//!
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

/// Abstract source of randomness.
///
/// # Security
///
/// Production implementations MUST use cryptographically secure entropy
/// (`getrandom`). Simulation implementations MUST be seeded and SHOULD log
/// the seed for reproducibility.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Returns `N` random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }
}
