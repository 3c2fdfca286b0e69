/// Test data generators

use rand::Rng;

/// Generate random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Generate a random opaque command
pub fn random_command() -> Vec<u8> {
    random_bytes(32)
}

/// Generate a batch of random commands
pub fn random_commands(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_command()).collect()
}
