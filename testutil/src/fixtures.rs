/// Deterministic fixtures
///
/// Seeded material so committees and payloads are reproducible across runs.

/// 32 bytes of key-seed material derived from a tag. Distinct tags give
/// distinct seeds.
pub fn seed(tag: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, chunk) in out.chunks_mut(8).enumerate() {
        chunk.copy_from_slice(&(tag.wrapping_add(i as u64 + 1)).to_le_bytes());
    }
    out
}

/// A reproducible batch of distinct commands.
pub fn command_batch(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("command-{i}").into_bytes())
        .collect()
}
