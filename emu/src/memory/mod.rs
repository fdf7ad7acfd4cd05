#[allow(clippy::cast_possible_truncation)]
pub mod flat_memory;
