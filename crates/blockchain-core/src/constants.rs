pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Leading zero bytes a block hash needs to count as proof-of-work.
pub const POW_TARGET_ZERO_BYTES: u8 = 3;
pub const ALICE: &str = "Alice";
pub const BOB: &str = "Bob";
