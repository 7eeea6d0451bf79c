pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

use crate::constants::HASH_SIZE;

pub use crate::chain::Chain;
pub use crate::error::{Account, AppendError, ChainError, HashParseError, MineError};
pub use crate::mine::{CancelHandle, Miner, Strategy};
pub use crate::pow::Difficulty;

/// A SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Panics unless `bytes` is exactly `HASH_SIZE` long.
    pub fn from_slice(bytes: &[u8]) -> Self {
        assert_eq!(
            bytes.len(),
            HASH_SIZE,
            "a hash is {HASH_SIZE} bytes, got {}",
            bytes.len()
        );
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(bytes);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn leading_zero_bytes(&self) -> usize {
        self.0.iter().take_while(|b| **b == 0).count()
    }

    pub fn meets(&self, difficulty: Difficulty) -> bool {
        pow::meets_difficulty(self, difficulty)
    }

    /// True when the first three bytes are zero.
    pub fn is_valid(&self) -> bool {
        self.0.len() > 3 && self.meets(Difficulty::STANDARD)
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::LowerHex for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != HASH_SIZE {
            return Err(HashParseError::Length {
                expected: HASH_SIZE,
                found: bytes.len(),
            });
        }
        Ok(Self::from_slice(&bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The hashed fields of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u32,
    pub amount: i32,
    pub prev_hash: Option<Hash>,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(index: u32, amount: i32, prev_hash: Option<Hash>) -> Self {
        Self {
            index,
            amount,
            prev_hash,
            nonce: 0,
        }
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        Self { nonce, ..self }
    }

    /// Big-endian index and amount, the previous hash when there is one, then
    /// the big-endian nonce. The genesis preimage is 32 bytes shorter.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + 4 + HASH_SIZE + 8);
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        if let Some(prev) = &self.prev_hash {
            bytes.extend_from_slice(prev.as_bytes());
        }
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        digest_with_nonce(&self.prefix_hasher(), self.nonce)
    }

    /// Hasher state after everything but the nonce.
    pub(crate) fn prefix_hasher(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_be_bytes());
        hasher.update(self.amount.to_be_bytes());
        if let Some(prev) = &self.prev_hash {
            hasher.update(prev.as_bytes());
        }
        hasher
    }
}

pub(crate) fn digest_with_nonce(prefix: &Sha256, nonce: u64) -> Hash {
    let mut hasher = prefix.clone();
    hasher.update(nonce.to_be_bytes());
    Hash::from_slice(&hasher.finalize())
}

/// One ledger entry. Immutable once built; the hash is always derived from
/// the header except when a block is deserialized, which keeps the stored
/// hash so that chain validation can catch tampering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    header: BlockHeader,
    hash: Hash,
}

impl Block {
    /// Search nonces from zero until the hash has three leading zero bytes.
    pub fn mine(index: u32, amount: i32, prev_hash: Option<Hash>) -> Self {
        Self::mine_with_difficulty(index, amount, prev_hash, Difficulty::STANDARD)
    }

    pub fn mine_with_difficulty(
        index: u32,
        amount: i32,
        prev_hash: Option<Hash>,
        difficulty: Difficulty,
    ) -> Self {
        pow::mine_block(BlockHeader::new(index, amount, prev_hash), difficulty)
    }

    /// Build a block around a caller-supplied nonce. The hash is not checked
    /// against any difficulty here.
    pub fn from_nonce(index: u32, amount: i32, prev_hash: Option<Hash>, nonce: u64) -> Self {
        Self::from_header(BlockHeader::new(index, amount, prev_hash).with_nonce(nonce))
    }

    pub fn from_header(header: BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            header,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }

    pub fn amount(&self) -> i32 {
        self.header.amount
    }

    pub fn prev_hash(&self) -> Option<&Hash> {
        self.header.prev_hash.as_ref()
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn recompute_hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn has_consistent_hash(&self) -> bool {
        self.recompute_hash() == self.hash
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {} (Amount: {}, Nonce: {}, prevHash: ",
            self.index(),
            self.amount(),
            self.nonce()
        )?;
        match self.prev_hash() {
            Some(prev) => write!(f, "{prev}")?,
            None => f.write_str("null")?,
        }
        write!(f, ", hash: {})", self.hash)
    }
}

pub mod pow {
    use super::{digest_with_nonce, Block, BlockHeader, Hash};
    use crate::constants::{HASH_SIZE, POW_TARGET_ZERO_BYTES};
    use crate::error::MineError;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// How often a bounded search looks at its cancel flag.
    pub(crate) const CANCEL_CHECK_INTERVAL: u64 = 4096;

    /// Number of leading zero bytes a hash must have.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct Difficulty(pub u8);

    impl Difficulty {
        pub const STANDARD: Self = Self(POW_TARGET_ZERO_BYTES);

        pub fn zero_bytes(self) -> usize {
            usize::from(self.0)
        }
    }

    impl Default for Difficulty {
        fn default() -> Self {
            Self::STANDARD
        }
    }

    impl fmt::Display for Difficulty {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} leading zero bytes", self.0)
        }
    }

    /// A target longer than the hash can never be met.
    pub fn meets_difficulty(hash: &Hash, difficulty: Difficulty) -> bool {
        let zeros = difficulty.zero_bytes();
        zeros <= HASH_SIZE && hash.as_bytes()[..zeros].iter().all(|b| *b == 0)
    }

    /// Mine the block by incrementing the nonce from zero until the hash has
    /// at least `difficulty` leading zero bytes. The nonce already in `header`
    /// is ignored, so the result is the smallest satisfying nonce.
    pub fn mine_block(header: BlockHeader, difficulty: Difficulty) -> Block {
        let prefix = header.prefix_hasher();
        let mut nonce = 0u64;
        loop {
            let hash = digest_with_nonce(&prefix, nonce);
            if meets_difficulty(&hash, difficulty) {
                return Block {
                    header: header.with_nonce(nonce),
                    hash,
                };
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    /// Sequential search that gives up after `max_attempts` nonces or once
    /// `cancel` is raised.
    pub fn search(
        header: BlockHeader,
        difficulty: Difficulty,
        max_attempts: Option<u64>,
        cancel: &AtomicBool,
    ) -> Result<Block, MineError> {
        let prefix = header.prefix_hasher();
        let limit = max_attempts.unwrap_or(u64::MAX);
        for nonce in 0..limit {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return Err(MineError::Cancelled);
            }
            let hash = digest_with_nonce(&prefix, nonce);
            if meets_difficulty(&hash, difficulty) {
                return Ok(Block {
                    header: header.with_nonce(nonce),
                    hash,
                });
            }
        }
        Err(MineError::Exhausted { attempts: limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HASH_HEX_SIZE;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::sync::atomic::AtomicBool;

    // Smallest nonce giving (0, 100, no prev) three leading zero bytes.
    const GENESIS_100_NONCE: u64 = 7_646_266;
    const GENESIS_100_HASH: &str =
        "0000001657dc8718ba36e1c407bd9e8de4bd9c6444a0de5a60103b5f5ba8c3c6";

    fn genesis_100() -> Block {
        Block::from_nonce(0, 100, None, GENESIS_100_NONCE)
    }

    #[test]
    fn hash_hex_rendering() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[0] = 0xAB;
        bytes[31] = 0x01;
        let s = Hash::new(bytes).to_string();
        assert_eq!(s.len(), HASH_HEX_SIZE);
        assert!(s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert!(s.starts_with("ab00"));
        assert!(s.ends_with("01"));
    }

    #[test]
    fn hash_validity_needs_three_zero_bytes() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[3] = 0xFF;
        assert!(Hash::new(bytes).is_valid());
        bytes[2] = 0x01;
        assert!(!Hash::new(bytes).is_valid());
        assert_eq!(Hash::new(bytes).leading_zero_bytes(), 2);
        assert!(Hash::new(bytes).meets(Difficulty(2)));
        assert!(!Hash::new([0u8; HASH_SIZE]).meets(Difficulty(33)));
    }

    #[test]
    #[should_panic]
    fn hash_from_short_slice_panics() {
        Hash::from_slice(&[0u8; 31]);
    }

    #[test]
    fn hash_parse() {
        let hash: Hash = GENESIS_100_HASH.parse().unwrap();
        assert_eq!(hash.to_string(), GENESIS_100_HASH);
        assert!(matches!(
            "00ff".parse::<Hash>(),
            Err(HashParseError::Length {
                expected: 32,
                found: 2
            })
        ));
        assert!(matches!("zz".parse::<Hash>(), Err(HashParseError::Hex(_))));
    }

    #[test]
    fn block_header_hash_bytes_example() {
        let prev = Hash::new([7u8; HASH_SIZE]);
        let header = BlockHeader::new(1, -20, Some(prev)).with_nonce(42);
        let bytes = header.hash_bytes();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..8], &(-20i32).to_be_bytes());
        assert_eq!(&bytes[8..40], &[7u8; 32]);
        assert_eq!(&bytes[40..48], &42u64.to_be_bytes());
    }

    #[test]
    fn genesis_preimage_omits_prev_hash() {
        let header = BlockHeader::new(0, 100, None);
        let bytes = header.hash_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 100, 0, 0, 0, 0, 0, 0, 0, 0]);
        // Not the same as hashing a zero-filled previous hash.
        let zeroed = BlockHeader::new(0, 100, Some(Hash::new([0u8; HASH_SIZE])));
        assert_ne!(header.hash(), zeroed.hash());
    }

    #[test]
    fn block_hash_example() {
        let block = Block::from_nonce(0, 100, None, 0);
        assert_eq!(
            block.hash().to_string(),
            "0e79233dcfd0284e3bc4e690745286212cae7cb0bbbbb9ada9e399aeb1535e8e"
        );
        let mut hasher = Sha256::new();
        hasher.update(block.header().hash_bytes());
        assert_eq!(block.hash(), &Hash::from_slice(&hasher.finalize()));
    }

    #[test]
    fn standard_difficulty_known_answers() {
        let genesis = genesis_100();
        assert_eq!(genesis.hash().to_string(), GENESIS_100_HASH);
        assert!(genesis.hash().is_valid());

        let next = Block::from_nonce(1, -20, Some(*genesis.hash()), 8_555_657);
        assert_eq!(
            next.hash().to_string(),
            "000000b67936db08b9c6792bee16fea178f25109f355b38b966e05b3b7972649"
        );
        assert!(next.hash().is_valid());

        let unmined = Block::from_nonce(1, -20, Some(*genesis.hash()), 0);
        assert!(!unmined.hash().is_valid());
    }

    #[test]
    fn mining_finds_the_smallest_nonce() {
        let easy = Block::mine_with_difficulty(0, 100, None, Difficulty(1));
        assert_eq!(easy.nonce(), 66);
        let harder = Block::mine_with_difficulty(0, 100, None, Difficulty(2));
        assert_eq!(harder.nonce(), 84_900);
        assert!(harder.hash().meets(Difficulty(2)));
    }

    #[test]
    fn mine_and_from_nonce_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut prev = None;
        for _ in 0..50 {
            let index: u32 = rng.gen_range(0..10_000);
            let amount: i32 = rng.gen_range(-1_000..1_000);
            let mined = Block::mine_with_difficulty(index, amount, prev, Difficulty(1));
            assert_eq!(mined.hash().as_bytes()[0], 0);
            let rebuilt = Block::from_nonce(index, amount, prev, mined.nonce());
            assert_eq!(rebuilt, mined);
            assert!(rebuilt.has_consistent_hash());
            prev = Some(*mined.hash());
        }
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let a = Block::from_nonce(3, 10, Some(*genesis_100().hash()), 1);
        let b = Block::from_nonce(3, 10, Some(*genesis_100().hash()), 2);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn search_gives_up() {
        let never = AtomicBool::new(false);
        let header = BlockHeader::new(0, 1, None);
        assert_eq!(
            pow::search(header, Difficulty(32), Some(10), &never),
            Err(MineError::Exhausted { attempts: 10 })
        );

        let cancelled = AtomicBool::new(true);
        assert_eq!(
            pow::search(header, Difficulty(1), None, &cancelled),
            Err(MineError::Cancelled)
        );

        let found = pow::search(BlockHeader::new(0, 100, None), Difficulty(1), Some(1_000), &never)
            .unwrap();
        assert_eq!(found.nonce(), 66);
    }

    #[test]
    fn block_display() {
        let genesis = genesis_100();
        assert_eq!(
            genesis.to_string(),
            format!("Block 0 (Amount: 100, Nonce: 7646266, prevHash: null, hash: {GENESIS_100_HASH})")
        );
        let next = Block::from_nonce(1, -20, Some(*genesis.hash()), 5);
        assert!(next
            .to_string()
            .contains(&format!("prevHash: {GENESIS_100_HASH}, hash: ")));
    }

    #[test]
    fn block_serialization_example() {
        let genesis = genesis_100();
        let json = serde_json::to_string(&genesis).unwrap();
        let expected_json = format!(
            r#"{{"index":0,"amount":100,"prev_hash":null,"nonce":7646266,"hash":"{GENESIS_100_HASH}"}}"#
        );
        assert_eq!(json, expected_json);
        let deserialized: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, genesis);
    }

    #[test]
    fn deserialized_block_keeps_stored_hash() {
        let mut value = serde_json::to_value(genesis_100()).unwrap();
        value["amount"] = serde_json::json!(1_000);
        let tampered: Block = serde_json::from_value(value).unwrap();
        assert_eq!(tampered.hash().to_string(), GENESIS_100_HASH);
        assert!(!tampered.has_consistent_hash());

        let mut value = serde_json::to_value(genesis_100()).unwrap();
        value["hash"] = serde_json::json!("abcd");
        assert!(serde_json::from_value::<Block>(value).is_err());
    }
}
