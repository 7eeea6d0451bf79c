use std::{fmt, iter, slice};

use tracing::{debug, info, warn};

use crate::error::{Account, AppendError, ChainError, MineError};
use crate::mine::Miner;
use crate::pow::Difficulty;
use crate::{Block, Hash};

/// Running balances while walking the chain. The genesis amount belongs to
/// Alice; every later amount moves from Alice to Bob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Ledger {
    alice: i64,
    bob: i64,
}

impl Ledger {
    fn apply(&mut self, position: usize, amount: i32) -> Result<(), ChainError> {
        let amount = i64::from(amount);
        self.alice += amount;
        if position > 0 {
            self.bob -= amount;
        }
        if self.alice < 0 {
            return Err(ChainError::NegativeBalance {
                index: position,
                account: Account::Alice,
                balance: self.alice,
            });
        }
        if self.bob < 0 {
            return Err(ChainError::NegativeBalance {
                index: position,
                account: Account::Bob,
                balance: self.bob,
            });
        }
        Ok(())
    }
}

/// Walk `blocks` once, stopping at the first violation.
fn verify_blocks<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    difficulty: Difficulty,
) -> Result<(), ChainError> {
    let mut ledger = Ledger::default();
    let mut prev: Option<&Block> = None;

    for (position, block) in blocks.into_iter().enumerate() {
        let recomputed = block.recompute_hash();
        if recomputed != *block.hash() {
            return Err(ChainError::HashMismatch { index: position });
        }
        if !recomputed.meets(difficulty) {
            return Err(ChainError::InsufficientWork { index: position });
        }

        match (prev, block.prev_hash()) {
            (None, Some(_)) => return Err(ChainError::GenesisHasPrevHash),
            (None, None) if block.index() != 0 => {
                return Err(ChainError::IndexMismatch {
                    expected: 0,
                    found: block.index(),
                })
            }
            (None, None) => {}
            (Some(_), None) => return Err(ChainError::MissingPrevHash { index: position }),
            (Some(parent), Some(link)) => {
                if link != parent.hash() {
                    return Err(ChainError::BrokenLink { index: position });
                }
                if parent.index().checked_add(1) != Some(block.index()) {
                    return Err(ChainError::IndexMismatch {
                        expected: parent.index().saturating_add(1),
                        found: block.index(),
                    });
                }
            }
        }

        ledger.apply(position, block.amount())?;
        prev = Some(block);
    }

    match prev {
        Some(_) => Ok(()),
        None => Err(ChainError::Empty),
    }
}

/// An append-only sequence of blocks, genesis first. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: Difficulty,
}

impl Chain {
    /// Mine a genesis block holding `initial` at the standard difficulty.
    pub fn new(initial: i32) -> Self {
        Self::with_difficulty(initial, Difficulty::STANDARD)
    }

    pub fn with_difficulty(initial: i32, difficulty: Difficulty) -> Self {
        let genesis = Block::mine_with_difficulty(0, initial, None, difficulty);
        info!(
            "Mined genesis block with nonce {} and hash {}",
            genesis.nonce(),
            genesis.hash()
        );
        Self {
            blocks: vec![genesis],
            difficulty,
        }
    }

    /// Mine the genesis block through `miner`, honoring its strategy, attempt
    /// budget and cancel flag.
    pub fn with_miner(
        initial: i32,
        difficulty: Difficulty,
        miner: &Miner,
    ) -> Result<Self, MineError> {
        let genesis = miner.mine(0, initial, None, difficulty)?;
        Ok(Self {
            blocks: vec![genesis],
            difficulty,
        })
    }

    /// Rebuild a chain from existing blocks without checking them; run
    /// [`Chain::verify`] to find out whether they hold together.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: Difficulty) -> Result<Self, ChainError> {
        if blocks.is_empty() {
            return Err(ChainError::Empty);
        }
        Ok(Self { blocks, difficulty })
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: the genesis block cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn last(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn tip_hash(&self) -> &Hash {
        self.last().hash()
    }

    /// Block number the next appended block must carry. Saturates at
    /// `u32::MAX`; a block carrying that number again is refused by `append`.
    pub fn next_index(&self) -> u32 {
        self.last().index().saturating_add(1)
    }

    /// Mine a candidate successor to the current tail. Does not touch the
    /// chain; hand the result to [`Chain::append`].
    pub fn mine(&self, amount: i32) -> Block {
        Block::mine_with_difficulty(
            self.next_index(),
            amount,
            Some(*self.tip_hash()),
            self.difficulty,
        )
    }

    /// Like [`Chain::mine`] but through a configured [`Miner`], which may run
    /// in parallel, give up, or be cancelled.
    pub fn mine_with(&self, miner: &Miner, amount: i32) -> Result<Block, MineError> {
        miner.mine(
            self.next_index(),
            amount,
            Some(*self.tip_hash()),
            self.difficulty,
        )
    }

    /// Append `block` if the chain with it as the new tail is valid. On
    /// failure the chain is left untouched.
    pub fn append(&mut self, block: Block) -> Result<(), AppendError> {
        let staged = self.blocks.iter().chain(iter::once(&block));
        if let Err(err) = verify_blocks(staged, self.difficulty) {
            warn!(index = block.index(), "rejected block: {err}");
            return Err(AppendError::InvalidChain(err));
        }
        debug!(
            index = block.index(),
            amount = block.amount(),
            nonce = block.nonce(),
            "appended block"
        );
        self.blocks.push(block);
        Ok(())
    }

    /// Drop the tail block. Returns false when only the genesis block is left.
    pub fn remove_last(&mut self) -> bool {
        if self.blocks.len() <= 1 {
            return false;
        }
        if let Some(removed) = self.blocks.pop() {
            debug!(index = removed.index(), "removed block");
        }
        true
    }

    /// Check linkage, proof-of-work and balances; the error names the first
    /// problem found.
    pub fn verify(&self) -> Result<(), ChainError> {
        verify_blocks(&self.blocks, self.difficulty)
    }

    pub fn validate(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(err) => {
                debug!("chain failed validation: {err}");
                false
            }
        }
    }

    /// (Alice, Bob) totals, whether or not the chain is valid.
    pub fn balances(&self) -> (i64, i64) {
        let alice = self.blocks.iter().map(|b| i64::from(b.amount())).sum();
        let bob = -self
            .blocks
            .iter()
            .skip(1)
            .map(|b| i64::from(b.amount()))
            .sum::<i64>();
        (alice, bob)
    }

    pub fn balance_of(&self, account: Account) -> i64 {
        let (alice, bob) = self.balances();
        match account {
            Account::Alice => alice,
            Account::Bob => bob,
        }
    }

    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "{block}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Block;
    type IntoIter = slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
