use std::fmt;

use thiserror::Error;

use crate::constants::{ALICE, BOB};

/// The two accounts tracked by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Account {
    Alice,
    Bob,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Alice => f.write_str(ALICE),
            Account::Bob => f.write_str(BOB),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {found}")]
    Length { expected: usize, found: usize },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MineError {
    #[error("no valid nonce found in {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("mining cancelled")]
    Cancelled,
}

/// First consistency violation found while walking a chain.
///
/// `index` is the position of the offending block in the chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain has no blocks")]
    Empty,

    #[error("genesis block carries a previous hash")]
    GenesisHasPrevHash,

    #[error("block {index} has no previous hash")]
    MissingPrevHash { index: usize },

    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("block {index}: hash does not meet the difficulty target")]
    InsufficientWork { index: usize },

    #[error("block {index}: previous hash does not match its predecessor")]
    BrokenLink { index: usize },

    #[error("expected block number {expected}, found {found}")]
    IndexMismatch { expected: u32, found: u32 },

    #[error("block {index}: {account}'s balance drops to {balance}")]
    NegativeBalance {
        index: usize,
        account: Account,
        balance: i64,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppendError {
    #[error("appending would invalidate the chain: {0}")]
    InvalidChain(#[source] ChainError),
}
