use crate::{
    digest_with_nonce,
    pow::{self, meets_difficulty, Difficulty},
    Block, BlockHeader, Hash, MineError,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Sequential,
    Parallel,
}

/// Shared flag that stops a running search from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Mining configuration: search strategy, an optional attempt budget, and a
/// cancel flag shared with every [`CancelHandle`] handed out.
#[derive(Clone, Debug, Default)]
pub struct Miner {
    strategy: Strategy,
    max_attempts: Option<u64>,
    cancel: CancelHandle,
}

impl Miner {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn sequential() -> Self {
        Self::new(Strategy::Sequential)
    }

    pub fn parallel() -> Self {
        Self::new(Strategy::Parallel)
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Clear a previous cancellation so the miner can be used again.
    pub fn reset(&self) {
        self.cancel.0.store(false, Ordering::Relaxed);
    }

    pub fn mine(
        &self,
        index: u32,
        amount: i32,
        prev_hash: Option<Hash>,
        difficulty: Difficulty,
    ) -> Result<Block, MineError> {
        let header = BlockHeader::new(index, amount, prev_hash);
        let result = match self.strategy {
            Strategy::Sequential => pow::search(header, difficulty, self.max_attempts, &self.cancel.0),
            Strategy::Parallel => {
                mine_block_parallel(header, difficulty, self.max_attempts, &self.cancel.0)
            }
        };
        match &result {
            Ok(block) => info!(
                "Mined block {} with nonce {} and hash {}",
                index,
                block.nonce(),
                block.hash()
            ),
            Err(err) => warn!(index, strategy = ?self.strategy, "mining stopped: {err}"),
        }
        result
    }
}

/// Searches nonces in parallel until a hash meets `difficulty`.
/// The first worker to succeed stops the rest, so the nonce is valid but not
/// necessarily the smallest one.
pub fn mine_block_parallel(
    header: BlockHeader,
    difficulty: Difficulty,
    max_attempts: Option<u64>,
    cancel: &AtomicBool,
) -> Result<Block, MineError> {
    let prefix = header.prefix_hasher();
    let limit = max_attempts.unwrap_or(u64::MAX);

    // Rayon splits the range across its pool.
    let found = (0u64..limit).into_par_iter().find_map_any(|nonce| {
        if cancel.load(Ordering::Relaxed) {
            return Some(Err(MineError::Cancelled));
        }
        let hash = digest_with_nonce(&prefix, nonce);
        meets_difficulty(&hash, difficulty).then_some(Ok((nonce, hash)))
    });

    match found {
        Some(Ok((nonce, hash))) => Ok(Block {
            header: header.with_nonce(nonce),
            hash,
        }),
        Some(Err(err)) => Err(err),
        None => Err(MineError::Exhausted { attempts: limit }),
    }
}
