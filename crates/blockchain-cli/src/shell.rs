use anyhow::{anyhow, Result};
use blockchain_core::{Block, Chain, Miner};
use std::io::{BufRead, Write};
use std::str::FromStr;
use tracing::debug;

const HELP: &str = "Valid commands:
    mine: discovers the nonce for a given transaction
    append: appends a new block onto the end of the chain
    remove: removes the last block from the end of the chain
    check: checks that the block chain is valid
    report: reports the balances of Alice and Bob
    help: prints this list of commands
    quit: quits the program
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Mine,
    Append,
    Remove,
    Check,
    Report,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mine" => Ok(Command::Mine),
            "append" => Ok(Command::Append),
            "remove" => Ok(Command::Remove),
            "check" => Ok(Command::Check),
            "report" => Ok(Command::Report),
            "help" => Ok(Command::Help),
            "quit" => Ok(Command::Quit),
            other => Err(anyhow!("unknown command {other:?}")),
        }
    }
}

/// One answer to a prompt.
enum Reply<T> {
    Value(T),
    Invalid(String),
    Closed,
}

/// Line-oriented driver: reads commands from `input`, calls into the chain,
/// and writes the transcript to `output`.
pub struct Shell<R, W> {
    chain: Chain,
    miner: Miner,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(chain: Chain, miner: Miner, input: R, output: W) -> Self {
        Self {
            chain,
            miner,
            input,
            output,
        }
    }

    #[cfg(test)]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Run until `quit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        write!(self.output, "{}", self.chain)?;
        while let Some(line) = self.prompt("Command? ")? {
            let keep_going = match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command)?,
                Err(err) => {
                    debug!("{err}");
                    writeln!(self.output, "That is not a valid input. Please try again.")?;
                    writeln!(self.output, "Call help to see the commands\n")?;
                    true
                }
            };
            if !keep_going {
                break;
            }
            write!(self.output, "{}", self.chain)?;
        }
        self.output.flush()?;
        Ok(())
    }

    /// Returns false when input ran out mid-command.
    fn execute(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Mine => {
                let amount = match self.read_number::<i32>("Amount transferred? ")? {
                    Reply::Value(amount) => amount,
                    Reply::Invalid(text) => return self.reject_number(&text),
                    Reply::Closed => return Ok(false),
                };
                match self.chain.mine_with(&self.miner, amount) {
                    Ok(block) => writeln!(
                        self.output,
                        "amount = {amount}, nonce = {}\n",
                        block.nonce()
                    )?,
                    Err(err) => writeln!(self.output, "Mining failed: {err}\n")?,
                }
            }
            Command::Append => {
                let amount = match self.read_number::<i32>("Amount transferred? ")? {
                    Reply::Value(amount) => amount,
                    Reply::Invalid(text) => return self.reject_number(&text),
                    Reply::Closed => return Ok(false),
                };
                let nonce = match self.read_number::<u64>("Nonce? ")? {
                    Reply::Value(nonce) => nonce,
                    Reply::Invalid(text) => return self.reject_number(&text),
                    Reply::Closed => return Ok(false),
                };
                let block = Block::from_nonce(
                    self.chain.next_index(),
                    amount,
                    Some(*self.chain.tip_hash()),
                    nonce,
                );
                match self.chain.append(block) {
                    Ok(()) => writeln!(self.output)?,
                    Err(err) => writeln!(self.output, "Block rejected: {err}\n")?,
                }
            }
            Command::Remove => {
                if !self.chain.remove_last() {
                    writeln!(self.output, "Only the genesis block is left.")?;
                }
                writeln!(self.output)?;
            }
            Command::Check => match self.chain.verify() {
                Ok(()) => writeln!(self.output, "Chain is valid!\n")?,
                Err(err) => writeln!(self.output, "Chain is invalid! ({err})\n")?,
            },
            Command::Report => {
                let (alice, bob) = self.chain.balances();
                writeln!(self.output, "Alice: {alice}, Bob: {bob}\n")?;
            }
            Command::Help => writeln!(self.output, "{HELP}")?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    fn read_number<T: FromStr>(&mut self, label: &str) -> Result<Reply<T>> {
        Ok(match self.prompt(label)? {
            Some(text) => match text.parse() {
                Ok(value) => Reply::Value(value),
                Err(_) => Reply::Invalid(text),
            },
            None => Reply::Closed,
        })
    }

    fn reject_number(&mut self, text: &str) -> Result<bool> {
        writeln!(self.output, "{text:?} is not a number\n")?;
        Ok(true)
    }
}
