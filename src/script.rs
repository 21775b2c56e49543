use anyhow::{bail, Context, Result};
use referral_core::{
    AccountId, Amount, Clock, ManualClock, ProgramSnapshot, RateTable, ReferralEvent,
    ReferralProgram,
};
use reward_ledger::RewardLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const TREASURY: &str = "treasury";

/// One line of a replay script.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Register { referee: AccountId, referrer: AccountId },
    Touch { account: AccountId },
    Play { payer: AccountId, value: Amount },
    Distribute { payer: AccountId, value: Amount },
    Advance { seconds: u64 },
}

/// Parse JSON lines; blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<(usize, Operation)>> {
    let mut ops = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let op: Operation = serde_json::from_str(line)
            .with_context(|| format!("script line {}", idx + 1))?;
        ops.push((idx + 1, op));
    }
    Ok(ops)
}

/// Result of one replayed operation, printed as a JSON line.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepReport {
    Ok {
        line: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        paid: Option<Amount>,
        events: Vec<ReferralEvent>,
    },
    Error {
        line: usize,
        message: String,
    },
}

/// Everything a run leaves behind: referral state plus ledger balances.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateFile {
    pub program: ProgramSnapshot,
    pub ledger: RewardLedger,
}

/// A program wired to a manual clock and a treasury-backed ledger: the
/// "game" side of a referral program.
pub struct Replay {
    program: ReferralProgram<ManualClock>,
    clock: ManualClock,
    ledger: RewardLedger,
}

impl Replay {
    pub fn new(rates: RateTable, treasury: Amount, start_time: u64) -> Result<Self> {
        let clock = ManualClock::new(start_time);
        let program = ReferralProgram::new(rates.config().clone(), clock.clone())?;
        let mut ledger = RewardLedger::new(TREASURY);
        ledger.deposit(&TREASURY.to_string(), treasury)?;
        Ok(Self {
            program,
            clock,
            ledger,
        })
    }

    /// Continue from a state file written by an earlier run.
    pub fn resume(state: StateFile, start_time: u64) -> Result<Self> {
        let clock = ManualClock::new(start_time);
        let program = ReferralProgram::restore(state.program, clock.clone())?;
        Ok(Self {
            program,
            clock,
            ledger: state.ledger,
        })
    }

    pub fn state(&self) -> StateFile {
        StateFile {
            program: self.program.snapshot(),
            ledger: self.ledger.clone(),
        }
    }

    pub fn program(&self) -> &ReferralProgram<ManualClock> {
        &self.program
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn step(&mut self, line: usize, op: &Operation) -> StepReport {
        debug!(line, ?op, "replaying operation");
        match self.apply(op) {
            Ok(paid) => StepReport::Ok {
                line,
                paid,
                events: self.program.drain_events(),
            },
            Err(err) => {
                warn!(line, error = %format!("{err:#}"), "operation failed");
                // failed operations leave no events behind
                self.program.drain_events();
                StepReport::Error {
                    line,
                    message: format!("{err:#}"),
                }
            }
        }
    }

    fn apply(&mut self, op: &Operation) -> Result<Option<Amount>> {
        match op {
            Operation::Register { referee, referrer } => {
                // soft rejections show up as events
                self.program.add_upline(referee, referrer)?;
                Ok(None)
            }
            Operation::Touch { account } => {
                self.program.touch_activity(account)?;
                Ok(None)
            }
            Operation::Play { payer, value } => {
                Ok(Some(self.program.play(payer, *value, &mut self.ledger)?))
            }
            Operation::Distribute { payer, value } => {
                Ok(Some(self.program.distribute(payer, *value, &mut self.ledger)?))
            }
            Operation::Advance { seconds } => {
                if *seconds == 0 {
                    bail!("advance needs a positive number of seconds");
                }
                if self.clock.advance(*seconds).is_none() {
                    bail!(
                        "advancing {seconds}s from {} overflows the clock",
                        self.clock.now()
                    );
                }
                Ok(None)
            }
        }
    }
}
