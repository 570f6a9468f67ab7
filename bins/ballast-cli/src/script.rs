//! Replayable JSON scripts of ledger actions.
//!
//! A script funds accounts, grants roles, then applies a list of actions
//! against an [`Escrow`] backed by in-memory collaborators. Accounts are
//! named: a 64-character hex string is taken literally, any other name is
//! hashed into an id. Locks are referred to by creation order.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use ballast_core::config::LedgerConfig;
use ballast_core::constants::UNIT;
use ballast_core::types::{AccountId, Amounts, LockId, Role, SystemState};
use ballast_ledger::{Escrow, MemoryCollaborators, NewLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub genesis: u64,
    #[serde(default)]
    pub setup: Setup,
    pub actions: Vec<Action>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Setup {
    pub fund: Vec<Funding>,
    pub delegates: Vec<String>,
    pub operators: Vec<String>,
    pub syncers: Vec<String>,
    pub emergency: Vec<String>,
}

/// Whole tokens of each principal component.
#[derive(Debug, Deserialize)]
pub struct Funding {
    pub account: String,
    #[serde(default)]
    pub a: u128,
    #[serde(default)]
    pub b: u128,
}

#[derive(Debug, Deserialize)]
pub struct BatchEntry {
    pub owner: String,
    #[serde(default)]
    pub a: u128,
    #[serde(default)]
    pub b: u128,
    pub expiry_epoch: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateLock {
        owner: String,
        #[serde(default)]
        a: u128,
        #[serde(default)]
        b: u128,
        expiry_epoch: u64,
        at: u64,
    },
    CreateFor { operator: String, locks: Vec<BatchEntry>, at: u64 },
    IncreaseAmount {
        lock: usize,
        #[serde(default)]
        a: u128,
        #[serde(default)]
        b: u128,
        at: u64,
    },
    IncreaseDuration { lock: usize, expiry_epoch: u64, at: u64 },
    Delegate { lock: usize, to: String, at: u64 },
    Switch { lock: usize, to: String, at: u64 },
    Undelegate { lock: usize, at: u64 },
    Unlock { lock: usize, at: u64 },
    ForcedUnlock { caller: String, locks: Vec<usize>, at: u64 },
    SyncGlobal { at: u64 },
    SyncAccounts {
        caller: String,
        #[serde(default)]
        owners: Vec<String>,
        #[serde(default)]
        delegates: Vec<String>,
        at: u64,
    },
    SetState { state: SystemState },
}

/// Resolve a script account name.
pub fn account(name: &str) -> AccountId {
    if name.len() == 64 {
        if let Ok(id) = AccountId::from_hex(name) {
            return id;
        }
    }
    AccountId(*blake3::hash(name.as_bytes()).as_bytes())
}

fn tokens(a: u128, b: u128) -> Result<Amounts> {
    let scale = |n: u128| n.checked_mul(UNIT).ok_or_else(|| anyhow!("{n} tokens overflow base units"));
    Ok(Amounts::new(scale(a)?, scale(b)?))
}

/// Power of one named account at the report time.
#[derive(Debug, Serialize)]
pub struct AccountReport {
    pub name: String,
    pub id: String,
    pub owner: u128,
    pub delegate: u128,
    pub delegated_away: u128,
    pub total: u128,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub at: u64,
    pub epoch: u64,
    pub applied: usize,
    pub rejected: usize,
    pub locks: usize,
    pub total_supply: u128,
    pub accounts: Vec<AccountReport>,
}

pub struct Runner {
    pub escrow: Escrow,
    pub mem: MemoryCollaborators,
    locks: Vec<LockId>,
    names: BTreeMap<String, AccountId>,
    last_at: u64,
}

impl Runner {
    /// Build a fresh escrow and apply the script's setup block.
    pub fn new(config: LedgerConfig, script: &Script) -> Result<Self> {
        let mem = MemoryCollaborators::new();
        let escrow = Escrow::new(config, script.genesis, mem.collaborators()).context("invalid ledger config")?;
        let mut runner = Self { escrow, mem, locks: Vec::new(), names: BTreeMap::new(), last_at: script.genesis };

        for funding in &script.setup.fund {
            let id = runner.name(&funding.account);
            runner.mem.custody.fund(id, tokens(funding.a, funding.b)?);
        }
        for name in &script.setup.delegates {
            let id = runner.name(name);
            runner.mem.authority.register_delegate(id);
        }
        let grants = [
            (&script.setup.operators, Role::Operator),
            (&script.setup.syncers, Role::Syncer),
            (&script.setup.emergency, Role::Emergency),
        ];
        for (names, role) in grants {
            for name in names {
                let id = runner.name(name);
                runner.mem.authority.grant(id, role);
            }
        }
        Ok(runner)
    }

    fn name(&mut self, name: &str) -> AccountId {
        *self.names.entry(name.to_string()).or_insert_with(|| account(name))
    }

    fn lock(&self, index: usize) -> Result<LockId> {
        self.locks
            .get(index)
            .copied()
            .ok_or_else(|| anyhow!("lock #{index} does not exist ({} created)", self.locks.len()))
    }

    fn owner_of(&self, index: usize) -> Result<(LockId, AccountId)> {
        let id = self.lock(index)?;
        let owner = self.escrow.locks().require(&id)?.owner;
        Ok((id, owner))
    }

    fn expiry(&self, epoch: u64) -> u64 {
        self.escrow.clock().epoch_start(epoch)
    }

    /// Apply every action. Rejections are logged and skipped unless
    /// `strict`, in which case the first one aborts the run.
    pub fn run(&mut self, actions: &[Action], strict: bool) -> Result<(usize, usize)> {
        let (mut applied, mut rejected) = (0, 0);
        for (step, action) in actions.iter().enumerate() {
            match self.apply(action) {
                Ok(outcome) => {
                    applied += 1;
                    info!(step, "{outcome}");
                }
                Err(err) if !strict => {
                    rejected += 1;
                    warn!(step, error = %err, "script: action rejected");
                }
                Err(err) => return Err(err.context(format!("step {step}"))),
            }
        }
        Ok((applied, rejected))
    }

    fn apply(&mut self, action: &Action) -> Result<String> {
        let outcome = match action {
            Action::CreateLock { owner, a, b, expiry_epoch, at } => {
                let owner = self.name(owner);
                let expiry = self.expiry(*expiry_epoch);
                let id = self.escrow.create_lock(&owner, tokens(*a, *b)?, expiry, *at)?;
                self.locks.push(id);
                self.last_at = *at;
                format!("created lock #{} ({})", self.locks.len() - 1, id.short())
            }
            Action::CreateFor { operator, locks, at } => {
                let operator = self.name(operator);
                let mut batch = Vec::with_capacity(locks.len());
                for entry in locks {
                    batch.push(NewLock {
                        owner: self.name(&entry.owner),
                        amounts: tokens(entry.a, entry.b)?,
                        expiry: self.expiry(entry.expiry_epoch),
                    });
                }
                let ids = self.escrow.create_locks_for(&operator, &batch, *at)?;
                let first = self.locks.len();
                self.locks.extend(&ids);
                self.last_at = *at;
                format!("created locks #{first}..#{} on behalf", self.locks.len())
            }
            Action::IncreaseAmount { lock, a, b, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let delta = self.escrow.increase_amount(&owner, &id, tokens(*a, *b)?, *at)?;
                self.last_at = *at;
                format!("lock #{lock} slope +{}", delta.slope)
            }
            Action::IncreaseDuration { lock, expiry_epoch, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let expiry = self.expiry(*expiry_epoch);
                let delta = self.escrow.increase_duration(&owner, &id, expiry, *at)?;
                self.last_at = *at;
                format!("lock #{lock} extended to epoch {expiry_epoch}, bias +{}", delta.bias)
            }
            Action::Delegate { lock, to, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let to = self.name(to);
                let activates = self.escrow.delegate(&owner, &id, &to, *at)?;
                self.last_at = *at;
                format!("lock #{lock} delegated, active from {activates}")
            }
            Action::Switch { lock, to, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let to = self.name(to);
                let activates = self.escrow.switch_delegate(&owner, &id, &to, *at)?;
                self.last_at = *at;
                format!("lock #{lock} switched, active from {activates}")
            }
            Action::Undelegate { lock, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let activates = self.escrow.undelegate(&owner, &id, *at)?;
                self.last_at = *at;
                format!("lock #{lock} undelegated, back with owner from {activates}")
            }
            Action::Unlock { lock, at } => {
                let (id, owner) = self.owner_of(*lock)?;
                let released = self.escrow.unlock(&owner, &id, *at)?;
                self.last_at = *at;
                format!("lock #{lock} released {}/{}", released.principal_a, released.principal_b)
            }
            Action::ForcedUnlock { caller, locks, at } => {
                let caller = self.name(caller);
                let ids = locks.iter().map(|i| self.lock(*i)).collect::<Result<Vec<_>>>()?;
                let summary = self.escrow.forced_unlock(&caller, &ids, *at)?;
                self.last_at = *at;
                format!("forced unlock: {} released, {} skipped", summary.unlocked, summary.skipped)
            }
            Action::SyncGlobal { at } => {
                let report = self.escrow.sync_global(*at)?;
                self.last_at = *at;
                format!("global synced across {} boundaries", report.boundaries)
            }
            Action::SyncAccounts { caller, owners, delegates, at } => {
                let caller = self.name(caller);
                let mut accounts = Vec::with_capacity(owners.len() + delegates.len());
                for name in owners {
                    accounts.push((self.name(name), false));
                }
                for name in delegates {
                    accounts.push((self.name(name), true));
                }
                let visited = self.escrow.sync_accounts(&caller, &accounts, *at)?;
                self.last_at = *at;
                format!("synced {visited} of {} accounts", accounts.len())
            }
            Action::SetState { state } => {
                self.mem.gate.set(*state);
                format!("system state set to {state}")
            }
        };
        Ok(outcome)
    }

    /// Powers of every named account at the last action's time.
    pub fn summary(&self, applied: usize, rejected: usize) -> Summary {
        let at = self.last_at;
        let escrow = &self.escrow;
        let accounts = self
            .names
            .iter()
            .map(|(name, id)| AccountReport {
                name: name.clone(),
                id: id.to_string(),
                owner: escrow.owner_power(id, at),
                delegate: escrow.delegate_power(id, at),
                delegated_away: escrow.delegated_away(id, at),
                total: escrow.account_power(id, at, false),
            })
            .collect();
        Summary {
            at,
            epoch: escrow.clock().epoch_number(at),
            applied,
            rejected,
            locks: escrow.locks().len(),
            total_supply: escrow.total_supply(at),
            accounts,
        }
    }
}

/// Parse a script file.
pub fn load(path: &std::path::Path) -> Result<Script> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let script: Script =
        serde_json::from_str(&text).with_context(|| format!("failed to parse script {}", path.display()))?;
    if script.actions.is_empty() {
        bail!("script {} has no actions", path.display());
    }
    Ok(script)
}
