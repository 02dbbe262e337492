//! Staking system contract at address 0x2710.
//!
//! Provides native stake accounting:
//! - stake() payable
//! - unstake(uint256)
//! - stakeOf(address) returns uint256
//! - totalStaked() returns uint256
//!
//! Stakes live in ordinary storage slots under the contract account's
//! sequence, so they go through the same overlays and conflict checks as any
//! other state. Staked value is held in the contract account's balance.

use crate::database::KvStore;
use crate::error::ExecutionError;
use crate::state::StateExt;
use crate::system::{SystemContract, SystemOutcome};
use crate::types::{BlockInfo, CommittedResult, PendingTransaction, StatusCode};
use alloy_primitives::{address, keccak256, Address, Bytes, Log, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use parevm_metrics::execution::{STAKING_DEPOSITS, STAKING_TOTAL_STAKE, STAKING_WITHDRAWALS};

/// Staking contract address (0x0000000000000000000000000000000000002710).
pub const STAKING_ADDRESS: Address = address!("0x0000000000000000000000000000000000002710");

/// Storage sequence reserved for the staking contract.
///
/// Minted sequences always carry a non-zero counter in the upper bytes, so
/// values below 256 never collide with a created contract.
pub const STAKING_SEQUENCE: u64 = 1;

/// Gas costs for staking operations.
pub mod gas {
    /// Base cost of any transaction sent to the contract.
    pub const TX_BASE: u64 = 21_000;

    /// Gas cost for stake.
    pub const STAKE: u64 = 20_000;

    /// Gas cost for unstake.
    pub const UNSTAKE: u64 = 15_000;

    /// Gas cost for stakeOf.
    pub const STAKE_OF: u64 = 2_100;

    /// Gas cost for totalStaked.
    pub const TOTAL_STAKED: u64 = 2_100;
}

sol! {
    /// Staking contract interface.
    interface IStaking {
        /// Lock msg.value as stake of the sender.
        function stake() external payable;

        /// Return `amount` of the sender's stake.
        function unstake(uint256 amount) external;

        /// Stake held by `account`.
        function stakeOf(address account) external view returns (uint256);

        /// Sum of all stakes.
        function totalStaked() external view returns (uint256);

        /// Emitted when stake is deposited.
        event Staked(address indexed account, uint256 amount);

        /// Emitted when stake is withdrawn.
        event Unstaked(address indexed account, uint256 amount);
    }
}

const STAKE: [u8; 4] = IStaking::stakeCall::SELECTOR;
const UNSTAKE: [u8; 4] = IStaking::unstakeCall::SELECTOR;
const STAKE_OF: [u8; 4] = IStaking::stakeOfCall::SELECTOR;
const TOTAL_STAKED: [u8; 4] = IStaking::totalStakedCall::SELECTOR;

/// The staking system contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakingContract;

impl StakingContract {
    /// Create the contract.
    pub fn new() -> Self {
        Self
    }

    /// Stake held by `account`.
    pub fn stake_of(&self, store: &dyn KvStore, account: &Address) -> U256 {
        read_u256(store, &stake_slot(account))
    }

    /// Sum of all stakes.
    pub fn total_staked(&self, store: &dyn KvStore) -> U256 {
        read_u256(store, &B256::ZERO)
    }

    fn stake(&self, store: &dyn KvStore, tx: &PendingTransaction, cost: u64) -> SystemOutcome {
        if tx.value.is_zero() {
            return SystemOutcome::failed(StatusCode::Revert, cost);
        }
        let Some(mut sender) = store.account(&tx.from) else {
            return SystemOutcome::failed(StatusCode::AccountNotExist, cost);
        };
        if sender.balance < tx.value {
            return SystemOutcome::failed(StatusCode::InsufficientBalance, cost);
        }
        let mut contract = store.account(&STAKING_ADDRESS).unwrap_or_default();

        sender.balance -= tx.value;
        contract.balance += tx.value;
        store.set_account(&tx.from, &sender);
        store.set_account(&STAKING_ADDRESS, &contract);

        let stake = self.stake_of(store, &tx.from) + tx.value;
        let total = self.total_staked(store) + tx.value;
        write_u256(store, &stake_slot(&tx.from), stake);
        write_u256(store, &B256::ZERO, total);

        let event = IStaking::Staked {
            account: tx.from,
            amount: tx.value,
        };
        SystemOutcome {
            status: StatusCode::Success,
            logs: vec![Log {
                address: STAKING_ADDRESS,
                data: event.encode_log_data(),
            }],
            gas_used: cost,
            output: Bytes::new(),
        }
    }

    fn unstake(&self, store: &dyn KvStore, tx: &PendingTransaction, cost: u64) -> SystemOutcome {
        if !tx.value.is_zero() {
            return SystemOutcome::failed(StatusCode::Revert, cost);
        }
        let Some(amount) = decode_uint256(&tx.data[4..]) else {
            return SystemOutcome::failed(StatusCode::Revert, cost);
        };
        let stake = self.stake_of(store, &tx.from);
        if amount > stake {
            tracing::debug!(account = %tx.from, %amount, %stake, "Unstake exceeds stake");
            return SystemOutcome::failed(StatusCode::Revert, cost);
        }
        let Some(mut sender) = store.account(&tx.from) else {
            return SystemOutcome::failed(StatusCode::AccountNotExist, cost);
        };
        let mut contract = store.account(&STAKING_ADDRESS).unwrap_or_default();
        assert!(
            contract.balance >= amount,
            "staking contract balance below recorded stake"
        );

        contract.balance -= amount;
        sender.balance += amount;
        store.set_account(&STAKING_ADDRESS, &contract);
        store.set_account(&tx.from, &sender);

        let total = self.total_staked(store) - amount;
        write_u256(store, &stake_slot(&tx.from), stake - amount);
        write_u256(store, &B256::ZERO, total);

        let event = IStaking::Unstaked {
            account: tx.from,
            amount,
        };
        SystemOutcome {
            status: StatusCode::Success,
            logs: vec![Log {
                address: STAKING_ADDRESS,
                data: event.encode_log_data(),
            }],
            gas_used: cost,
            output: Bytes::new(),
        }
    }

    fn view(&self, store: &dyn KvStore, input: &[u8]) -> Result<Bytes, ExecutionError> {
        let selector = selector_of(input)
            .ok_or_else(|| ExecutionError::precompile("input too short"))?;
        match selector {
            STAKE_OF => {
                let account = decode_address(&input[4..])
                    .ok_or_else(|| ExecutionError::precompile("invalid stakeOf argument"))?;
                Ok(encode_uint256(self.stake_of(store, &account)))
            }
            TOTAL_STAKED => Ok(encode_uint256(self.total_staked(store))),
            _ => Err(ExecutionError::precompile(
                "not a view function of the staking contract",
            )),
        }
    }
}

impl SystemContract for StakingContract {
    fn owns_address(&self, address: &Address) -> bool {
        *address == STAKING_ADDRESS
    }

    fn init(&self, store: &dyn KvStore) {
        let mut account = store.account(&STAKING_ADDRESS).unwrap_or_default();
        if account.sequence == STAKING_SEQUENCE {
            return;
        }
        account.sequence = STAKING_SEQUENCE;
        store.set_account(&STAKING_ADDRESS, &account);
    }

    fn execute(
        &self,
        store: &dyn KvStore,
        _block: &BlockInfo,
        tx: &PendingTransaction,
    ) -> SystemOutcome {
        let Some(selector) = selector_of(&tx.data) else {
            return SystemOutcome::failed(StatusCode::Revert, gas::TX_BASE.min(tx.gas_limit));
        };
        let cost = gas::TX_BASE + selector_gas(selector);
        if tx.gas_limit < cost {
            return SystemOutcome::failed(StatusCode::OutOfGas, tx.gas_limit);
        }

        match selector {
            STAKE => self.stake(store, tx, cost),
            UNSTAKE => self.unstake(store, tx, cost),
            STAKE_OF | TOTAL_STAKED if tx.value.is_zero() => match self.view(store, &tx.data) {
                Ok(output) => SystemOutcome::success(cost, output),
                Err(_) => SystemOutcome::failed(StatusCode::Revert, cost),
            },
            _ => SystemOutcome::failed(StatusCode::Revert, cost),
        }
    }

    fn required_gas(&self, input: &[u8]) -> u64 {
        selector_of(input).map_or(gas::STAKE_OF, selector_gas)
    }

    fn run(&self, store: &dyn KvStore, input: &[u8]) -> Result<Bytes, ExecutionError> {
        self.view(store, input)
    }

    fn committed(&self, store: &dyn KvStore, result: &CommittedResult) {
        if !result.status.is_success() {
            return;
        }
        let tx = &result.tx;
        let total = self.total_staked(store);
        match selector_of(&tx.data) {
            Some(STAKE) => {
                STAKING_DEPOSITS.inc();
                tracing::info!(account = %tx.from, amount = %tx.value, %total, "Stake deposited");
            }
            Some(UNSTAKE) => {
                let amount = decode_uint256(&tx.data[4..]).unwrap_or_default();
                STAKING_WITHDRAWALS.inc();
                tracing::info!(account = %tx.from, %amount, %total, "Stake withdrawn");
            }
            _ => return,
        }
        STAKING_TOTAL_STAKE.set(total.saturating_to::<u128>() as f64);
    }
}

fn selector_gas(selector: [u8; 4]) -> u64 {
    match selector {
        STAKE => gas::STAKE,
        UNSTAKE => gas::UNSTAKE,
        TOTAL_STAKED => gas::TOTAL_STAKED,
        _ => gas::STAKE_OF,
    }
}

fn selector_of(input: &[u8]) -> Option<[u8; 4]> {
    input.get(..4)?.try_into().ok()
}

/// Slot of `account`'s stake: keccak256 of the left-padded address.
fn stake_slot(account: &Address) -> B256 {
    keccak256(account.into_word())
}

fn read_u256(store: &dyn KvStore, slot: &B256) -> U256 {
    store
        .storage(STAKING_SEQUENCE, slot)
        .map(|bytes| U256::from_be_slice(&bytes))
        .unwrap_or(U256::ZERO)
}

fn write_u256(store: &dyn KvStore, slot: &B256, value: U256) {
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.to_be_bytes::<32>().to_vec()
    };
    store.set_storage(STAKING_SEQUENCE, slot, bytes);
}

fn decode_address(data: &[u8]) -> Option<Address> {
    let word = data.get(..32)?;
    if word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_slice(&word[12..]))
}

fn decode_uint256(data: &[u8]) -> Option<U256> {
    data.get(..32).map(U256::from_be_slice)
}

fn encode_uint256(value: U256) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes::<32>())
}
