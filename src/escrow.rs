use std::collections::BTreeMap;

use solana_program::pubkey::Pubkey;

use crate::error::BountyError;

/// How a reward is divided on payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub researcher_payment: u64,
    pub platform_fee: u64,
}

impl FeeSplit {
    /// `platform_fee = floor(reward * fee_percentage / 100)`; the truncated
    /// remainder stays with the researcher.
    pub fn compute(reward: u64, fee_percentage: u8) -> Result<Self, BountyError> {
        let platform_fee = (reward as u128)
            .checked_mul(fee_percentage as u128)
            .ok_or(BountyError::Overflow)?
            / 100;
        let platform_fee = u64::try_from(platform_fee).map_err(|_| BountyError::Overflow)?;
        let researcher_payment = reward
            .checked_sub(platform_fee)
            .ok_or(BountyError::Overflow)?;
        Ok(Self {
            researcher_payment,
            platform_fee,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub to: Pubkey,
    pub amount: u64,
}

/// Custody of escrowed rewards. Implementations move funds between the
/// ledger's vault and external accounts.
pub trait Vault {
    /// Pulls `amount` from `from` into custody.
    fn deposit(&mut self, from: &Pubkey, amount: u64) -> Result<(), BountyError>;

    /// Pays out of custody. Either every transfer happens or none does.
    fn release(&mut self, transfers: &[Transfer]) -> Result<(), BountyError>;

    /// Lamports currently in custody.
    fn custody(&self) -> u64;
}

pub(crate) fn total_of(transfers: &[Transfer]) -> Result<u64, BountyError> {
    transfers.iter().try_fold(0u64, |acc, t| {
        acc.checked_add(t.amount).ok_or(BountyError::Overflow)
    })
}

/// In-process vault holding wallet balances in a map. Used off-chain and in
/// tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryVault {
    custody: u64,
    wallets: BTreeMap<Pubkey, u64>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&mut self, wallet: Pubkey, amount: u64) {
        *self.wallets.entry(wallet).or_default() += amount;
    }

    pub fn balance_of(&self, wallet: &Pubkey) -> u64 {
        self.wallets.get(wallet).copied().unwrap_or_default()
    }
}

impl Vault for MemoryVault {
    fn deposit(&mut self, from: &Pubkey, amount: u64) -> Result<(), BountyError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(BountyError::TransferFailed);
        }
        let custody = self
            .custody
            .checked_add(amount)
            .ok_or(BountyError::Overflow)?;
        self.wallets.insert(*from, balance - amount);
        self.custody = custody;
        Ok(())
    }

    fn release(&mut self, transfers: &[Transfer]) -> Result<(), BountyError> {
        let total = total_of(transfers)?;
        if self.custody < total {
            return Err(BountyError::InsufficientEscrow);
        }
        self.custody -= total;
        for transfer in transfers {
            *self.wallets.entry(transfer.to).or_default() += transfer.amount;
        }
        Ok(())
    }

    fn custody(&self) -> u64 {
        self.custody
    }
}
