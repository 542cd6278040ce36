//! Authorization predicates. Each returns a typed error instead of aborting,
//! and each is evaluated before any guard that reads mutable state.

use solana_program::pubkey::Pubkey;

use crate::{
    error::BountyError,
    state::{AdminConfig, Bounty},
};

pub fn require_issuer(bounty: &Bounty, caller: &Pubkey) -> Result<(), BountyError> {
    if bounty.issuer != *caller {
        return Err(BountyError::NotIssuer);
    }
    Ok(())
}

pub fn require_administrator(config: &AdminConfig, caller: &Pubkey) -> Result<(), BountyError> {
    if config.administrator != *caller {
        return Err(BountyError::NotAdministrator);
    }
    Ok(())
}

/// The researcher named on a submission must be the one assigned to the bounty.
pub fn require_assigned_researcher(bounty: &Bounty, researcher: &Pubkey) -> Result<(), BountyError> {
    match bounty.researcher {
        Some(assigned) if assigned == *researcher => Ok(()),
        _ => Err(BountyError::ResearcherMismatch),
    }
}
