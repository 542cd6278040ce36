use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{clock::UnixTimestamp, log::sol_log_data, msg, pubkey::Pubkey};

/// Notifications for off-chain indexers. Each one is written to the
/// transaction log as borsh-encoded data.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    BountyCreated {
        bounty_id: u64,
        issuer: Pubkey,
        title: String,
        reward: u64,
        deadline: UnixTimestamp,
    },
    BountyClaimed {
        bounty_id: u64,
        researcher: Pubkey,
    },
    SubmissionMade {
        submission_id: u64,
        bounty_id: u64,
        researcher: Pubkey,
        report_reference: String,
    },
    BountyCompleted {
        bounty_id: u64,
        researcher: Pubkey,
        researcher_payment: u64,
    },
    FeeUpdated {
        old_fee_percentage: u8,
        new_fee_percentage: u8,
    },
    AdministratorTransferred {
        previous: Pubkey,
        new: Pubkey,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::BountyCreated { .. } => "BountyCreated",
            LedgerEvent::BountyClaimed { .. } => "BountyClaimed",
            LedgerEvent::SubmissionMade { .. } => "SubmissionMade",
            LedgerEvent::BountyCompleted { .. } => "BountyCompleted",
            LedgerEvent::FeeUpdated { .. } => "FeeUpdated",
            LedgerEvent::AdministratorTransferred { .. } => "AdministratorTransferred",
        }
    }
}

/// Writes a committed event to the transaction log.
pub fn emit(event: &LedgerEvent) {
    msg!("Event: {}", event.name());
    match borsh::to_vec(event) {
        Ok(data) => sol_log_data(&[data.as_slice()]),
        Err(e) => msg!("Failed to encode event: {:?}", e),
    }
}
