use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};

use crate::constants::{BOUNTY_SEED, CONFIG_SEED, SUBMISSION_SEED, VAULT_SEED};

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq)]
pub enum BountyInstruction {
    /// Create the config account and the vault and name the first administrator
    ///
    /// Accounts:
    /// 0. `[signer, writable]` Administrator - pays for both accounts
    /// 1. `[writable]` Config account (PDA)
    /// 2. `[writable]` Vault account (PDA) - holds escrowed lamports
    /// 3. `[]` System program
    Initialize {
        /// Platform fee in whole percent, at most 10
        fee_percentage: u8,
    },

    /// Post a bounty and lock its reward in the vault
    ///
    /// Accounts:
    /// 0. `[signer, writable]` Issuer - funds the reward and the bounty account
    /// 1. `[writable]` Config account (PDA)
    /// 2. `[writable]` Bounty account (PDA of the next bounty id)
    /// 3. `[writable]` Vault account (PDA)
    /// 4. `[]` System program
    CreateBounty {
        title: String,
        description: String,
        /// Unix timestamp in seconds, must be in the future
        deadline: UnixTimestamp,
        category: String,
        /// Reward in lamports
        reward: u64,
    },

    /// Claim an open bounty and record the report in one step
    ///
    /// Accounts:
    /// 0. `[signer, writable]` Researcher - funds the submission account
    /// 1. `[writable]` Config account (PDA)
    /// 2. `[writable]` Bounty account (PDA)
    /// 3. `[writable]` Submission account (PDA of the next submission id)
    /// 4. `[]` System program
    ClaimAndSubmit {
        bounty_id: u64,
        /// Content hash of the off-chain report
        report_reference: String,
    },

    /// Approve a submission and pay out the reward less the platform fee
    ///
    /// Accounts:
    /// 0. `[signer]` Issuer
    /// 1. `[]` Config account (PDA)
    /// 2. `[writable]` Bounty account (PDA)
    /// 3. `[writable]` Submission account (PDA)
    /// 4. `[writable]` Vault account (PDA)
    /// 5. `[writable]` Researcher - receives the payment
    /// 6. `[writable]` Administrator - receives the platform fee
    ApproveAndPay {
        bounty_id: u64,
        submission_id: u64,
    },

    /// Change the platform fee
    ///
    /// Accounts:
    /// 0. `[signer]` Administrator
    /// 1. `[writable]` Config account (PDA)
    UpdateFee { fee_percentage: u8 },

    /// Hand the administrator role to another key
    ///
    /// Accounts:
    /// 0. `[signer]` Administrator
    /// 1. `[writable]` Config account (PDA)
    TransferAdministrator { new_administrator: Pubkey },
}

impl BountyInstruction {
    pub fn unpack(input: &[u8]) -> Option<Self> {
        Self::try_from_slice(input).ok()
    }
}

pub fn config_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[CONFIG_SEED], program_id)
}

pub fn vault_address(program_id: &Pubkey, config: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[VAULT_SEED, config.as_ref()], program_id)
}

pub fn bounty_address(program_id: &Pubkey, bounty_id: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[BOUNTY_SEED, &bounty_id.to_le_bytes()], program_id)
}

pub fn submission_address(program_id: &Pubkey, submission_id: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[SUBMISSION_SEED, &submission_id.to_le_bytes()], program_id)
}

fn build(
    program_id: &Pubkey,
    data: &BountyInstruction,
    accounts: Vec<AccountMeta>,
) -> Result<Instruction, ProgramError> {
    let data = borsh::to_vec(data).map_err(|e| ProgramError::BorshIoError(e.to_string()))?;
    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn initialize(
    program_id: &Pubkey,
    administrator: &Pubkey,
    fee_percentage: u8,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    let (vault, _) = vault_address(program_id, &config);
    build(
        program_id,
        &BountyInstruction::Initialize { fee_percentage },
        vec![
            AccountMeta::new(*administrator, true),
            AccountMeta::new(config, false),
            AccountMeta::new(vault, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

/// `bounty_id` is the id the new bounty will receive: the ledger's current
/// bounty count plus one.
#[allow(clippy::too_many_arguments)]
pub fn create_bounty(
    program_id: &Pubkey,
    issuer: &Pubkey,
    bounty_id: u64,
    title: String,
    description: String,
    deadline: UnixTimestamp,
    category: String,
    reward: u64,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    let (bounty, _) = bounty_address(program_id, bounty_id);
    let (vault, _) = vault_address(program_id, &config);
    build(
        program_id,
        &BountyInstruction::CreateBounty {
            title,
            description,
            deadline,
            category,
            reward,
        },
        vec![
            AccountMeta::new(*issuer, true),
            AccountMeta::new(config, false),
            AccountMeta::new(bounty, false),
            AccountMeta::new(vault, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

/// `submission_id` is the id the new submission will receive: the ledger's
/// current submission count plus one.
pub fn claim_and_submit(
    program_id: &Pubkey,
    researcher: &Pubkey,
    bounty_id: u64,
    submission_id: u64,
    report_reference: String,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    let (bounty, _) = bounty_address(program_id, bounty_id);
    let (submission, _) = submission_address(program_id, submission_id);
    build(
        program_id,
        &BountyInstruction::ClaimAndSubmit {
            bounty_id,
            report_reference,
        },
        vec![
            AccountMeta::new(*researcher, true),
            AccountMeta::new(config, false),
            AccountMeta::new(bounty, false),
            AccountMeta::new(submission, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn approve_and_pay(
    program_id: &Pubkey,
    issuer: &Pubkey,
    researcher: &Pubkey,
    administrator: &Pubkey,
    bounty_id: u64,
    submission_id: u64,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    let (bounty, _) = bounty_address(program_id, bounty_id);
    let (submission, _) = submission_address(program_id, submission_id);
    let (vault, _) = vault_address(program_id, &config);
    build(
        program_id,
        &BountyInstruction::ApproveAndPay {
            bounty_id,
            submission_id,
        },
        vec![
            AccountMeta::new_readonly(*issuer, true),
            AccountMeta::new_readonly(config, false),
            AccountMeta::new(bounty, false),
            AccountMeta::new(submission, false),
            AccountMeta::new(vault, false),
            AccountMeta::new(*researcher, false),
            AccountMeta::new(*administrator, false),
        ],
    )
}

pub fn update_fee(
    program_id: &Pubkey,
    administrator: &Pubkey,
    fee_percentage: u8,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    build(
        program_id,
        &BountyInstruction::UpdateFee { fee_percentage },
        vec![
            AccountMeta::new_readonly(*administrator, true),
            AccountMeta::new(config, false),
        ],
    )
}

pub fn transfer_administrator(
    program_id: &Pubkey,
    administrator: &Pubkey,
    new_administrator: &Pubkey,
) -> Result<Instruction, ProgramError> {
    let (config, _) = config_address(program_id);
    build(
        program_id,
        &BountyInstruction::TransferAdministrator {
            new_administrator: *new_administrator,
        },
        vec![
            AccountMeta::new_readonly(*administrator, true),
            AccountMeta::new(config, false),
        ],
    )
}
