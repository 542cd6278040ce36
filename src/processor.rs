use solana_program::{
    account_info::{next_account_info, AccountInfo},
    clock::UnixTimestamp,
    entrypoint::ProgramResult,
    instruction::Instruction,
    msg,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    pubkey::Pubkey,
    rent::Rent,
    system_instruction,
    system_program,
    sysvar::clock::Clock,
    sysvar::Sysvar,
};

use crate::{
    constants::{BOUNTY_SEED, CONFIG_SEED, SUBMISSION_SEED, VAULT_SEED},
    error::BountyError,
    escrow::{total_of, Transfer, Vault},
    events::{self, LedgerEvent},
    instruction::{
        bounty_address, config_address, submission_address, vault_address, BountyInstruction,
    },
    ledger::{Invocation, Ledger, LedgerConfig, NewBounty},
    state::{Bounty, LedgerHeader, LedgerState, Record, Submission},
};

/// Custody backed by the program-owned vault PDA. Deposits go through the
/// system program; payouts debit the vault's lamports directly.
pub struct ProgramVault<'a, 'info> {
    vault: &'a AccountInfo<'info>,
    funding: Option<(&'a AccountInfo<'info>, &'a AccountInfo<'info>)>,
    payees: Vec<&'a AccountInfo<'info>>,
}

impl<'a, 'info> ProgramVault<'a, 'info> {
    pub fn for_deposit(
        vault: &'a AccountInfo<'info>,
        depositor: &'a AccountInfo<'info>,
        system_program: &'a AccountInfo<'info>,
    ) -> Self {
        Self {
            vault,
            funding: Some((depositor, system_program)),
            payees: Vec::new(),
        }
    }

    pub fn for_payout(vault: &'a AccountInfo<'info>, payees: Vec<&'a AccountInfo<'info>>) -> Self {
        Self {
            vault,
            funding: None,
            payees,
        }
    }

    fn payee(&self, key: &Pubkey) -> Option<&'a AccountInfo<'info>> {
        self.payees
            .iter()
            .copied()
            .find(|info| info.key == key && info.is_writable)
    }
}

impl<'a, 'info> Vault for ProgramVault<'a, 'info> {
    fn deposit(&mut self, from: &Pubkey, amount: u64) -> Result<(), BountyError> {
        let (depositor, system_program_info) = self.funding.ok_or(BountyError::TransferFailed)?;
        if depositor.key != from {
            return Err(BountyError::TransferFailed);
        }
        invoke(
            &system_instruction::transfer(depositor.key, self.vault.key, amount),
            &[
                depositor.clone(),
                self.vault.clone(),
                system_program_info.clone(),
            ],
        )
        .map_err(|e| {
            msg!("Deposit of {} lamports failed: {}", amount, e);
            BountyError::TransferFailed
        })
    }

    fn release(&mut self, transfers: &[Transfer]) -> Result<(), BountyError> {
        let total = total_of(transfers)?;
        let payees = transfers
            .iter()
            .map(|t| self.payee(&t.to).ok_or(BountyError::PayeeAccountMissing))
            .collect::<Result<Vec<_>, _>>()?;

        if self.vault.lamports() < total {
            return Err(BountyError::InsufficientEscrow);
        }
        {
            let mut vault_lamports = self
                .vault
                .try_borrow_mut_lamports()
                .map_err(|_| BountyError::TransferFailed)?;
            **vault_lamports = (**vault_lamports)
                .checked_sub(total)
                .ok_or(BountyError::InsufficientEscrow)?;
        }
        for (transfer, payee) in transfers.iter().zip(payees) {
            let mut lamports = payee
                .try_borrow_mut_lamports()
                .map_err(|_| BountyError::TransferFailed)?;
            **lamports = (**lamports)
                .checked_add(transfer.amount)
                .ok_or(BountyError::Overflow)?;
        }
        Ok(())
    }

    fn custody(&self) -> u64 {
        self.vault.lamports()
    }
}

/// Stand-in for operations that never move funds.
pub struct NoCustody;

impl Vault for NoCustody {
    fn deposit(&mut self, _from: &Pubkey, _amount: u64) -> Result<(), BountyError> {
        Err(BountyError::TransferFailed)
    }

    fn release(&mut self, _transfers: &[Transfer]) -> Result<(), BountyError> {
        Err(BountyError::TransferFailed)
    }

    fn custody(&self) -> u64 {
        0
    }
}

/// System instructions that leave `target` owned by `owner` with `space`
/// bytes and a rent-exempt balance. `create_account` refuses an address that
/// already holds lamports, so a pre-funded address is topped up, allocated
/// and assigned instead.
pub fn account_creation_instructions(
    payer: &Pubkey,
    target: &Pubkey,
    current_lamports: u64,
    rent: &Rent,
    space: usize,
    owner: &Pubkey,
) -> Vec<Instruction> {
    let required = rent.minimum_balance(space);
    if current_lamports == 0 {
        return vec![system_instruction::create_account(
            payer,
            target,
            required,
            space as u64,
            owner,
        )];
    }

    let mut instructions = Vec::with_capacity(3);
    let shortfall = required.saturating_sub(current_lamports);
    if shortfall > 0 {
        instructions.push(system_instruction::transfer(payer, target, shortfall));
    }
    instructions.push(system_instruction::allocate(target, space as u64));
    instructions.push(system_instruction::assign(target, owner));
    instructions
}

pub struct Processor {}

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let now = Clock::get()?.unix_timestamp;
        Self::process_at(program_id, accounts, instruction_data, now)
    }

    /// Same as [`Processor::process`] with the clock supplied by the caller.
    pub fn process_at(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
        now: UnixTimestamp,
    ) -> ProgramResult {
        let committed = Self::execute(program_id, accounts, instruction_data, now)?;
        for event in &committed {
            events::emit(event);
        }
        Ok(())
    }

    /// Runs one instruction and writes its records. Returns the notifications
    /// to publish, which exist only once every write has gone through.
    pub fn execute(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let instruction = BountyInstruction::unpack(instruction_data)
            .ok_or(ProgramError::InvalidInstructionData)?;

        match instruction {
            BountyInstruction::Initialize { fee_percentage } => {
                msg!("Instruction: Initialize");
                Self::process_initialize(program_id, accounts, fee_percentage)
            }
            BountyInstruction::CreateBounty { title, description, deadline, category, reward } => {
                msg!("Instruction: CreateBounty");
                let bounty = NewBounty {
                    title,
                    description,
                    deadline,
                    category,
                    reward,
                };
                Self::process_create_bounty(program_id, accounts, bounty, now)
            }
            BountyInstruction::ClaimAndSubmit { bounty_id, report_reference } => {
                msg!("Instruction: ClaimAndSubmit");
                Self::process_claim_and_submit(program_id, accounts, bounty_id, report_reference, now)
            }
            BountyInstruction::ApproveAndPay { bounty_id, submission_id } => {
                msg!("Instruction: ApproveAndPay");
                Self::process_approve_and_pay(program_id, accounts, bounty_id, submission_id, now)
            }
            BountyInstruction::UpdateFee { fee_percentage } => {
                msg!("Instruction: UpdateFee");
                Self::process_update_fee(program_id, accounts, fee_percentage, now)
            }
            BountyInstruction::TransferAdministrator { new_administrator } => {
                msg!("Instruction: TransferAdministrator");
                Self::process_transfer_administrator(program_id, accounts, new_administrator, now)
            }
        }
    }

    fn check_address(label: &str, expected: &Pubkey, provided: &AccountInfo) -> ProgramResult {
        if expected != provided.key {
            msg!("Expected {} address: {}", label, expected);
            msg!("Provided {} address: {}", label, provided.key);
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(())
    }

    fn check_system_program(system_program_info: &AccountInfo) -> ProgramResult {
        if !system_program::check_id(system_program_info.key) {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(())
    }

    fn read_record(program_id: &Pubkey, info: &AccountInfo) -> Result<Record, ProgramError> {
        if info.owner != program_id {
            return Ok(Record::Uninitialized);
        }
        let data = info.try_borrow_data()?;
        Record::unpack(&data).map_err(|e| {
            msg!("Failed to deserialize account {}: {:?}", info.key, e);
            ProgramError::InvalidAccountData
        })
    }

    fn write_record(info: &AccountInfo, record: &Record) -> ProgramResult {
        let mut data = info.try_borrow_mut_data()?;
        record.pack_into(&mut data)?;
        Ok(())
    }

    fn load_header(program_id: &Pubkey, config_info: &AccountInfo) -> Result<LedgerHeader, ProgramError> {
        let (config_key, _) = config_address(program_id);
        Self::check_address("config", &config_key, config_info)?;
        match Self::read_record(program_id, config_info)? {
            Record::Header(header) => Ok(header),
            Record::Uninitialized => Err(BountyError::NotInitialized.into()),
            _ => Err(ProgramError::InvalidAccountData),
        }
    }

    /// A missing bounty is left for the ledger to report.
    fn load_bounty(
        program_id: &Pubkey,
        bounty_info: &AccountInfo,
        bounty_id: u64,
    ) -> Result<Option<Bounty>, ProgramError> {
        let (bounty_key, _) = bounty_address(program_id, bounty_id);
        Self::check_address("bounty", &bounty_key, bounty_info)?;
        match Self::read_record(program_id, bounty_info)? {
            Record::Bounty(bounty) if bounty.id == bounty_id => Ok(Some(bounty)),
            Record::Uninitialized => Ok(None),
            _ => Err(ProgramError::InvalidAccountData),
        }
    }

    fn load_submission(
        program_id: &Pubkey,
        submission_info: &AccountInfo,
        submission_id: u64,
    ) -> Result<Option<Submission>, ProgramError> {
        let (submission_key, _) = submission_address(program_id, submission_id);
        Self::check_address("submission", &submission_key, submission_info)?;
        match Self::read_record(program_id, submission_info)? {
            Record::Submission(submission) if submission.id == submission_id => Ok(Some(submission)),
            Record::Uninitialized => Ok(None),
            _ => Err(ProgramError::InvalidAccountData),
        }
    }

    /// Fails unless `info` can take a fresh record.
    fn check_unused(program_id: &Pubkey, info: &AccountInfo) -> ProgramResult {
        match Self::read_record(program_id, info)? {
            Record::Uninitialized => Ok(()),
            _ => Err(BountyError::AlreadyInitialized.into()),
        }
    }

    fn create_pda<'info>(
        program_id: &Pubkey,
        payer: &AccountInfo<'info>,
        target: &AccountInfo<'info>,
        system_program_info: &AccountInfo<'info>,
        space: usize,
        signer_seeds: &[&[u8]],
    ) -> ProgramResult {
        if target.owner == program_id {
            return Ok(());
        }
        let rent = Rent::get()?;
        msg!("Creating account: {} ({} bytes)", target.key, space);
        for instruction in account_creation_instructions(
            payer.key,
            target.key,
            target.lamports(),
            &rent,
            space,
            program_id,
        ) {
            invoke_signed(
                &instruction,
                &[payer.clone(), target.clone(), system_program_info.clone()],
                &[signer_seeds],
            )?;
        }
        Ok(())
    }

    fn process_initialize(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        fee_percentage: u8,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let administrator_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !administrator_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        Self::check_system_program(system_program_info)?;

        let (config_key, config_bump) = config_address(program_id);
        Self::check_address("config", &config_key, config_info)?;
        let (vault_key, vault_bump) = vault_address(program_id, config_info.key);
        Self::check_address("vault", &vault_key, vault_info)?;
        Self::check_unused(program_id, config_info)?;

        let config = LedgerConfig::new(*administrator_info.key).with_fee_percentage(fee_percentage);
        let mut ledger = Ledger::new(config, NoCustody)?;

        Self::create_pda(
            program_id,
            administrator_info,
            config_info,
            system_program_info,
            Record::HEADER_LEN,
            &[CONFIG_SEED, &[config_bump]],
        )?;
        Self::create_pda(
            program_id,
            administrator_info,
            vault_info,
            system_program_info,
            0,
            &[VAULT_SEED, config_info.key.as_ref(), &[vault_bump]],
        )?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        Self::write_record(config_info, &Record::Header(state.header()))?;
        Ok(committed)
    }

    fn process_create_bounty(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        bounty: NewBounty,
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let issuer_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let bounty_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !issuer_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        Self::check_system_program(system_program_info)?;

        let header = Self::load_header(program_id, config_info)?;
        let (vault_key, _) = vault_address(program_id, config_info.key);
        Self::check_address("vault", &vault_key, vault_info)?;

        // The new bounty lands at the address of the next id
        let bounty_id = header
            .bounty_count
            .checked_add(1)
            .ok_or(BountyError::Overflow)?;
        let (bounty_key, bounty_bump) = bounty_address(program_id, bounty_id);
        Self::check_address("bounty", &bounty_key, bounty_info)?;
        Self::check_unused(program_id, bounty_info)?;

        let vault = ProgramVault::for_deposit(vault_info, issuer_info, system_program_info);
        let mut ledger = Ledger::load(LedgerState::with_header(header), vault)?;
        let invocation = Invocation::new(*issuer_info.key, now);
        let bounty_id = ledger.create_bounty(&invocation, bounty)?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        let record = state
            .bounties
            .get(&bounty_id)
            .cloned()
            .ok_or(BountyError::BountyNotFound)?;

        let id_bytes = bounty_id.to_le_bytes();
        Self::create_pda(
            program_id,
            issuer_info,
            bounty_info,
            system_program_info,
            Record::BOUNTY_LEN,
            &[BOUNTY_SEED, &id_bytes, &[bounty_bump]],
        )?;
        Self::write_record(bounty_info, &Record::Bounty(record))?;
        Self::write_record(config_info, &Record::Header(state.header()))?;
        msg!("Bounty {} recorded", bounty_id);
        Ok(committed)
    }

    fn process_claim_and_submit(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        bounty_id: u64,
        report_reference: String,
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let researcher_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let bounty_info = next_account_info(account_info_iter)?;
        let submission_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !researcher_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }
        Self::check_system_program(system_program_info)?;

        let header = Self::load_header(program_id, config_info)?;
        let bounty = Self::load_bounty(program_id, bounty_info, bounty_id)?;

        let submission_id = header
            .submission_count
            .checked_add(1)
            .ok_or(BountyError::Overflow)?;
        let (submission_key, submission_bump) = submission_address(program_id, submission_id);
        Self::check_address("submission", &submission_key, submission_info)?;
        Self::check_unused(program_id, submission_info)?;

        let mut state = LedgerState::with_header(header);
        if let Some(bounty) = bounty {
            state.bounties.insert(bounty_id, bounty);
        }
        let mut ledger = Ledger::load(state, NoCustody)?;
        let invocation = Invocation::new(*researcher_info.key, now);
        let submission_id = ledger.claim_and_submit(&invocation, bounty_id, report_reference)?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        let bounty = state
            .bounties
            .get(&bounty_id)
            .cloned()
            .ok_or(BountyError::BountyNotFound)?;
        let submission = state
            .submissions
            .get(&submission_id)
            .cloned()
            .ok_or(BountyError::SubmissionNotFound)?;

        let id_bytes = submission_id.to_le_bytes();
        Self::create_pda(
            program_id,
            researcher_info,
            submission_info,
            system_program_info,
            Record::SUBMISSION_LEN,
            &[SUBMISSION_SEED, &id_bytes, &[submission_bump]],
        )?;
        Self::write_record(submission_info, &Record::Submission(submission))?;
        Self::write_record(bounty_info, &Record::Bounty(bounty))?;
        Self::write_record(config_info, &Record::Header(state.header()))?;
        msg!("Submission {} recorded", submission_id);
        Ok(committed)
    }

    fn process_approve_and_pay(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        bounty_id: u64,
        submission_id: u64,
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let issuer_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;
        let bounty_info = next_account_info(account_info_iter)?;
        let submission_info = next_account_info(account_info_iter)?;
        let vault_info = next_account_info(account_info_iter)?;
        let researcher_info = next_account_info(account_info_iter)?;
        let administrator_info = next_account_info(account_info_iter)?;

        if !issuer_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let header = Self::load_header(program_id, config_info)?;
        let bounty = Self::load_bounty(program_id, bounty_info, bounty_id)?;
        let submission = Self::load_submission(program_id, submission_info, submission_id)?;
        let (vault_key, _) = vault_address(program_id, config_info.key);
        Self::check_address("vault", &vault_key, vault_info)?;
        if vault_info.owner != program_id {
            return Err(ProgramError::IncorrectProgramId);
        }

        let mut state = LedgerState::with_header(header);
        if let Some(bounty) = bounty {
            state.bounties.insert(bounty_id, bounty);
        }
        if let Some(submission) = submission {
            state.submissions.insert(submission_id, submission);
        }
        let vault = ProgramVault::for_payout(vault_info, vec![researcher_info, administrator_info]);
        let mut ledger = Ledger::load(state, vault)?;
        let invocation = Invocation::new(*issuer_info.key, now);
        let split = ledger.approve_and_pay(&invocation, bounty_id, submission_id)?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        let bounty = state
            .bounties
            .get(&bounty_id)
            .cloned()
            .ok_or(BountyError::BountyNotFound)?;
        let submission = state
            .submissions
            .get(&submission_id)
            .cloned()
            .ok_or(BountyError::SubmissionNotFound)?;
        Self::write_record(submission_info, &Record::Submission(submission))?;
        Self::write_record(bounty_info, &Record::Bounty(bounty))?;
        msg!(
            "Bounty {} settled: researcher {} lamports, fee {} lamports",
            bounty_id,
            split.researcher_payment,
            split.platform_fee
        );
        Ok(committed)
    }

    fn process_update_fee(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        fee_percentage: u8,
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let administrator_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;

        if !administrator_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let header = Self::load_header(program_id, config_info)?;
        let mut ledger = Ledger::load(LedgerState::with_header(header), NoCustody)?;
        ledger.update_fee(&Invocation::new(*administrator_info.key, now), fee_percentage)?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        Self::write_record(config_info, &Record::Header(state.header()))?;
        Ok(committed)
    }

    fn process_transfer_administrator(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        new_administrator: Pubkey,
        now: UnixTimestamp,
    ) -> Result<Vec<LedgerEvent>, ProgramError> {
        let account_info_iter = &mut accounts.iter();

        let administrator_info = next_account_info(account_info_iter)?;
        let config_info = next_account_info(account_info_iter)?;

        if !administrator_info.is_signer {
            return Err(ProgramError::MissingRequiredSignature);
        }

        let header = Self::load_header(program_id, config_info)?;
        let mut ledger = Ledger::load(LedgerState::with_header(header), NoCustody)?;
        ledger.transfer_administrator(
            &Invocation::new(*administrator_info.key, now),
            new_administrator,
        )?;

        let committed = ledger.drain_events();
        let (state, _) = ledger.into_parts();
        Self::write_record(config_info, &Record::Header(state.header()))?;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{escrow::MemoryVault, state::BountyStatus};

    const NOW: UnixTimestamp = 1_700_000_000;
    const VAULT_RENT: u64 = 890_880;

    struct TestAccount {
        key: Pubkey,
        owner: Pubkey,
        lamports: u64,
        data: Vec<u8>,
    }

    impl TestAccount {
        fn new(key: Pubkey, owner: Pubkey, lamports: u64, space: usize) -> Self {
            Self {
                key,
                owner,
                lamports,
                data: vec![0; space],
            }
        }

        fn info(&mut self, is_signer: bool) -> AccountInfo<'_> {
            AccountInfo::new(
                &self.key,
                is_signer,
                true,
                &mut self.lamports,
                &mut self.data,
                &self.owner,
                false,
                0,
            )
        }
    }

    /// Record accounts already allocated to the program; creating them needs
    /// the rent sysvar, which only the runtime provides.
    struct Harness {
        program_id: Pubkey,
        admin: TestAccount,
        issuer: TestAccount,
        researcher: TestAccount,
        config: TestAccount,
        vault: TestAccount,
        system: TestAccount,
        bounties: BTreeMap<u64, TestAccount>,
        submissions: BTreeMap<u64, TestAccount>,
    }

    fn harness() -> Harness {
        let program_id = Pubkey::new_unique();
        let (config_key, _) = config_address(&program_id);
        let (vault_key, _) = vault_address(&program_id, &config_key);
        let wallet = |lamports| TestAccount::new(Pubkey::new_unique(), system_program::id(), lamports, 0);
        Harness {
            program_id,
            admin: wallet(1_000),
            issuer: wallet(1_000_000),
            researcher: wallet(0),
            config: TestAccount::new(config_key, program_id, 0, Record::HEADER_LEN),
            vault: TestAccount::new(vault_key, program_id, VAULT_RENT, 0),
            system: TestAccount::new(system_program::id(), Pubkey::default(), 0, 0),
            bounties: BTreeMap::new(),
            submissions: BTreeMap::new(),
        }
    }

    fn encode(instruction: &BountyInstruction) -> Vec<u8> {
        borsh::to_vec(instruction).unwrap()
    }

    fn create_data(reward: u64, deadline: UnixTimestamp) -> Vec<u8> {
        encode(&BountyInstruction::CreateBounty {
            title: "Audit staking".to_string(),
            description: "Check reward math".to_string(),
            deadline,
            category: "staking".to_string(),
            reward,
        })
    }

    fn record_slot(program_id: Pubkey, key: Pubkey, space: usize) -> TestAccount {
        TestAccount::new(key, program_id, 0, space)
    }

    impl Harness {
        fn header(&self) -> LedgerHeader {
            match Record::unpack(&self.config.data).unwrap() {
                Record::Header(header) => header,
                _ => LedgerHeader::default(),
            }
        }

        /// Every record the program owns, assembled the way a client would.
        fn state(&self) -> LedgerState {
            let accounts = std::iter::once(&self.config)
                .chain(self.bounties.values())
                .chain(self.submissions.values());
            LedgerState::from_records(accounts.map(|account| Record::unpack(&account.data).unwrap()))
        }

        fn initialize(&mut self, fee_percentage: u8) -> ProgramResult {
            let data = encode(&BountyInstruction::Initialize { fee_percentage });
            let accounts = [
                self.admin.info(true),
                self.config.info(false),
                self.vault.info(false),
                self.system.info(false),
            ];
            Processor::process_at(&self.program_id, &accounts, &data, NOW)
        }

        fn bounty_slot(&mut self, bounty_id: u64) -> &mut TestAccount {
            let program_id = self.program_id;
            self.bounties.entry(bounty_id).or_insert_with(|| {
                let (key, _) = bounty_address(&program_id, bounty_id);
                record_slot(program_id, key, Record::BOUNTY_LEN)
            })
        }

        fn submission_slot(&mut self, submission_id: u64) -> &mut TestAccount {
            let program_id = self.program_id;
            self.submissions.entry(submission_id).or_insert_with(|| {
                let (key, _) = submission_address(&program_id, submission_id);
                record_slot(program_id, key, Record::SUBMISSION_LEN)
            })
        }

        fn execute_create(&mut self, reward: u64, deadline: UnixTimestamp) -> Result<Vec<LedgerEvent>, ProgramError> {
            let data = create_data(reward, deadline);
            let bounty_id = self.header().bounty_count + 1;
            self.bounty_slot(bounty_id);
            let bounty = self.bounties.get_mut(&bounty_id).unwrap();
            let accounts = [
                self.issuer.info(true),
                self.config.info(false),
                bounty.info(false),
                self.vault.info(false),
                self.system.info(false),
            ];
            Processor::execute(&self.program_id, &accounts, &data, NOW)
        }

        fn create(&mut self, reward: u64, deadline: UnixTimestamp) -> ProgramResult {
            self.execute_create(reward, deadline)?;
            // System transfers are not executed outside the runtime
            self.issuer.lamports -= reward;
            self.vault.lamports += reward;
            Ok(())
        }

        fn claim(&mut self, bounty_id: u64, signed: bool, now: UnixTimestamp) -> ProgramResult {
            let data = encode(&BountyInstruction::ClaimAndSubmit {
                bounty_id,
                report_reference: "QmReport".to_string(),
            });
            let submission_id = self.header().submission_count + 1;
            self.bounty_slot(bounty_id);
            self.submission_slot(submission_id);
            let bounty = self.bounties.get_mut(&bounty_id).unwrap();
            let submission = self.submissions.get_mut(&submission_id).unwrap();
            let accounts = [
                self.researcher.info(signed),
                self.config.info(false),
                bounty.info(false),
                submission.info(false),
                self.system.info(false),
            ];
            Processor::process_at(&self.program_id, &accounts, &data, now)
        }

        fn approve(&mut self, bounty_id: u64, submission_id: u64) -> ProgramResult {
            let data = encode(&BountyInstruction::ApproveAndPay {
                bounty_id,
                submission_id,
            });
            self.bounty_slot(bounty_id);
            self.submission_slot(submission_id);
            let bounty = self.bounties.get_mut(&bounty_id).unwrap();
            let submission = self.submissions.get_mut(&submission_id).unwrap();
            let accounts = [
                self.issuer.info(true),
                self.config.info(false),
                bounty.info(false),
                submission.info(false),
                self.vault.info(false),
                self.researcher.info(false),
                self.admin.info(false),
            ];
            Processor::process_at(&self.program_id, &accounts, &data, NOW + 20)
        }

        /// Sends an administrative instruction signed by the administrator
        /// or, when `by_admin` is false, by the issuer.
        fn administer(&mut self, instruction: &BountyInstruction, by_admin: bool) -> ProgramResult {
            let data = encode(instruction);
            let caller = if by_admin {
                &mut self.admin
            } else {
                &mut self.issuer
            };
            let accounts = [caller.info(true), self.config.info(false)];
            Processor::process_at(&self.program_id, &accounts, &data, NOW)
        }
    }

    #[test]
    fn full_lifecycle_pays_out_of_vault() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.claim(1, true, NOW + 10).unwrap();
        h.approve(1, 1).unwrap();

        assert_eq!(h.researcher.lamports, 95);
        assert_eq!(h.admin.lamports, 1_005);
        assert_eq!(h.vault.lamports, VAULT_RENT);

        let state = h.state();
        let bounty = &state.bounties[&1];
        assert_eq!(bounty.status(), BountyStatus::Completed);
        assert!(bounty.paid);
        assert!(state.submissions[&1].approved);
        assert_eq!(state.issuer_index[&h.issuer.key], vec![1]);
        assert_eq!(state.researcher_index[&h.researcher.key], vec![1]);
    }

    #[test]
    fn queries_answer_from_program_accounts() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.create(200, NOW + 60).unwrap();
        h.claim(2, true, NOW + 10).unwrap();

        let ledger = Ledger::load(h.state(), MemoryVault::new()).unwrap();
        assert_eq!(ledger.bounty_count(), 2);
        assert_eq!(ledger.submission_count(), 1);
        assert_eq!(ledger.issuer_bounties(&h.issuer.key), &[1, 2]);
        assert_eq!(ledger.researcher_bounties(&h.researcher.key), &[2]);
        assert_eq!(ledger.active_bounties_count(NOW + 10), 2);
        assert_eq!(ledger.active_bounties_count(NOW + 60), 1);
        assert_eq!(ledger.total_escrowed(), 300);
        assert_eq!(ledger.submission(1).unwrap().report_reference, "QmReport");
    }

    #[test]
    fn bounties_stay_claimable_however_many_exist() {
        let mut h = harness();
        h.initialize(5).unwrap();
        for _ in 0..120 {
            h.create(100, NOW + 3_600).unwrap();
        }
        h.claim(120, true, NOW + 10).unwrap();
        h.approve(120, 1).unwrap();

        assert_eq!(h.header().bounty_count, 120);
        assert_eq!(h.researcher.lamports, 95);
        assert_eq!(h.vault.lamports, VAULT_RENT + 119 * 100);
        assert_eq!(h.state().bounties[&120].status(), BountyStatus::Completed);
    }

    #[test]
    fn initialize_only_once() {
        let mut h = harness();
        h.initialize(5).unwrap();
        assert_eq!(
            h.initialize(5),
            Err(BountyError::AlreadyInitialized.into())
        );
        assert_eq!(h.header().config.administrator, h.admin.key);
    }

    #[test]
    fn initialize_rejects_fee_above_cap() {
        let mut h = harness();
        assert_eq!(h.initialize(11), Err(BountyError::FeeAboveCap.into()));
        assert!(!h.state().is_initialized());
    }

    #[test]
    fn operations_need_an_initialized_ledger() {
        let mut h = harness();
        assert_eq!(
            h.create(100, NOW + 3_600),
            Err(BountyError::NotInitialized.into())
        );
    }

    #[test]
    fn claim_requires_signature() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        assert_eq!(
            h.claim(1, false, NOW + 10),
            Err(ProgramError::MissingRequiredSignature)
        );
    }

    #[test]
    fn rejected_claim_leaves_account_data_untouched() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        let header = h.config.data.clone();
        let bounty = h.bounties[&1].data.clone();

        assert_eq!(
            h.claim(1, true, NOW + 3_601),
            Err(BountyError::DeadlinePassed.into())
        );
        assert_eq!(h.config.data, header);
        assert_eq!(h.bounties[&1].data, bounty);
        assert_eq!(Record::unpack(&h.submissions[&1].data).unwrap(), Record::Uninitialized);
    }

    #[test]
    fn claim_on_unknown_bounty_is_not_found() {
        let mut h = harness();
        h.initialize(5).unwrap();
        assert_eq!(
            h.claim(7, true, NOW + 10),
            Err(BountyError::BountyNotFound.into())
        );
    }

    #[test]
    fn stale_bounty_address_is_rejected() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();

        // Bounty 1's account where bounty 2's is due
        let data = create_data(50, NOW + 3_600);
        let bounty = h.bounties.get_mut(&1).unwrap();
        let accounts = [
            h.issuer.info(true),
            h.config.info(false),
            bounty.info(false),
            h.vault.info(false),
            h.system.info(false),
        ];
        assert_eq!(
            Processor::process_at(&h.program_id, &accounts, &data, NOW),
            Err(ProgramError::InvalidAccountData)
        );
    }

    #[test]
    fn failed_write_publishes_no_events() {
        let mut h = harness();
        h.initialize(5).unwrap();
        // An account too small for the record makes the final write fail
        let (key, _) = bounty_address(&h.program_id, 1);
        h.bounties.insert(1, record_slot(h.program_id, key, 16));
        let header = h.config.data.clone();

        assert_eq!(
            h.execute_create(100, NOW + 3_600),
            Err(BountyError::AccountDataTooSmall.into())
        );
        assert_eq!(h.config.data, header);
        assert_eq!(h.header().bounty_count, 0);
    }

    #[test]
    fn committed_create_publishes_its_event() {
        let mut h = harness();
        h.initialize(5).unwrap();
        let committed = h.execute_create(100, NOW + 3_600).unwrap();
        assert_eq!(
            committed,
            vec![LedgerEvent::BountyCreated {
                bounty_id: 1,
                issuer: h.issuer.key,
                title: "Audit staking".to_string(),
                reward: 100,
                deadline: NOW + 3_600,
            }]
        );
    }

    #[test]
    fn approve_without_researcher_account_fails() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.claim(1, true, NOW + 10).unwrap();
        // Someone else stands in for the researcher
        h.researcher.key = Pubkey::new_unique();
        let before = h.bounties[&1].data.clone();

        assert_eq!(h.approve(1, 1), Err(BountyError::PayeeAccountMissing.into()));
        assert_eq!(h.bounties[&1].data, before);
        assert_eq!(h.vault.lamports, VAULT_RENT + 100);
    }

    #[test]
    fn second_approval_moves_no_lamports() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.claim(1, true, NOW + 10).unwrap();
        h.approve(1, 1).unwrap();

        assert_eq!(
            h.approve(1, 1),
            Err(BountyError::BountyAlreadyCompleted.into())
        );
        assert_eq!(h.vault.lamports, VAULT_RENT);
        assert_eq!(h.researcher.lamports, 95);
        assert_eq!(h.admin.lamports, 1_005);
    }

    #[test]
    fn update_fee_applies_to_later_payouts() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.claim(1, true, NOW + 10).unwrap();

        h.administer(&BountyInstruction::UpdateFee { fee_percentage: 8 }, true)
            .unwrap();
        assert_eq!(h.header().config.fee_percentage, 8);
        assert_eq!(
            h.administer(&BountyInstruction::UpdateFee { fee_percentage: 11 }, true),
            Err(BountyError::FeeAboveCap.into())
        );

        h.approve(1, 1).unwrap();
        assert_eq!(h.researcher.lamports, 92);
        assert_eq!(h.admin.lamports, 1_008);
    }

    #[test]
    fn administration_rejects_other_signers() {
        let mut h = harness();
        h.initialize(5).unwrap();
        let header = h.config.data.clone();

        assert_eq!(
            h.administer(&BountyInstruction::UpdateFee { fee_percentage: 1 }, false),
            Err(BountyError::NotAdministrator.into())
        );
        assert_eq!(
            h.administer(
                &BountyInstruction::TransferAdministrator {
                    new_administrator: h.issuer.key,
                },
                false
            ),
            Err(BountyError::NotAdministrator.into())
        );
        assert_eq!(h.config.data, header);
    }

    #[test]
    fn fee_follows_transferred_administrator() {
        let mut h = harness();
        h.initialize(5).unwrap();
        h.create(100, NOW + 3_600).unwrap();
        h.claim(1, true, NOW + 10).unwrap();

        let successor = Pubkey::new_unique();
        h.administer(
            &BountyInstruction::TransferAdministrator {
                new_administrator: successor,
            },
            true,
        )
        .unwrap();
        assert_eq!(h.header().config.administrator, successor);
        assert_eq!(
            h.administer(&BountyInstruction::UpdateFee { fee_percentage: 1 }, true),
            Err(BountyError::NotAdministrator.into())
        );

        // The former administrator's account cannot collect the fee
        assert_eq!(h.approve(1, 1), Err(BountyError::PayeeAccountMissing.into()));
        assert_eq!(h.vault.lamports, VAULT_RENT + 100);
        assert_eq!(h.admin.lamports, 1_000);

        h.admin.key = successor;
        h.approve(1, 1).unwrap();
        assert_eq!(h.admin.lamports, 1_005);
        assert_eq!(h.researcher.lamports, 95);
    }

    #[test]
    fn config_address_is_verified() {
        let mut h = harness();
        h.config.key = Pubkey::new_unique();
        assert_eq!(h.initialize(5), Err(ProgramError::InvalidAccountData));
    }

    #[test]
    fn unknown_instruction_is_rejected() {
        let mut h = harness();
        let accounts = [h.admin.info(true)];
        assert_eq!(
            Processor::process_at(&h.program_id, &accounts, &[99], NOW),
            Err(ProgramError::InvalidInstructionData)
        );
    }

    #[test]
    fn empty_address_is_created_in_one_step() {
        let (payer, target, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let rent = Rent::default();
        assert_eq!(
            account_creation_instructions(&payer, &target, 0, &rent, 64, &owner),
            vec![system_instruction::create_account(
                &payer,
                &target,
                rent.minimum_balance(64),
                64,
                &owner
            )]
        );
    }

    #[test]
    fn prefunded_address_is_topped_up_allocated_and_assigned() {
        let (payer, target, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let rent = Rent::default();
        let required = rent.minimum_balance(64);

        assert_eq!(
            account_creation_instructions(&payer, &target, 1, &rent, 64, &owner),
            vec![
                system_instruction::transfer(&payer, &target, required - 1),
                system_instruction::allocate(&target, 64),
                system_instruction::assign(&target, &owner),
            ]
        );
        // Already rent exempt: nothing to pay
        assert_eq!(
            account_creation_instructions(&payer, &target, required, &rent, 64, &owner),
            vec![
                system_instruction::allocate(&target, 64),
                system_instruction::assign(&target, &owner),
            ]
        );
    }
}
