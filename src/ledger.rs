use solana_program::{clock::UnixTimestamp, msg, pubkey::Pubkey};

use crate::{
    access,
    constants::{
        DEFAULT_FEE_PERCENTAGE, MAX_CATEGORY_LEN, MAX_DESCRIPTION_LEN, MAX_FEE_PERCENTAGE,
        MAX_REPORT_REFERENCE_LEN, MAX_TITLE_LEN,
    },
    error::BountyError,
    escrow::{FeeSplit, Transfer, Vault},
    events::LedgerEvent,
    state::{AdminConfig, Bounty, LedgerState, Submission},
};

/// Who is calling and when. Supplied by the runtime for every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub caller: Pubkey,
    pub now: UnixTimestamp,
}

impl Invocation {
    pub fn new(caller: Pubkey, now: UnixTimestamp) -> Self {
        Self { caller, now }
    }
}

/// Settings a ledger starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    pub administrator: Pubkey,
    pub fee_percentage: u8,
}

impl LedgerConfig {
    pub fn new(administrator: Pubkey) -> Self {
        Self {
            administrator,
            fee_percentage: DEFAULT_FEE_PERCENTAGE,
        }
    }

    pub fn with_fee_percentage(mut self, fee_percentage: u8) -> Self {
        self.fee_percentage = fee_percentage;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBounty {
    pub title: String,
    pub description: String,
    pub deadline: UnixTimestamp,
    pub category: String,
    pub reward: u64,
}

/// The bounty ledger. Every operation checks all of its guards before the
/// first write, so a failed call leaves both the state and the vault as they
/// were.
#[derive(Debug)]
pub struct Ledger<V: Vault> {
    state: LedgerState,
    vault: V,
    events: Vec<LedgerEvent>,
}

fn check_text(value: &str, max_len: usize, empty: Option<BountyError>) -> Result<(), BountyError> {
    if let Some(err) = empty {
        if value.is_empty() {
            return Err(err);
        }
    }
    if value.len() > max_len {
        return Err(BountyError::FieldTooLong);
    }
    Ok(())
}

fn check_fee(fee_percentage: u8) -> Result<(), BountyError> {
    if fee_percentage > MAX_FEE_PERCENTAGE {
        return Err(BountyError::FeeAboveCap);
    }
    Ok(())
}

fn check_administrator(administrator: &Pubkey) -> Result<(), BountyError> {
    if *administrator == Pubkey::default() {
        return Err(BountyError::NullAdministrator);
    }
    Ok(())
}

impl<V: Vault> Ledger<V> {
    /// Starts an empty ledger.
    pub fn new(config: LedgerConfig, vault: V) -> Result<Self, BountyError> {
        check_administrator(&config.administrator)?;
        check_fee(config.fee_percentage)?;

        let state = LedgerState {
            initialized: true,
            config: AdminConfig {
                fee_percentage: config.fee_percentage,
                administrator: config.administrator,
            },
            ..LedgerState::default()
        };
        msg!(
            "Ledger initialized: administrator {}, fee {}%",
            config.administrator,
            config.fee_percentage
        );
        Ok(Self {
            state,
            vault,
            events: Vec::new(),
        })
    }

    /// Resumes a ledger from persisted state.
    pub fn load(state: LedgerState, vault: V) -> Result<Self, BountyError> {
        if !state.is_initialized() {
            return Err(BountyError::NotInitialized);
        }
        Ok(Self {
            state,
            vault,
            events: Vec::new(),
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn into_parts(self) -> (LedgerState, V) {
        (self.state, self.vault)
    }

    /// Notifications raised since the last drain, oldest first. They are
    /// only buffered here; publishing them is up to whoever commits the
    /// state.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn create_bounty(
        &mut self,
        invocation: &Invocation,
        bounty: NewBounty,
    ) -> Result<u64, BountyError> {
        if bounty.reward == 0 {
            return Err(BountyError::InvalidBountyAmount);
        }
        if bounty.deadline <= invocation.now {
            return Err(BountyError::InvalidDeadline);
        }
        check_text(&bounty.title, MAX_TITLE_LEN, Some(BountyError::EmptyTitle))?;
        check_text(
            &bounty.description,
            MAX_DESCRIPTION_LEN,
            Some(BountyError::EmptyDescription),
        )?;
        check_text(&bounty.category, MAX_CATEGORY_LEN, None)?;

        let id = self
            .state
            .bounty_count
            .checked_add(1)
            .ok_or(BountyError::Overflow)?;

        // Lock the reward before anything is written
        self.vault.deposit(&invocation.caller, bounty.reward)?;

        let NewBounty {
            title,
            description,
            deadline,
            category,
            reward,
        } = bounty;
        self.state.bounty_count = id;
        self.state.bounties.insert(
            id,
            Bounty {
                id,
                issuer: invocation.caller,
                title: title.clone(),
                description,
                reward,
                deadline,
                researcher: None,
                completed: false,
                paid: false,
                created_at: invocation.now,
                category,
            },
        );
        self.state
            .issuer_index
            .entry(invocation.caller)
            .or_default()
            .push(id);

        msg!("Bounty {} created by {} with {} lamports", id, invocation.caller, reward);
        self.record(LedgerEvent::BountyCreated {
            bounty_id: id,
            issuer: invocation.caller,
            title,
            reward,
            deadline,
        });
        Ok(id)
    }

    /// Claims an open bounty for the caller and records their submission in
    /// one step, so no second researcher can slip in between the two.
    pub fn claim_and_submit(
        &mut self,
        invocation: &Invocation,
        bounty_id: u64,
        report_reference: String,
    ) -> Result<u64, BountyError> {
        let bounty = self
            .state
            .bounties
            .get(&bounty_id)
            .ok_or(BountyError::BountyNotFound)?;
        if invocation.now > bounty.deadline {
            return Err(BountyError::DeadlinePassed);
        }
        if bounty.researcher.is_some() {
            return Err(BountyError::BountyAlreadyClaimed);
        }
        if bounty.completed {
            return Err(BountyError::BountyAlreadyCompleted);
        }
        check_text(
            &report_reference,
            MAX_REPORT_REFERENCE_LEN,
            Some(BountyError::EmptyReportReference),
        )?;

        let submission_id = self
            .state
            .submission_count
            .checked_add(1)
            .ok_or(BountyError::Overflow)?;
        let researcher = invocation.caller;

        if let Some(bounty) = self.state.bounties.get_mut(&bounty_id) {
            bounty.researcher = Some(researcher);
        }
        self.state
            .researcher_index
            .entry(researcher)
            .or_default()
            .push(bounty_id);
        self.state.submission_count = submission_id;
        self.state.submissions.insert(
            submission_id,
            Submission {
                id: submission_id,
                bounty_id,
                researcher,
                report_reference: report_reference.clone(),
                submitted_at: invocation.now,
                approved: false,
            },
        );

        msg!("Bounty {} claimed by {}", bounty_id, researcher);
        self.record(LedgerEvent::BountyClaimed {
            bounty_id,
            researcher,
        });
        self.record(LedgerEvent::SubmissionMade {
            submission_id,
            bounty_id,
            researcher,
            report_reference,
        });
        Ok(submission_id)
    }

    /// Approves a submission and pays the researcher, less the platform fee
    /// in effect right now. Returns the split that was paid.
    pub fn approve_and_pay(
        &mut self,
        invocation: &Invocation,
        bounty_id: u64,
        submission_id: u64,
    ) -> Result<FeeSplit, BountyError> {
        let bounty = self
            .state
            .bounties
            .get(&bounty_id)
            .ok_or(BountyError::BountyNotFound)?;
        access::require_issuer(bounty, &invocation.caller)?;
        if bounty.completed || bounty.paid {
            return Err(BountyError::BountyAlreadyCompleted);
        }
        let submission = self
            .state
            .submissions
            .get(&submission_id)
            .ok_or(BountyError::SubmissionNotFound)?;
        if submission.bounty_id != bounty_id {
            return Err(BountyError::SubmissionBountyMismatch);
        }
        access::require_assigned_researcher(bounty, &submission.researcher)?;
        if submission.approved {
            return Err(BountyError::SubmissionAlreadyApproved);
        }

        let researcher = submission.researcher;
        let fee_recipient = self.state.config.administrator;
        let split = FeeSplit::compute(bounty.reward, self.state.config.fee_percentage)?;

        // State first: a re-entrant payout must already see the bounty paid
        self.mark_settled(bounty_id, submission_id, true);

        let mut transfers = vec![Transfer {
            to: researcher,
            amount: split.researcher_payment,
        }];
        if split.platform_fee > 0 {
            transfers.push(Transfer {
                to: fee_recipient,
                amount: split.platform_fee,
            });
        }
        if let Err(e) = self.vault.release(&transfers) {
            msg!("Payout for bounty {} failed: {}", bounty_id, e);
            self.mark_settled(bounty_id, submission_id, false);
            return Err(e);
        }

        msg!(
            "Bounty {} paid: {} lamports to {}, fee {} lamports to {}",
            bounty_id,
            split.researcher_payment,
            researcher,
            split.platform_fee,
            fee_recipient
        );
        self.record(LedgerEvent::BountyCompleted {
            bounty_id,
            researcher,
            researcher_payment: split.researcher_payment,
        });
        Ok(split)
    }

    fn mark_settled(&mut self, bounty_id: u64, submission_id: u64, settled: bool) {
        if let Some(submission) = self.state.submissions.get_mut(&submission_id) {
            submission.approved = settled;
        }
        if let Some(bounty) = self.state.bounties.get_mut(&bounty_id) {
            bounty.completed = settled;
            bounty.paid = settled;
        }
    }

    pub fn update_fee(
        &mut self,
        invocation: &Invocation,
        fee_percentage: u8,
    ) -> Result<(), BountyError> {
        access::require_administrator(&self.state.config, &invocation.caller)?;
        check_fee(fee_percentage)?;

        let old_fee_percentage = self.state.config.fee_percentage;
        self.state.config.fee_percentage = fee_percentage;
        msg!("Fee updated from {}% to {}%", old_fee_percentage, fee_percentage);
        self.record(LedgerEvent::FeeUpdated {
            old_fee_percentage,
            new_fee_percentage: fee_percentage,
        });
        Ok(())
    }

    pub fn transfer_administrator(
        &mut self,
        invocation: &Invocation,
        new_administrator: Pubkey,
    ) -> Result<(), BountyError> {
        access::require_administrator(&self.state.config, &invocation.caller)?;
        check_administrator(&new_administrator)?;

        let previous = self.state.config.administrator;
        self.state.config.administrator = new_administrator;
        msg!("Administrator transferred from {} to {}", previous, new_administrator);
        self.record(LedgerEvent::AdministratorTransferred {
            previous,
            new: new_administrator,
        });
        Ok(())
    }

    pub fn bounty(&self, bounty_id: u64) -> Result<&Bounty, BountyError> {
        self.state
            .bounties
            .get(&bounty_id)
            .ok_or(BountyError::BountyNotFound)
    }

    pub fn submission(&self, submission_id: u64) -> Result<&Submission, BountyError> {
        self.state
            .submissions
            .get(&submission_id)
            .ok_or(BountyError::SubmissionNotFound)
    }

    pub fn issuer_bounties(&self, issuer: &Pubkey) -> &[u64] {
        self.state
            .issuer_index
            .get(issuer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn researcher_bounties(&self, researcher: &Pubkey) -> &[u64] {
        self.state
            .researcher_index
            .get(researcher)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Unfinished bounties whose deadline is still ahead. Scans every bounty.
    pub fn active_bounties_count(&self, now: UnixTimestamp) -> u64 {
        self.state
            .bounties
            .values()
            .filter(|bounty| bounty.is_active(now))
            .count() as u64
    }

    pub fn fee_percentage(&self) -> u8 {
        self.state.config.fee_percentage
    }

    pub fn administrator(&self) -> Pubkey {
        self.state.config.administrator
    }

    pub fn bounty_count(&self) -> u64 {
        self.state.bounty_count
    }

    pub fn submission_count(&self) -> u64 {
        self.state.submission_count
    }

    /// Sum of rewards not yet paid out.
    pub fn total_escrowed(&self) -> u64 {
        self.state
            .bounties
            .values()
            .fold(0u64, |acc, bounty| acc.saturating_add(bounty.escrowed()))
    }
}
