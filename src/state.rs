use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{clock::UnixTimestamp, pubkey::Pubkey};

use crate::{
    constants::{MAX_CATEGORY_LEN, MAX_DESCRIPTION_LEN, MAX_REPORT_REFERENCE_LEN, MAX_TITLE_LEN},
    error::BountyError,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyStatus {
    Open,
    Claimed,
    Completed,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bounty {
    pub id: u64,
    pub issuer: Pubkey,                 // Who funded this bounty
    pub title: String,
    pub description: String,
    pub reward: u64,                    // Lamports locked at creation, never changed
    pub deadline: UnixTimestamp,        // Last second a claim is accepted
    pub researcher: Option<Pubkey>,     // None until claimed
    pub completed: bool,
    pub paid: bool,
    pub created_at: UnixTimestamp,
    pub category: String,
}

impl Bounty {
    pub fn status(&self) -> BountyStatus {
        if self.completed {
            BountyStatus::Completed
        } else if self.researcher.is_some() {
            BountyStatus::Claimed
        } else {
            BountyStatus::Open
        }
    }

    /// Lamports the vault holds on behalf of this bounty.
    pub fn escrowed(&self) -> u64 {
        if self.paid {
            0
        } else {
            self.reward
        }
    }

    pub fn is_active(&self, now: UnixTimestamp) -> bool {
        !self.completed && self.deadline > now
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: u64,
    pub bounty_id: u64,
    pub researcher: Pubkey,
    pub report_reference: String,       // Opaque pointer to off-chain content
    pub submitted_at: UnixTimestamp,
    pub approved: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminConfig {
    pub fee_percentage: u8,
    pub administrator: Pubkey,
}

/// Ledger-wide settings and id counters, kept in the config account.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerHeader {
    pub config: AdminConfig,
    pub bounty_count: u64,
    pub submission_count: u64,
}

/// Contents of one program-owned account. A zeroed buffer decodes as
/// `Uninitialized`.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Uninitialized,
    Header(LedgerHeader),
    Bounty(Bounty),
    Submission(Submission),
}

const TAG_LEN: usize = 1;
const PUBKEY_LEN: usize = 32;
const fn string_len(max: usize) -> usize {
    4 + max
}

impl Record {
    pub const HEADER_LEN: usize = TAG_LEN + 1 + PUBKEY_LEN + 8 + 8;

    /// Room for the largest bounty, researcher included, so a claim never
    /// needs more space than creation reserved.
    pub const BOUNTY_LEN: usize = TAG_LEN
        + 8
        + PUBKEY_LEN
        + string_len(MAX_TITLE_LEN)
        + string_len(MAX_DESCRIPTION_LEN)
        + 8
        + 8
        + 1
        + PUBKEY_LEN
        + 1
        + 1
        + 8
        + string_len(MAX_CATEGORY_LEN);

    pub const SUBMISSION_LEN: usize =
        TAG_LEN + 8 + 8 + PUBKEY_LEN + string_len(MAX_REPORT_REFERENCE_LEN) + 8 + 1;

    /// Decodes the record at the front of an account buffer. Trailing bytes
    /// are ignored.
    pub fn unpack(data: &[u8]) -> Result<Self, std::io::Error> {
        let mut cursor = data;
        Self::deserialize(&mut cursor)
    }

    /// Encodes the record into `data`, failing if it does not fit.
    pub fn pack_into(&self, data: &mut [u8]) -> Result<usize, BountyError> {
        let bytes = borsh::to_vec(self).map_err(|_| BountyError::AccountDataTooSmall)?;
        if bytes.len() > data.len() {
            return Err(BountyError::AccountDataTooSmall);
        }
        data[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}

/// A view over ledger records. On-chain it holds only the records one
/// instruction touches; off-chain [`LedgerState::from_records`] assembles the
/// complete ledger from every program account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerState {
    pub initialized: bool,
    pub config: AdminConfig,
    pub bounty_count: u64,
    pub submission_count: u64,
    pub bounties: BTreeMap<u64, Bounty>,
    pub submissions: BTreeMap<u64, Submission>,
    pub issuer_index: BTreeMap<Pubkey, Vec<u64>>,
    pub researcher_index: BTreeMap<Pubkey, Vec<u64>>,
}

impl LedgerState {
    pub fn with_header(header: LedgerHeader) -> Self {
        Self {
            initialized: true,
            config: header.config,
            bounty_count: header.bounty_count,
            submission_count: header.submission_count,
            ..Self::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn header(&self) -> LedgerHeader {
        LedgerHeader {
            config: self.config,
            bounty_count: self.bounty_count,
            submission_count: self.submission_count,
        }
    }

    /// One record per account the ledger would occupy.
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(1 + self.bounties.len() + self.submissions.len());
        if self.initialized {
            records.push(Record::Header(self.header()));
        }
        records.extend(self.bounties.values().cloned().map(Record::Bounty));
        records.extend(self.submissions.values().cloned().map(Record::Submission));
        records
    }

    /// Rebuilds the ledger from its records, in any order. Issuer lists follow
    /// bounty ids and researcher lists follow submission ids, which is the
    /// order bounties were created and claimed in.
    pub fn from_records<I: IntoIterator<Item = Record>>(records: I) -> Self {
        let mut state = Self::default();
        for record in records {
            match record {
                Record::Uninitialized => {}
                Record::Header(header) => {
                    state.initialized = true;
                    state.config = header.config;
                    state.bounty_count = header.bounty_count;
                    state.submission_count = header.submission_count;
                }
                Record::Bounty(bounty) => {
                    state.bounties.insert(bounty.id, bounty);
                }
                Record::Submission(submission) => {
                    state.submissions.insert(submission.id, submission);
                }
            }
        }

        for bounty in state.bounties.values() {
            state
                .issuer_index
                .entry(bounty.issuer)
                .or_default()
                .push(bounty.id);
        }
        for submission in state.submissions.values() {
            state
                .researcher_index
                .entry(submission.researcher)
                .or_default()
                .push(submission.bounty_id);
        }
        state
    }
}
