use solana_program::{decode_error::DecodeError, program_error::ProgramError};
use thiserror::Error;

/// Broad failure classes reported to callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Expired,
    InvalidState,
    Unauthorized,
    /// Custody or account plumbing failed underneath the ledger.
    Substrate,
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BountyError {
    #[error("Invalid instruction")]
    InvalidInstruction,

    #[error("Bounty title is empty")]
    EmptyTitle,

    #[error("Bounty description is empty")]
    EmptyDescription,

    #[error("Report reference is empty")]
    EmptyReportReference,

    #[error("Text field exceeds its maximum length")]
    FieldTooLong,

    #[error("Invalid bounty amount")]
    InvalidBountyAmount,

    #[error("Invalid deadline")]
    InvalidDeadline,

    #[error("Fee percentage above cap")]
    FeeAboveCap,

    #[error("Administrator cannot be the null identity")]
    NullAdministrator,

    #[error("Bounty not found")]
    BountyNotFound,

    #[error("Submission not found")]
    SubmissionNotFound,

    #[error("Bounty deadline has passed")]
    DeadlinePassed,

    #[error("Bounty already claimed")]
    BountyAlreadyClaimed,

    #[error("Bounty already completed")]
    BountyAlreadyCompleted,

    #[error("Submission already approved")]
    SubmissionAlreadyApproved,

    #[error("Submission belongs to another bounty")]
    SubmissionBountyMismatch,

    #[error("Submission researcher is not the assigned researcher")]
    ResearcherMismatch,

    #[error("Only the bounty issuer can perform this action")]
    NotIssuer,

    #[error("Only the administrator can perform this action")]
    NotAdministrator,

    #[error("Ledger already initialized")]
    AlreadyInitialized,

    #[error("Ledger not initialized")]
    NotInitialized,

    #[error("Account data too small for record")]
    AccountDataTooSmall,

    #[error("Vault holds insufficient funds")]
    InsufficientEscrow,

    #[error("Failed to transfer SOL")]
    TransferFailed,

    #[error("Payee account missing")]
    PayeeAccountMissing,

    #[error("Arithmetic overflow")]
    Overflow,
}

impl BountyError {
    pub fn kind(&self) -> ErrorKind {
        use BountyError::*;
        match self {
            InvalidInstruction | EmptyTitle | EmptyDescription | EmptyReportReference
            | FieldTooLong | InvalidBountyAmount | InvalidDeadline | FeeAboveCap
            | NullAdministrator => ErrorKind::InvalidInput,
            BountyNotFound | SubmissionNotFound => ErrorKind::NotFound,
            DeadlinePassed => ErrorKind::Expired,
            BountyAlreadyClaimed
            | BountyAlreadyCompleted
            | SubmissionAlreadyApproved
            | SubmissionBountyMismatch
            | ResearcherMismatch
            | AlreadyInitialized => ErrorKind::InvalidState,
            NotIssuer | NotAdministrator => ErrorKind::Unauthorized,
            NotInitialized | AccountDataTooSmall | InsufficientEscrow | TransferFailed
            | PayeeAccountMissing | Overflow => ErrorKind::Substrate,
        }
    }
}

impl From<BountyError> for ProgramError {
    fn from(e: BountyError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for BountyError {
    fn type_of() -> &'static str {
        "BountyError"
    }
}
