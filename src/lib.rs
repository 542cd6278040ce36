pub mod access;
pub mod constants;
pub mod entrypoint;
pub mod error;
pub mod escrow;
pub mod events;
pub mod instruction;
pub mod ledger;
pub mod processor;
pub mod state;

pub use error::{BountyError, ErrorKind};
pub use escrow::{FeeSplit, MemoryVault, Vault};
pub use events::LedgerEvent;
pub use ledger::{Invocation, Ledger, LedgerConfig, NewBounty};

solana_program::declare_id!("4epubihz5iVnC7tFstb2xh5rQxcciDCX3KzACBt76kko");
