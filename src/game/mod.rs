//! Game Logic Module
//!
//! Request execution and response replay. Execution is the only code that
//! mutates the authoritative world; replay mirrors its results remotely.
//!
//! ## Module Structure
//!
//! - `execute`: Request dispatch, execution context, per-request errors
//! - `movement`: Steps, and their redirection into attacks or opens
//! - `combat`: Melee and range attack resolution
//! - `toggle`: Open and close
//! - `perception`: View box queries
//! - `replay`: Applying responses to a local world copy

pub mod execute;
pub mod movement;
pub mod combat;
pub mod toggle;
pub mod perception;
pub mod replay;

// Re-export key types
pub use execute::{execute, ExecContext, ExecuteError, DEFAULT_ACTION_COOLDOWN_SECS};
pub use combat::AttackKind;
pub use perception::ViewBox;
pub use replay::ReplayError;
