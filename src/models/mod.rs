/// Data models for the accounts service
pub mod account;
pub mod merge;
pub mod method;
pub mod verification;

pub use account::{Account, AuthBinding, MfaSettings};
pub use merge::{
    AccountMergeRequest, ConflictEntry, MergeConflicts, MergeResolution, MergeSide, MergeStatus,
};
pub use method::{AuthMethod, DeliveryChannel};
pub use verification::{CodePurpose, VerificationCode};
