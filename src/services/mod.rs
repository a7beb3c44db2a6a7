pub mod auth;
pub mod binder;
pub mod delivery;
pub mod merge;
pub mod mfa;
pub mod resolver;
pub mod roles;
pub mod verification;

pub use auth::{AuthService, RegistrationOutcome, SecondFactor};
pub use binder::AuthMethodBinder;
pub use delivery::{CodeDelivery, LogDelivery};
pub use merge::{IncomingProfile, MergeService};
pub use mfa::{MfaService, MfaSetup};
pub use resolver::IdentityResolver;
pub use roles::{RbacProvider, Role, RoleBridge};
pub use verification::VerificationService;
