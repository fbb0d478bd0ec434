//! Identity, credentials and sessions.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod tokens;
mod issuer;
mod authorizer;
mod activation;
mod accounts;

pub use principal::{Identity, Role, UserPatch, UserRecord};
pub use session::{session_key, Session, SessionManager};
pub use tokens::{ActivationClaims, Claims, SignedToken, TokenError, TokenSigner, TokenType};
pub use issuer::{TokenIssuer, TokenPair};
pub use authorizer::require_role;
pub use activation::{ActivationTicket, ActivationWorkflow, PendingActivation, PendingPayload, Purpose};
pub use accounts::{AccountService, LoginOutcome};
