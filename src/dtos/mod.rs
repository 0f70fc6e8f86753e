//! Request and outcome types at the engine boundary.

pub mod auth;

pub use auth::{
    mask_email, AuthenticatedSession, EnrollmentStart, LoginOutcome, LoginRequest,
    RegisterReceipt, RegisterRequest, SecondFactorChallenge,
};
