//! State management module.
//!
//! Contains the session registry (shared engine state) and related
//! entities.

pub mod reconcile;
pub mod registry;
pub mod session;
pub mod sweeper;

pub use registry::{JoinOutcome, SessionRegistry};
pub use session::{
    ConnectionId, Identity, Participant, ParticipantPhase, Session, SessionId, VerifiedIdentity,
};
