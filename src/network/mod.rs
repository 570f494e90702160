//! Network layer: WebSocket gateway, per-connection tasks, flood
//! protection, and the identity-verification seam.

mod connection;
mod gateway;
mod limit;

pub use connection::Connection;
pub use gateway::Gateway;
pub use limit::RateLimiter;

use huddle_proto::ClientHello;

use crate::state::session::VerifiedIdentity;

/// Seam to the external identity service.
///
/// The platform's session layer authenticates clients upstream and the
/// engine trusts the tuple it is handed for the lifetime of the
/// connection. Deployments that carry a credential in the `hello` frame
/// can plug a real verifier in here.
pub trait IdentityVerifier: Send + Sync {
    /// Validate a `hello` frame into a verified identity, or reject the
    /// connection.
    fn verify(&self, hello: &ClientHello) -> Option<VerifiedIdentity>;
}

/// Verifier that accepts the `hello` tuple as-is.
pub struct TrustedIdentity;

impl IdentityVerifier for TrustedIdentity {
    fn verify(&self, hello: &ClientHello) -> Option<VerifiedIdentity> {
        Some(VerifiedIdentity {
            identity: hello.identity.clone(),
            display_name: hello.display_name.clone(),
            kind: hello.kind,
        })
    }
}
