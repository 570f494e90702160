//! # huddle-proto
//!
//! The wire vocabulary spoken between huddle clients and the coordination
//! engine: a closed set of inbound commands, a closed set of outbound
//! events, and the shared types both sides agree on.
//!
//! Every frame is a single JSON text message with a `type` discriminator.
//! Inbound frames carry a `sessionId` next to the command fields; outbound
//! frames are self-contained.
//!
//! ```rust
//! use huddle_proto::{decode_command, ClientCommand};
//!
//! let frame = decode_command(r#"{"type":"chat","sessionId":"m1","content":"86 the soup"}"#)
//!     .expect("valid frame");
//! assert_eq!(frame.session_id, "m1");
//! assert!(matches!(frame.command, ClientCommand::Chat { .. }));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod command;
mod error;
mod event;
mod types;

pub use command::{decode_command, decode_hello, ClientCommand, ClientHello, CommandFrame};
pub use error::ProtocolError;
pub use event::{encode_event, ServerEvent};
pub use types::{
    CallerKind, EndReason, ParticipantInfo, QuestionInfo, Role, SessionSummary,
};
