//! Handler module - session state and request dispatch.
//!
//! Provides:
//! - [`Session`] - owns the descriptor table and routes each request
//! - [`SessionState`] - the hello handshake state machine
//!
//! # Example
//!
//! ```ignore
//! use nhacp_server::handler::Session;
//!
//! let mut session = Session::new(&config);
//! if let Some(response) = session.handle_frame(&frame).await {
//!     writer.send(&response).await?;
//! }
//! ```

mod session;

pub use session::{Session, SessionState};
