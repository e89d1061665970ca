//! HAProxy configuration model.
//!
//! # Data Flow
//! ```text
//! zato.config (text, operator-authored + tagged lines)
//!     → parse.rs (text → Config)
//!     → Config (structured, what the agent understands)
//!     → mutate a clone (add/remove server, structured input from RPC)
//!     → serialize.rs (Config + last on-disk text → new text)
//! ```
//!
//! # Design Decisions
//! - Parsing reads the whole text; serialization only rewrites tagged lines
//!   and the managed server blocks, so operator-authored sections survive
//! - Structural problems (missing markers, misplaced tags) are errors, never
//!   silently dropped content

pub mod error;
pub mod model;
pub mod parse;
pub mod serialize;
pub mod tags;

pub use error::ModelError;
pub use model::{Backend, BindAddress, Config, Frontend, GlobalSection, LogTarget, ServerSpec};
pub use parse::parse;
pub use serialize::serialize;
