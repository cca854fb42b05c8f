//! Database and sessions.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Database                    │
//! │   ┌──────────┐  ┌──────────┐  ┌───────────┐  │
//! │   │ Catalog  │  │ Tables   │  │Checkpoint │  │
//! │   │ (durable)│  │ (memory) │  │ Manager   │  │
//! │   └──────────┘  └──────────┘  └───────────┘  │
//! │          ▲            ▲                      │
//! │          └─────┬──────┘                      │
//! │             Session ── create / live_import  │
//! │                │        metadata / verify    │
//! │                ▼                             │
//! │              Cursor                          │
//! └──────────────────────────────────────────────┘
//! ```

mod engine;
mod session;

pub use engine::{Database, DatabaseStats};
pub use session::{Session, SessionId};
