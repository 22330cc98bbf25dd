//! Core type definitions for DataChat

pub mod run;
pub mod session;
pub mod transcript;

// Re-export commonly used types
pub use run::*;
pub use session::*;
pub use transcript::*;
