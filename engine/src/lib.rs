pub mod deferral;
pub mod error;
pub mod flush;
pub mod history;
pub mod judge;
pub mod progress;
pub mod push;
pub mod queue;
pub mod scaffold;
pub mod toolchain;
pub mod workflow;

pub use error::{Error, Result};
