pub mod armor;
pub mod constants;
pub mod error;
pub mod message;
pub mod types;

pub use constants::*;
pub use error::NotaryError;
pub use message::{Command, Message, MessageBody, Payload};
pub use types::*;
