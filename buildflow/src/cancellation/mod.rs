//! Run cancellation.

mod token;

pub use token::CancellationToken;
