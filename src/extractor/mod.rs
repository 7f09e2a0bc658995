// Extractor - walks the result sets of one batched command.
//
// - state: position bookkeeping and expected-shape checks shared by both forms
// - blocking: `Extractor` over a `ResultCursor`
// - nonblocking: `AsyncExtractor` over an `AsyncResultCursor`

mod blocking;
mod nonblocking;
mod state;

pub use blocking::Extractor;
pub use nonblocking::AsyncExtractor;
pub use state::{ExpectedShape, Position};
