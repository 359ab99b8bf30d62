//! Call scopes and query tracing.

mod arg;
mod event;
mod scope;

pub use arg::{to_arguments, SqlArg};
pub use event::{EventRecorder, QueryEvent};
pub use scope::CallScope;
