//! Built-in handlers.

mod counter;
mod echo;

pub use counter::CountingHandler;
pub use echo::EchoService;
