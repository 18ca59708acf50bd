// Re-export all model types
pub use self::cart::*;
pub use self::context::*;
pub use self::errors::*;

mod cart;
mod context;
mod errors;
