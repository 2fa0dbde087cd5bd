pub mod extract;
pub mod ollama;
pub mod processor;
pub mod recognize;
pub mod reconcile;
pub mod store;
pub mod verify;

pub use extract::*;
pub use ollama::*;
pub use processor::*;
pub use recognize::*;
pub use reconcile::*;
pub use store::*;
pub use verify::*;
