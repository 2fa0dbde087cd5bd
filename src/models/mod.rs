pub mod bill;
pub mod enums;
pub mod filters;
pub mod inventory;
pub mod pharmacy;

pub use bill::*;
pub use enums::*;
pub use filters::*;
pub use inventory::*;
pub use pharmacy::*;
