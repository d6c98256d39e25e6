pub mod definition;
pub mod options;
pub mod state;

pub use definition::*;
pub use options::*;
pub use state::*;
