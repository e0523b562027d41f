pub mod errors;
pub mod model;
pub mod options;
pub mod space;

pub use errors::*;
pub use model::*;
pub use options::*;
pub use space::*;
