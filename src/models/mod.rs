mod deploy;
mod devices;
mod rows;

pub use deploy::*;
pub use devices::*;
pub use rows::*;
