mod modules;
pub use modules::*;
