#![forbid(unsafe_code)]

pub mod errors;
pub mod gen;
pub mod imports;
pub mod model;
pub mod util;
