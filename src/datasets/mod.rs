mod currency;

pub use crate::datasets::currency::*;
