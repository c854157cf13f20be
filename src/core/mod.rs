//! Core library functions

pub mod camelot;
pub mod genre;
pub mod normalize;
