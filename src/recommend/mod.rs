//! The recommendation pipeline (§4.6/§4.7): request-option parsing, the
//! `similar`/`dump`/`attrmix` algorithms, and the small helpers they share
//! (seed-path codec, album-key derivation, attribute soft filtering).

pub mod album_key;
pub mod attrib_filter;
pub mod attrmix;
pub mod dump;
pub mod options;
pub mod path_codec;
pub mod similar;
