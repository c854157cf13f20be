//! Configuration: filesystem paths for process-owned state, and the
//! library/server settings loaded from the JSON config file (§6).

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{
    BlissCfg, EssentiaCfg, LogFormat, MuslyCfg, NormalizeCfg, PathsCfg, Settings, SimAlgo,
    StyleTracksMethod,
};
