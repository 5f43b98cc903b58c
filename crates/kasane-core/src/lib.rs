pub mod engine;
pub mod layers;
pub mod layout;
pub mod names;
pub mod parser;
pub mod persistence;
pub mod runtime;
pub mod tap_hold;
pub mod types;

pub use engine::{Diagnostics, Engine};
pub use layout::{ConfigError, Layout};
pub use tap_hold::{Profile, TimeoutPolicy};
pub use types::{Edge, KeyEvent, Keycode, LayerId, MatrixPos, Modifier, OutputEvent};
