//! Mode-string grammar driven by the server's ISUPPORT.
//!
//! Mode letters carry no fixed meaning here: whether a letter consumes an
//! argument is decided by PREFIX and CHANMODES as advertised by the server
//! (see [`Isupport::mode_class`](crate::isupport::Isupport::mode_class)).

mod parse;
mod types;

pub use self::parse::{format_mode_changes, parse_mode_params, parse_mode_params_strict};
pub use self::types::{ModeChange, ModeClass, ModeSet, Sign};
