//! Transition systems for shift-reduce dependency parsing: arc-standard,
//! arc-eager, arc-hybrid and swap, each with a static oracle that derives a
//! canonical action sequence from a reference tree and a dynamic oracle that
//! scores every action from an arbitrary configuration.
//!
//! ```
//! use shiftreduce::{notation, replay, Alphabet, SystemConfig, SystemKind, TransitionSystem};
//!
//! let mut deprels: Alphabet = ["root"].iter().collect();
//! let tree = notation::parse_tree("2:det 3:nsubj 0:root 3:obj", &mut deprels).unwrap();
//!
//! let system = SystemConfig::new(SystemKind::ArcEager).build(&deprels).unwrap();
//! let actions = system.get_oracle_actions(&tree);
//! assert_eq!(actions.len(), 2 * tree.len() - 1);
//!
//! let state = replay(system.as_ref(), tree.len(), &actions);
//! assert_eq!(state.heads, tree.heads);
//! ```

#[macro_use]
extern crate lazy_static;

pub mod alphabet;
pub mod notation;
pub mod reference;
pub mod state;
pub mod system;
pub mod utils;


pub use crate::alphabet::Alphabet;
pub use crate::reference::Reference;
pub use crate::state::State;
pub use crate::system::{
  replay, Action, ActionKind, ArcEager, ArcHybrid, ArcStandard, Swap, SwapOracle, SystemConfig,
  SystemKind, TransitionSystem,
};
pub use crate::utils::Err;
