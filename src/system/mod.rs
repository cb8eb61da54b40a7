//! Transition systems: the action space, legality, application and the
//! static/dynamic oracles of each parsing strategy.

mod arceager;
mod archybrid;
mod arcstd;
mod swap;

pub use arceager::ArcEager;
pub use archybrid::ArcHybrid;
pub use arcstd::ArcStandard;
pub use swap::{Swap, SwapOracle};

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::alphabet::Alphabet;
use crate::reference::Reference;
use crate::state::State;
use crate::Err;

/// Dense action id, only meaningful for the system instance that produced it
pub type Action = usize;

/// The structural part of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
  Shift,
  Left,
  Right,
  Reduce,
  Swap,
}

/// The operations a decoder or trainer needs from a transition system.
///
/// Implementations hold only tables derived at construction, so one instance
/// can be shared by any number of concurrent parses.
pub trait TransitionSystem: Send + Sync {
  /// "arcstd", "arceager", "archybrid" or "swap"
  fn system_name(&self) -> &'static str;

  fn num_actions(&self) -> usize;

  fn num_deprels(&self) -> usize;

  /// Panics if `action` is out of range
  fn action_name(&self, action: Action) -> &str;

  /// Splits an action into its structure and label (None for unlabelled
  /// actions)
  fn split(&self, action: Action) -> (ActionKind, Option<usize>);

  /// Whether `action` may be applied to `state`. No side effects.
  fn is_valid_action(&self, state: &State, action: Action) -> bool;

  /// Every valid action for `state`, in ascending id order. Panics if there
  /// is none: a non-terminal configuration always admits a move.
  fn get_valid_actions(&self, state: &State) -> Vec<Action> {
    let valid = (0..self.num_actions())
      .filter(|&a| self.is_valid_action(state, a))
      .collect::<Vec<_>>();
    assert!(
      !valid.is_empty(),
      "{}: no valid action in {}",
      self.system_name(),
      state
    );
    valid
  }

  /// Applies `action`. The caller must have established that it is valid.
  fn perform_action(&self, state: &mut State, action: Action);

  /// The canonical action sequence that rebuilds `reference` from the
  /// initial configuration.
  fn get_oracle_actions(&self, reference: &Reference) -> Vec<Action>;

  /// The negated dynamic-oracle cost of each of `actions` taken from
  /// `state`, in input order. Zero is best.
  fn get_transition_costs(
    &self,
    state: &State,
    actions: &[Action],
    reference: &Reference,
  ) -> Vec<f32>;
}

/// Names and id arithmetic shared by the four systems.
///
/// Unlabelled actions take the first ids in the order given at construction,
/// followed by `LEFT-l`, `RIGHT-l` pairs for every label `l` of the alphabet.
#[derive(Debug, Clone)]
pub(crate) struct ActionTable {
  names: Vec<String>,
  n_unlabelled: usize,
  n_deprels: usize,
  pub root: usize,
  pub left_root: Action,
  pub right_root: Action,
}

impl ActionTable {
  pub fn new(
    system: &str,
    unlabelled: &[&str],
    deprels: &Alphabet,
    root_label: &str,
  ) -> Result<Self, Err> {
    let root = deprels
      .get(root_label)
      .ok_or_else(|| format!("{}: root label {:?} is not in the alphabet", system, root_label))?;

    let mut names = unlabelled.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    for (_, label) in deprels.iter() {
      names.push(format!("LEFT-{}", label));
      names.push(format!("RIGHT-{}", label));
    }

    let table = Self {
      names,
      n_unlabelled: unlabelled.len(),
      n_deprels: deprels.len(),
      root,
      left_root: unlabelled.len() + 2 * root,
      right_root: unlabelled.len() + 2 * root + 1,
    };

    debug!(system, num_actions = table.len(), "action table built");
    for name in table.names.iter() {
      debug!("- {}", name);
    }

    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn num_deprels(&self) -> usize {
    self.n_deprels
  }

  pub fn name(&self, action: Action) -> &str {
    assert!(action < self.names.len(), "action id {} in illegal range", action);
    &self.names[action]
  }

  pub fn left_id(&self, deprel: usize) -> Action {
    self.n_unlabelled + 2 * deprel
  }

  pub fn right_id(&self, deprel: usize) -> Action {
    self.n_unlabelled + 2 * deprel + 1
  }

  pub fn is_left(&self, action: Action) -> bool {
    action >= self.n_unlabelled && (action - self.n_unlabelled) % 2 == 0
  }

  pub fn is_right(&self, action: Action) -> bool {
    action >= self.n_unlabelled && (action - self.n_unlabelled) % 2 == 1
  }

  pub fn parse_label(&self, action: Action) -> usize {
    assert!(
      action >= self.n_unlabelled,
      "{} does not carry a label",
      self.name(action)
    );
    (action - self.n_unlabelled) / 2
  }
}

/// Runs a one-step oracle from the initial configuration until termination,
/// checking every proposed action against the system's legality rules.
pub(crate) fn run_oracle<F>(system: &dyn TransitionSystem, len: usize, mut next: F) -> Vec<Action>
where
  F: FnMut(&State) -> Action,
{
  let mut state = State::new(len);
  let mut actions = Vec::with_capacity(2 * len);
  while !state.terminated() {
    let action = next(&state);
    assert!(
      system.is_valid_action(&state, action),
      "{}: oracle proposed invalid action {} in {}",
      system.system_name(),
      system.action_name(action),
      state
    );
    system.perform_action(&mut state, action);
    actions.push(action);
  }
  debug!(system = system.system_name(), len, steps = actions.len(), "oracle sequence");
  actions
}

/// Applies `actions` to the initial configuration of a `len`-token sentence.
/// Panics on the first invalid action.
pub fn replay(system: &dyn TransitionSystem, len: usize, actions: &[Action]) -> State {
  let mut state = State::new(len);
  for &action in actions {
    assert!(
      system.is_valid_action(&state, action),
      "{}: invalid action {} in {}",
      system.system_name(),
      system.action_name(action),
      state
    );
    system.perform_action(&mut state, action);
  }
  state
}

/// The available transition systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
  ArcStandard,
  ArcEager,
  ArcHybrid,
  Swap,
}

impl SystemKind {
  pub const ALL: [SystemKind; 4] = [
    SystemKind::ArcStandard,
    SystemKind::ArcEager,
    SystemKind::ArcHybrid,
    SystemKind::Swap,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Self::ArcStandard => "arcstd",
      Self::ArcEager => "arceager",
      Self::ArcHybrid => "archybrid",
      Self::Swap => "swap",
    }
  }

  /// Whether the system's static oracle handles non-projective trees
  pub fn handles_non_projective(&self) -> bool {
    matches!(self, Self::Swap)
  }
}

impl fmt::Display for SystemKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for SystemKind {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .iter()
      .copied()
      .find(|k| k.name() == s)
      .ok_or_else(|| format!("unknown transition system: {}", s).into())
  }
}

/// Everything needed to build a transition system besides the label alphabet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
  pub kind: SystemKind,
  pub root_label: String,
  pub swap_oracle: SwapOracle,
}

impl Default for SystemConfig {
  fn default() -> Self {
    Self {
      kind: SystemKind::ArcStandard,
      root_label: "root".to_string(),
      swap_oracle: SwapOracle::Lazy,
    }
  }
}

impl SystemConfig {
  pub fn new(kind: SystemKind) -> Self {
    Self {
      kind,
      ..Self::default()
    }
  }

  pub fn build(&self, deprels: &Alphabet) -> Result<Box<dyn TransitionSystem>, Err> {
    let system: Box<dyn TransitionSystem> = match self.kind {
      SystemKind::ArcStandard => Box::new(ArcStandard::new(deprels, &self.root_label)?),
      SystemKind::ArcEager => Box::new(ArcEager::new(deprels, &self.root_label)?),
      SystemKind::ArcHybrid => Box::new(ArcHybrid::new(deprels, &self.root_label)?),
      SystemKind::Swap => Box::new(Swap::with_oracle(
        deprels,
        &self.root_label,
        self.swap_oracle,
      )?),
    };
    Ok(system)
  }
}
