use tracing::trace;

use super::{run_oracle, Action, ActionKind, ActionTable, TransitionSystem};
use crate::alphabet::Alphabet;
use crate::reference::{Reference, UNDEF_HEAD};
use crate::state::State;
use crate::Err;

/// Arc-eager: LEFT attaches s0 to b0 and pops it, RIGHT attaches b0 to s0
/// and pushes it, REDUCE pops a stack token that already has its head.
///
/// Ids: `0 = SHIFT`, `1 = REDUCE`, `2l + 2 = LEFT-l`, `2l + 3 = RIGHT-l`.
#[derive(Debug, Clone)]
pub struct ArcEager {
  table: ActionTable,
}

impl ArcEager {
  pub fn new(deprels: &Alphabet, root_label: &str) -> Result<Self, Err> {
    Ok(Self {
      table: ActionTable::new("arceager", &["SHIFT", "REDUCE"], deprels, root_label)?,
    })
  }

  pub fn is_shift(&self, action: Action) -> bool {
    action == 0
  }

  pub fn is_reduce(&self, action: Action) -> bool {
    action == 1
  }

  pub fn is_left(&self, action: Action) -> bool {
    self.table.is_left(action)
  }

  pub fn is_right(&self, action: Action) -> bool {
    self.table.is_right(action)
  }

  pub fn shift_id(&self) -> Action {
    0
  }

  pub fn reduce_id(&self) -> Action {
    1
  }

  pub fn left_id(&self, deprel: usize) -> Action {
    self.table.left_id(deprel)
  }

  pub fn right_id(&self, deprel: usize) -> Action {
    self.table.right_id(deprel)
  }

  pub fn parse_label(&self, action: Action) -> usize {
    self.table.parse_label(action)
  }

  fn headless_on_stack(state: &State) -> usize {
    state
      .stack_tokens()
      .iter()
      .filter(|&&t| !state.has_head(t))
      .count()
  }

  fn shift_unsafe(&self, state: &mut State) {
    let b = state.pop_buffer();
    state.stack.push(b);
  }

  fn left_unsafe(&self, state: &mut State, deprel: usize) {
    let head = state.buffer_front();
    let modifier = state.pop_stack();
    state.attach(modifier, head, deprel);
  }

  fn right_unsafe(&self, state: &mut State, deprel: usize) {
    let head = state.stack_top();
    let modifier = state.pop_buffer();
    state.attach(modifier, head, deprel);
    state.stack.push(modifier);
  }

  fn reduce_unsafe(&self, state: &mut State) {
    state.pop_stack();
  }

  /// b0 can no longer take a head from the stack nor collect headless
  /// dependents sitting on it
  fn shift_dynamic_loss_unsafe(&self, state: &mut State, reference: &Reference) -> f32 {
    let b = state.buffer_front();
    let mut c = 0;
    for &k in state.stack_tokens() {
      if reference.head(b) == k {
        c += 1;
      }
      if reference.head(k) == b && !state.has_head(k) {
        c += 1;
      }
    }
    self.shift_unsafe(state);
    c as f32
  }

  fn left_dynamic_loss_unsafe(&self, state: &mut State, deprel: usize, reference: &Reference) -> f32 {
    let s0 = state.stack_top();
    let b = state.buffer_front();
    let buffered = state.buffer_tokens();
    let beyond_front = &buffered[..buffered.len().saturating_sub(1)];

    let mut c = beyond_front.iter().filter(|&&k| reference.head(s0) == k).count();
    c += buffered.iter().filter(|&&k| reference.head(k) == s0).count();
    if reference.head(s0) == b && reference.deprel(s0) != deprel {
      c += 1;
    }

    self.left_unsafe(state, deprel);
    c as f32
  }

  fn right_dynamic_loss_unsafe(&self, state: &mut State, deprel: usize, reference: &Reference) -> f32 {
    let s0 = state.stack_top();
    let b = state.buffer_front();
    let stacked = state.stack_tokens();
    let below_top = &stacked[..stacked.len().saturating_sub(1)];
    let buffered = state.buffer_tokens();
    let beyond_front = &buffered[..buffered.len().saturating_sub(1)];

    let mut c = below_top
      .iter()
      .chain(beyond_front.iter())
      .filter(|&&k| reference.head(b) == k)
      .count();
    c += stacked
      .iter()
      .filter(|&&k| reference.head(k) == b && !state.has_head(k))
      .count();
    if reference.head(b) == s0 && reference.deprel(b) != deprel {
      c += 1;
    }

    self.right_unsafe(state, deprel);
    c as f32
  }

  /// s0 can no longer collect the dependents still waiting in the buffer
  fn reduce_dynamic_loss_unsafe(&self, state: &mut State, reference: &Reference) -> f32 {
    let s0 = state.stack_top();
    let c = state
      .buffer_tokens()
      .iter()
      .filter(|&&k| reference.head(k) == s0)
      .count();
    self.reduce_unsafe(state);
    c as f32
  }

  fn oracle_onestep(&self, state: &State, reference: &Reference, children: &[Vec<usize>]) -> Action {
    if state.stack_depth() >= 1 {
      let s0 = state.stack_top();
      let b = state.buffer_front();
      if reference.head(s0) == b {
        return self.left_id(reference.deprel(s0));
      }
      if reference.head(b) == s0 {
        return self.right_id(reference.deprel(b));
      }
      if state.has_head(s0) && children[s0].iter().all(|&c| state.has_head(c)) {
        return self.reduce_id();
      }
    }
    self.shift_id()
  }
}

impl TransitionSystem for ArcEager {
  fn system_name(&self) -> &'static str {
    "arceager"
  }

  fn num_actions(&self) -> usize {
    self.table.len()
  }

  fn num_deprels(&self) -> usize {
    self.table.num_deprels()
  }

  fn action_name(&self, action: Action) -> &str {
    self.table.name(action)
  }

  fn split(&self, action: Action) -> (ActionKind, Option<usize>) {
    if self.is_shift(action) {
      (ActionKind::Shift, None)
    } else if self.is_reduce(action) {
      (ActionKind::Reduce, None)
    } else if self.is_left(action) {
      (ActionKind::Left, Some(self.parse_label(action)))
    } else {
      (ActionKind::Right, Some(self.parse_label(action)))
    }
  }

  /// The root is b0 once `buffer.len() == 2` and the last word once it is 3.
  /// Exactly one headless token may remain on the stack when the root comes
  /// up, which is the token LEFT attaches to it.
  fn is_valid_action(&self, state: &State, action: Action) -> bool {
    if action >= self.num_actions() {
      return false;
    }
    if self.is_shift(action) {
      match state.buffer.len() {
        1 => false,
        2 => state.stack.len() == 1,
        3 => Self::headless_on_stack(state) == 0,
        _ => true,
      }
    } else if self.is_reduce(action) {
      state.stack.len() >= 2 && state.has_head(state.stack_top())
    } else if self.is_left(action) {
      if state.stack.len() < 2 || state.buffer.len() < 2 || state.has_head(state.stack_top()) {
        return false;
      }
      if state.buffer.len() == 2 {
        action == self.table.left_root
      } else {
        action != self.table.left_root
      }
    } else {
      if state.stack.len() < 2 || state.buffer.len() < 3 || action == self.table.right_root {
        return false;
      }
      state.buffer.len() > 3 || Self::headless_on_stack(state) <= 1
    }
  }

  fn perform_action(&self, state: &mut State, action: Action) {
    if self.is_shift(action) {
      self.shift_unsafe(state);
    } else if self.is_reduce(action) {
      self.reduce_unsafe(state);
    } else if self.is_left(action) {
      self.left_unsafe(state, self.parse_label(action));
    } else {
      self.right_unsafe(state, self.parse_label(action));
    }
  }

  fn get_oracle_actions(&self, reference: &Reference) -> Vec<Action> {
    assert!(reference.is_tree(), "arceager: reference is not a tree");
    let children = reference.children();
    run_oracle(self, reference.len(), |state| {
      self.oracle_onestep(state, reference, &children)
    })
  }

  fn get_transition_costs(
    &self,
    state: &State,
    actions: &[Action],
    reference: &Reference,
  ) -> Vec<f32> {
    let mut wrong_left = None;
    let mut wrong_right = None;
    let mut costs = Vec::with_capacity(actions.len());

    for &action in actions {
      let mut next = state.clone();
      let cost = if self.is_shift(action) {
        -self.shift_dynamic_loss_unsafe(&mut next, reference)
      } else if self.is_reduce(action) {
        -self.reduce_dynamic_loss_unsafe(&mut next, reference)
      } else if self.is_left(action) {
        let deprel = self.parse_label(action);
        let (head, modifier) = (state.buffer_front(), state.stack_top());
        if reference.head(modifier) == UNDEF_HEAD
          || (reference.head(modifier) == head && reference.deprel(modifier) == deprel)
        {
          -self.left_dynamic_loss_unsafe(&mut next, deprel, reference)
        } else {
          *wrong_left.get_or_insert_with(|| -self.left_dynamic_loss_unsafe(&mut next, deprel, reference))
        }
      } else {
        let deprel = self.parse_label(action);
        let (head, modifier) = (state.stack_top(), state.buffer_front());
        if reference.head(modifier) == UNDEF_HEAD
          || (reference.head(modifier) == head && reference.deprel(modifier) == deprel)
        {
          -self.right_dynamic_loss_unsafe(&mut next, deprel, reference)
        } else {
          *wrong_right.get_or_insert_with(|| -self.right_dynamic_loss_unsafe(&mut next, deprel, reference))
        }
      };
      costs.push(cost);
    }

    trace!(state = %state, ?costs, "arceager costs");
    costs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::system::replay;

  fn labels() -> Alphabet {
    ["root", "dep"].iter().collect()
  }

  fn system() -> ArcEager {
    ArcEager::new(&labels(), "root").unwrap()
  }

  #[test]
  fn test_action_ids() {
    let s = system();
    assert_eq!(s.num_actions(), 6);
    assert_eq!(s.action_name(1), "REDUCE");
    assert_eq!(s.left_id(1), 4);
    assert_eq!(s.right_id(1), 5);
    assert_eq!(s.split(1), (ActionKind::Reduce, None));
    assert_eq!(s.split(5), (ActionKind::Right, Some(1)));
  }

  #[test]
  fn test_oracle_sequence() {
    let s = system();
    // "A B C": A <- B, B <- root, C <- B
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    let actions = s.get_oracle_actions(&r);
    let names = actions.iter().map(|&a| s.action_name(a)).collect::<Vec<_>>();
    assert_eq!(
      names,
      ["SHIFT", "LEFT-dep", "SHIFT", "RIGHT-dep", "REDUCE", "LEFT-root", "SHIFT"]
    );

    let state = replay(&s, r.len(), &actions);
    assert!(state.terminated());
    assert_eq!(state.heads, r.heads);
  }

  #[test]
  fn test_one_headless_token_meets_the_root() {
    let s = system();
    let mut state = State::new(3);
    s.perform_action(&mut state, s.shift_id());
    // B is the last word and A is still headless
    assert!(!s.is_valid_action(&state, s.shift_id()));
    assert!(s.is_valid_action(&state, s.right_id(1)));
    assert!(s.is_valid_action(&state, s.left_id(1)));
    assert!(!s.is_valid_action(&state, s.reduce_id()));

    s.perform_action(&mut state, s.right_id(1));
    // the root is next: reduce B, then A takes the root arc
    assert_eq!(s.get_valid_actions(&state), vec![s.reduce_id()]);
    s.perform_action(&mut state, s.reduce_id());
    assert_eq!(s.get_valid_actions(&state), vec![s.left_id(0)]);
  }

  #[test]
  fn test_costs() {
    let s = system();
    // "A B C": A <- B, B <- root, C <- B
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    let mut state = State::new(4);
    s.perform_action(&mut state, s.shift_id());

    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![0, 4, 5]);
    // SHIFT loses A <- B, RIGHT A -> B loses A <- B and B <- root
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![-1.0, 0.0, -2.0]);

    s.perform_action(&mut state, s.left_id(1));
    s.perform_action(&mut state, s.shift_id());
    let valid = s.get_valid_actions(&state);
    // shifting the last word would leave two headless tokens
    assert_eq!(valid, vec![4, 5]);
    // LEFT B <- C loses B <- root and C <- B
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![-2.0, 0.0]);
  }
}
