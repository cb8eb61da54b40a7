use tracing::{debug, trace};

use super::{Action, ActionKind, ActionTable, TransitionSystem};
use crate::alphabet::Alphabet;
use crate::reference::{Reference, BAD_HEAD, UNDEF_HEAD};
use crate::state::State;
use crate::Err;

/// Arc-hybrid: LEFT attaches s0 to b0, RIGHT attaches s0 to s1. Both only
/// pop the stack.
///
/// Ids: `0 = SHIFT`, `2l + 1 = LEFT-l`, `2l + 2 = RIGHT-l`.
#[derive(Debug, Clone)]
pub struct ArcHybrid {
  table: ActionTable,
}

impl ArcHybrid {
  pub fn new(deprels: &Alphabet, root_label: &str) -> Result<Self, Err> {
    Ok(Self {
      table: ActionTable::new("archybrid", &["SHIFT"], deprels, root_label)?,
    })
  }

  pub fn is_shift(&self, action: Action) -> bool {
    action == 0
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

  pub fn left_id(&self, deprel: usize) -> Action {
    self.table.left_id(deprel)
  }

  pub fn right_id(&self, deprel: usize) -> Action {
    self.table.right_id(deprel)
  }

  pub fn parse_label(&self, action: Action) -> usize {
    self.table.parse_label(action)
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
    let modifier = state.pop_stack();
    let head = state.stack_top();
    state.attach(modifier, head, deprel);
  }

  /// Arcs lost by pushing b0: its heads among s1 and below (s0 may still
  /// take it through RIGHT) and its dependents anywhere on the stack.
  fn shift_dynamic_loss_unsafe(&self, state: &mut State, reference: &Reference) -> f32 {
    let b = state.buffer_front();
    let stacked = state.stack_tokens();
    let below_top = &stacked[..stacked.len().saturating_sub(1)];

    let mut c = below_top.iter().filter(|&&h| reference.head(b) == h).count();
    c += stacked.iter().filter(|&&d| reference.head(d) == b).count();

    self.shift_unsafe(state);
    c as f32
  }

  /// Arcs lost by popping s0 under b0: its heads in s1 or the rest of the
  /// buffer, its dependents in the buffer, and a wrong label on a right head.
  fn left_dynamic_loss_unsafe(&self, state: &mut State, deprel: usize, reference: &Reference) -> f32 {
    let s0 = state.stack_top();
    let b = state.buffer_front();
    let buffered = state.buffer_tokens();
    let beyond_front = &buffered[..buffered.len().saturating_sub(1)];

    let mut c = beyond_front.iter().filter(|&&h| reference.head(s0) == h).count();
    if state.stack_depth() > 1 && reference.head(s0) == state.stack_second() {
      c += 1;
    }
    c += buffered.iter().filter(|&&d| reference.head(d) == s0).count();
    if reference.head(s0) == b && reference.deprel(s0) != deprel {
      c += 1;
    }

    self.left_unsafe(state, deprel);
    c as f32
  }

  /// Arcs lost by popping s0 under s1: anything connecting it to the buffer,
  /// and a wrong label on a right head.
  fn right_dynamic_loss_unsafe(&self, state: &mut State, deprel: usize, reference: &Reference) -> f32 {
    let s0 = state.stack_top();
    let s1 = state.stack_second();

    let mut c = 0;
    for &k in state.buffer_tokens() {
      if reference.head(s0) == k {
        c += 1;
      }
      if reference.head(k) == s0 {
        c += 1;
      }
    }
    if reference.head(s0) == s1 && reference.deprel(s0) != deprel {
      c += 1;
    }

    self.right_unsafe(state, deprel);
    c as f32
  }

  /// One step of the static oracle over a simulated stack (`sigma`) and
  /// buffer position (`beta`). `output[i]` records the head already given to
  /// token `i`.
  fn oracle_onestep(
    &self,
    reference: &Reference,
    sigma: &mut Vec<usize>,
    beta: &mut usize,
    output: &mut [usize],
  ) -> Action {
    let len = reference.len();
    let b = if *beta < len { *beta } else { BAD_HEAD };
    let top0 = sigma.last().copied().unwrap_or(BAD_HEAD);
    let top1 = if sigma.len() > 1 {
      sigma[sigma.len() - 2]
    } else {
      BAD_HEAD
    };

    let all_descendents_reduced = top0 == BAD_HEAD
      || (0..len).all(|i| reference.head(i) != top0 || output[i] == top0);

    if top0 != BAD_HEAD && b != BAD_HEAD && reference.head(top0) == b {
      output[top0] = b;
      sigma.pop();
      self.left_id(reference.deprel(top0))
    } else if top1 != BAD_HEAD && reference.head(top0) == top1 && all_descendents_reduced {
      output[top0] = top1;
      sigma.pop();
      self.right_id(reference.deprel(top0))
    } else {
      assert!(*beta < len, "should be more than one element in buffer");
      sigma.push(*beta);
      *beta += 1;
      self.shift_id()
    }
  }
}

impl TransitionSystem for ArcHybrid {
  fn system_name(&self) -> &'static str {
    "archybrid"
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
    } else if self.is_left(action) {
      (ActionKind::Left, Some(self.parse_label(action)))
    } else {
      (ActionKind::Right, Some(self.parse_label(action)))
    }
  }

  fn is_valid_action(&self, state: &State, action: Action) -> bool {
    if action >= self.num_actions() {
      return false;
    }
    if self.is_shift(action) {
      // the root may only be shifted onto an empty stack
      if state.buffer.len() == 1 || (state.buffer.len() == 2 && state.stack.len() > 1) {
        return false;
      }
    } else if self.is_left(action) {
      if state.stack.len() < 2 || state.buffer.len() < 2 {
        return false;
      }
      if state.buffer.len() == 2 {
        if state.stack.len() > 2 || action != self.table.left_root {
          return false;
        }
      } else if action == self.table.left_root {
        return false;
      }
    } else {
      if state.stack.len() < 3 {
        return false;
      }
      if action == self.table.right_root {
        return false;
      }
    }
    true
  }

  fn perform_action(&self, state: &mut State, action: Action) {
    if self.is_shift(action) {
      self.shift_unsafe(state);
    } else if self.is_left(action) {
      self.left_unsafe(state, self.parse_label(action));
    } else {
      self.right_unsafe(state, self.parse_label(action));
    }
  }

  fn get_oracle_actions(&self, reference: &Reference) -> Vec<Action> {
    assert!(reference.is_tree(), "archybrid: reference is not a tree");
    let len = reference.len();
    let mut sigma = Vec::with_capacity(len);
    let mut beta = 0;
    let mut output = vec![BAD_HEAD; len];

    let mut actions = Vec::with_capacity(2 * len);
    while !(sigma.len() == 1 && beta == len) {
      actions.push(self.oracle_onestep(reference, &mut sigma, &mut beta, &mut output));
    }
    debug!(system = "archybrid", len, steps = actions.len(), "oracle sequence");
    actions
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
        let (head, modifier) = (state.stack_second(), state.stack_top());
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

    trace!(state = %state, ?costs, "archybrid costs");
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

  // "A B C": A <- B, B <- root, C <- B
  fn small_tree() -> Reference {
    Reference::from_conll(&[2, 0, 2], &[1, 0, 1])
  }

  #[test]
  fn test_action_ids() {
    let s = ArcHybrid::new(&labels(), "root").unwrap();
    assert_eq!(s.num_actions(), 5);
    assert_eq!(s.action_name(s.left_id(1)), "LEFT-dep");
    assert_eq!(s.left_id(1), 3);
    assert_eq!(s.right_id(1), 4);
    assert_eq!(s.parse_label(4), 1);
  }

  #[test]
  fn test_oracle_sequence() {
    let s = ArcHybrid::new(&labels(), "root").unwrap();
    let actions = s.get_oracle_actions(&small_tree());
    // SHIFT A, LEFT A<-B, SHIFT B, SHIFT C, RIGHT B->C, LEFT B<-root, SHIFT root
    assert_eq!(actions, vec![0, 3, 0, 0, 4, 1, 0]);

    let state = replay(&s, 4, &actions);
    assert!(state.terminated());
    assert_eq!(state.heads[..3], small_tree().heads[..3]);
  }

  #[test]
  fn test_root_only_at_buffer_end() {
    let s = ArcHybrid::new(&labels(), "root").unwrap();
    let mut state = State::new(3);
    s.perform_action(&mut state, 0);
    assert!(!s.is_valid_action(&state, s.table.left_root));
    assert!(s.is_valid_action(&state, s.left_id(1)));
    // RIGHT needs two stacked tokens
    assert!(!s.is_valid_action(&state, s.right_id(1)));

    s.perform_action(&mut state, 0);
    // root is next in the buffer, only RIGHT remains
    assert!(!s.is_valid_action(&state, 0));
    assert_eq!(s.get_valid_actions(&state), vec![s.right_id(1)]);
  }

  #[test]
  fn test_costs_on_diverged_state() {
    let s = ArcHybrid::new(&labels(), "root").unwrap();
    let r = small_tree();
    let mut state = State::new(4);
    // SHIFT A, SHIFT B: A should have been attached to B by LEFT already
    s.perform_action(&mut state, 0);
    s.perform_action(&mut state, 0);
    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![0, 3, 4]);
    let costs = s.get_transition_costs(&state, &valid, &r);
    // A <- B is already lost. SHIFT C keeps B -> C reachable, LEFT B <- C
    // loses B <- root and B -> C, RIGHT A -> B loses the same two
    assert_eq!(costs, vec![0.0, -2.0, -2.0]);
  }
}
