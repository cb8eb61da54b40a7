use tracing::trace;

use super::{run_oracle, Action, ActionKind, ActionTable, TransitionSystem};
use crate::alphabet::Alphabet;
use crate::reference::{Reference, UNDEF_HEAD};
use crate::state::State;
use crate::Err;

/// Arc-standard: arcs are only built between the two topmost stack
/// elements. LEFT attaches s1 to s0, RIGHT attaches s0 to s1.
///
/// Ids: `0 = SHIFT`, `2l + 1 = LEFT-l`, `2l + 2 = RIGHT-l`.
#[derive(Debug, Clone)]
pub struct ArcStandard {
  table: ActionTable,
}

fn sum(a: Option<usize>, b: Option<usize>) -> Option<usize> {
  Some(a? + b?)
}

impl ArcStandard {
  pub fn new(deprels: &Alphabet, root_label: &str) -> Result<Self, Err> {
    Ok(Self {
      table: ActionTable::new("arcstd", &["SHIFT"], deprels, root_label)?,
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
    let head = state.pop_stack();
    let modifier = state.pop_stack();
    state.attach(modifier, head, deprel);
    state.stack.push(head);
  }

  fn right_unsafe(&self, state: &mut State, deprel: usize) {
    let modifier = state.pop_stack();
    let head = state.stack_top();
    state.attach(modifier, head, deprel);
  }

  /// The minimum number of reference arcs that no action sequence from
  /// `state` can produce: arcs already built wrong plus arcs the remaining
  /// stack and buffer can no longer form.
  pub fn cost(&self, state: &State, reference: &Reference) -> usize {
    let root = state.root();
    let units = state
      .stack_tokens()
      .iter()
      .copied()
      .chain(state.buffer_tokens().iter().rev().copied())
      .collect::<Vec<_>>();

    let wrong = (0..root)
      .filter(|&i| state.has_head(i) && !reference.is_undefined(i))
      .filter(|&i| state.heads[i] != reference.head(i) || state.deprels[i] != reference.deprel(i))
      .count();
    let expected = units
      .iter()
      .filter(|&&u| u != root && !reference.is_undefined(u))
      .count();
    let pinned = state.stack_depth().saturating_sub(1);

    wrong + expected.saturating_sub(self.reachable_arcs(&units, pinned, reference))
  }

  /// The largest number of reference arcs in any tree still buildable over
  /// `units` (stack bottom to top, then the buffer, the root last).
  ///
  /// This is the first-order projective chart over the units with two extra
  /// conditions on the `pinned` units (everything stacked under s0). Such a
  /// unit is only popped through an arc with the unit right above it, so it
  /// either gets a right dependent, or takes its head from the right while
  /// having no left dependent. The root takes exactly one dependent.
  fn reachable_arcs(&self, units: &[usize], pinned: usize, reference: &Reference) -> usize {
    let n = units.len() - 1;
    if n == 0 {
      return 0;
    }
    let score = |dep: usize, head: usize| (reference.head(units[dep]) == units[head]) as usize;
    let is_pinned = |x: usize| x < pinned;

    // right/left complete and right/left incomplete spans; `il_rd` requires
    // the dependent to have a right dependent of its own
    let mut cr = vec![vec![None; n]; n];
    let mut cl = vec![vec![None; n]; n];
    let mut ir = vec![vec![None; n]; n];
    let mut il_any = vec![vec![None; n]; n];
    let mut il_rd = vec![vec![None; n]; n];
    for i in 0..n {
      cr[i][i] = Some(0);
      cl[i][i] = Some(0);
    }

    for width in 1..n {
      for i in 0..n - width {
        let j = i + width;

        for k in i..j {
          let span = sum(cr[i][k], cl[k + 1][j]);
          ir[i][j] = ir[i][j].max(span.map(|s| s + score(j, i)));
          let left = span.map(|s| s + score(i, j));
          il_any[i][j] = il_any[i][j].max(left);
          if k > i {
            il_rd[i][j] = il_rd[i][j].max(left);
          }
        }

        for x in i..j {
          let inner = if is_pinned(x) && i < x {
            il_rd[x][j]
          } else {
            il_any[x][j]
          };
          cl[i][j] = cl[i][j].max(sum(cl[i][x], inner));
        }

        for k in i + 1..=j {
          // a pinned dependent with its head on the left needs a right dependent
          if is_pinned(k) && k == j {
            continue;
          }
          cr[i][j] = cr[i][j].max(sum(ir[i][k], cr[k][j]));
        }
      }
    }

    (0..n)
      .filter(|&k| !is_pinned(k) || k == 0 || k < n - 1)
      .filter_map(|k| sum(cl[0][k], cr[k][n - 1]).map(|s| s + score(k, n)))
      .max()
      .unwrap_or(0)
  }

  fn oracle_onestep(&self, state: &State, reference: &Reference, children: &[Vec<usize>]) -> Action {
    let complete = |tok: usize| children[tok].iter().all(|&c| state.has_head(c));

    if state.stack_depth() >= 2 {
      let s0 = state.stack_top();
      let s1 = state.stack_second();
      if reference.head(s1) == s0 && complete(s1) {
        return self.left_id(reference.deprel(s1));
      }
      if reference.head(s0) == s1 && complete(s0) {
        return self.right_id(reference.deprel(s0));
      }
    }
    self.shift_id()
  }

  fn transition_loss(&self, state: &State, action: Action, reference: &Reference, current: usize) -> f32 {
    let mut next = state.clone();
    self.perform_action(&mut next, action);
    self.cost(&next, reference).saturating_sub(current) as f32
  }
}

impl TransitionSystem for ArcStandard {
  fn system_name(&self) -> &'static str {
    "arcstd"
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
      if state.buffer.len() == 1 {
        return false;
      }
      // the root is shifted onto a single token
      if state.buffer.len() == 2 && state.stack.len() > 2 {
        return false;
      }
    } else if self.is_left(action) {
      if state.stack.len() < 3 {
        return false;
      }
      if state.buffer.len() == 1 {
        if state.stack.len() > 3 || action != self.table.left_root {
          return false;
        }
      } else if action == self.table.left_root {
        return false;
      }
    } else {
      if state.stack.len() < 3 || state.buffer.len() == 1 {
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
    assert!(reference.is_tree(), "arcstd: reference is not a tree");
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
    let current = self.cost(state, reference);
    let mut wrong_left = None;
    let mut wrong_right = None;
    let mut costs = Vec::with_capacity(actions.len());

    for &action in actions {
      let cost = if self.is_shift(action) {
        -self.transition_loss(state, action, reference, current)
      } else {
        let deprel = self.parse_label(action);
        let (head, modifier) = if self.is_left(action) {
          (state.stack_top(), state.stack_second())
        } else {
          (state.stack_second(), state.stack_top())
        };
        let correct = reference.head(modifier) == UNDEF_HEAD
          || (reference.head(modifier) == head && reference.deprel(modifier) == deprel);
        let cache = if self.is_left(action) {
          &mut wrong_left
        } else {
          &mut wrong_right
        };
        if correct {
          -self.transition_loss(state, action, reference, current)
        } else {
          *cache.get_or_insert_with(|| -self.transition_loss(state, action, reference, current))
        }
      };
      costs.push(cost);
    }

    trace!(state = %state, current, ?costs, "arcstd costs");
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

  fn system() -> ArcStandard {
    ArcStandard::new(&labels(), "root").unwrap()
  }

  fn shifted(len: usize, shifts: usize) -> State {
    let s = system();
    let mut state = State::new(len);
    for _ in 0..shifts {
      s.perform_action(&mut state, s.shift_id());
    }
    state
  }

  #[test]
  fn test_action_ids() {
    let s = system();
    assert_eq!(s.num_actions(), 5);
    assert_eq!(s.left_id(0), 1);
    assert_eq!(s.right_id(0), 2);
    assert_eq!(s.action_name(s.right_id(1)), "RIGHT-dep");
    assert_eq!(s.split(3), (ActionKind::Left, Some(1)));
    assert_eq!(s.split(0), (ActionKind::Shift, None));
  }

  #[test]
  fn test_two_word_chain() {
    let s = system();
    // A <- B, B <- root
    let r = Reference::from_conll(&[2, 0], &[1, 0]);
    let actions = s.get_oracle_actions(&r);
    assert_eq!(actions, vec![0, 0, 3, 0, 1]);
    let names = actions.iter().map(|&a| s.action_name(a)).collect::<Vec<_>>();
    assert_eq!(names, ["SHIFT", "SHIFT", "LEFT-dep", "SHIFT", "LEFT-root"]);

    let state = replay(&s, r.len(), &actions);
    assert_eq!(state.heads, r.heads);
    assert_eq!(state.deprels[..2], r.deprels[..2]);
  }

  #[test]
  fn test_root_arc_is_last() {
    let s = system();
    let state = shifted(3, 2);
    // root still in the buffer, two words stacked
    assert!(!s.is_valid_action(&state, s.shift_id()));
    assert_eq!(s.get_valid_actions(&state), vec![3, 4]);

    let mut state = shifted(2, 1);
    s.perform_action(&mut state, s.shift_id());
    assert_eq!(s.get_valid_actions(&state), vec![s.left_id(0)]);
  }

  #[test]
  fn test_cost_on_gold_path() {
    let s = system();
    // A <- B, B <- root, C <- B
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    let state = shifted(4, 3);
    assert_eq!(s.cost(&state, &r), 0);

    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![3, 4]);
    // LEFT B <- C loses B <- root, A <- B and C <- B
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![-3.0, 0.0]);
  }

  #[test]
  fn test_cost_stacked_chain() {
    let s = system();
    // A <- B, B <- C, C <- root
    let r = Reference::from_conll(&[2, 3, 0], &[1, 1, 0]);
    let state = shifted(4, 2);
    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![0, 3, 4]);
    // shifting C buries B under it before it could collect A
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![-1.0, 0.0, -2.0]);
    assert_eq!(s.cost(&shifted(4, 3), &r), 1);
  }

  #[test]
  fn test_wrong_labels_share_a_cost() {
    let labels: Alphabet = ["root", "nsubj", "obj", "amod"].iter().collect();
    let s = ArcStandard::new(&labels, "root").unwrap();
    let r = Reference::from_conll(&[2, 0], &[1, 0]);
    let mut state = State::new(3);
    s.perform_action(&mut state, 0);
    s.perform_action(&mut state, 0);

    let lefts = (1..4).map(|l| s.left_id(l)).collect::<Vec<_>>();
    // only the label of A <- B is wrong
    assert_eq!(s.get_transition_costs(&state, &lefts, &r), vec![0.0, -1.0, -1.0]);
  }
}
