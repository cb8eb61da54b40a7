use std::collections::HashMap;

use tracing::{debug, trace};

use super::{run_oracle, Action, ActionKind, ActionTable, TransitionSystem};
use crate::alphabet::Alphabet;
use crate::reference::{Reference, UNDEF_HEAD};
use crate::state::State;
use crate::Err;

/// Which one-step oracle drives [`Swap::get_oracle_actions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapOracle {
  /// swap as soon as s1 follows s0 in projective order
  Eager,
  /// additionally wait while b0 belongs to the same maximal projective
  /// component as s0
  Lazy,
}

/// Arc-standard extended with SWAP, which moves s1 back to the front of the
/// buffer. Builds non-projective trees by reordering tokens into projective
/// order.
///
/// Ids: `0 = SHIFT`, `1 = SWAP`, `2l + 2 = LEFT-l`, `2l + 3 = RIGHT-l`.
#[derive(Debug, Clone)]
pub struct Swap {
  table: ActionTable,
  oracle: SwapOracle,
}

/// Per-sentence tables the one-step oracle consults
struct OracleTables {
  children: Vec<Vec<usize>>,
  /// position of every token in the in-order traversal of the tree
  orders: Vec<usize>,
  components: Components,
}

/// The maximal projective components of a reference tree
struct Components {
  /// head of the component each token belongs to
  mpc: Vec<usize>,
  /// the whole tree is a single component
  trivial: bool,
  /// head of the component holding the virtual root
  root: usize,
  /// tokens in that component
  size: usize,
}

/// Best completions of the configurations reachable from the one being
/// scored. What a configuration can still build depends only on its stack
/// and buffer, so those are the key.
struct Completion<'a> {
  system: &'a Swap,
  reference: &'a Reference,
  tables: OracleTables,
  lost: HashMap<(Vec<usize>, Vec<usize>), usize>,
}

impl Swap {
  pub fn new(deprels: &Alphabet, root_label: &str) -> Result<Self, Err> {
    Self::with_oracle(deprels, root_label, SwapOracle::Lazy)
  }

  pub fn with_oracle(deprels: &Alphabet, root_label: &str, oracle: SwapOracle) -> Result<Self, Err> {
    Ok(Self {
      table: ActionTable::new("swap", &["SHIFT", "SWAP"], deprels, root_label)?,
      oracle,
    })
  }

  pub fn oracle(&self) -> SwapOracle {
    self.oracle
  }

  pub fn is_shift(&self, action: Action) -> bool {
    action == 0
  }

  pub fn is_swap(&self, action: Action) -> bool {
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

  pub fn swap_id(&self) -> Action {
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

  fn shift_unsafe(&self, state: &mut State) {
    let b = state.pop_buffer();
    state.stack.push(b);
  }

  fn swap_unsafe(&self, state: &mut State) {
    let s0 = state.pop_stack();
    let s1 = state.pop_stack();
    state.stack.push(s0);
    state.buffer.push(s1);
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

  /// In-order positions: the left dependents of a token, the token, then its
  /// right dependents. The root comes last.
  fn calculate_orders(root: usize, children: &[Vec<usize>]) -> Vec<usize> {
    let mut orders = vec![0; children.len()];
    let mut timestamp = 0;

    // (token, whether its left dependents are already expanded)
    let mut agenda = vec![(root, false)];
    while let Some((token, expanded)) = agenda.pop() {
      if expanded {
        orders[token] = timestamp;
        timestamp += 1;
        continue;
      }
      let split = children[token].partition_point(|&c| c < token);
      for &c in children[token][split..].iter().rev() {
        agenda.push((c, false));
      }
      agenda.push((token, true));
      for &c in children[token][..split].iter().rev() {
        agenda.push((c, false));
      }
    }
    orders
  }

  /// Maximal projective components: the partial trees left after parsing
  /// the sentence in its own order with LEFT and RIGHT only, attaching a
  /// dependent as soon as it is complete. Each token maps to the head of
  /// its partial tree, next to whether that leaves a single component and
  /// the head and size of the virtual root's component.
  fn calculate_mpc(reference: &Reference, children: &[Vec<usize>]) -> Components {
    let len = reference.len();
    let mut attached = vec![0; len];
    let mut stack: Vec<usize> = Vec::with_capacity(len);

    for token in 0..len {
      stack.push(token);
      while stack.len() >= 2 {
        let s0 = stack[stack.len() - 1];
        let s1 = stack[stack.len() - 2];
        if reference.head(s1) == s0 && attached[s1] == children[s1].len() {
          attached[s0] += 1;
          stack.remove(stack.len() - 2);
        } else if reference.head(s0) == s1 && attached[s0] == children[s0].len() {
          attached[s1] += 1;
          stack.pop();
        } else {
          break;
        }
      }
    }

    let mut is_component_root = vec![false; len];
    for &t in stack.iter() {
      is_component_root[t] = true;
    }
    let mpc = (0..len)
      .map(|mut t| {
        while !is_component_root[t] {
          t = reference.head(t);
        }
        t
      })
      .collect::<Vec<_>>();

    let root = mpc[reference.root()];
    Components {
      trivial: stack.len() == 1,
      root,
      size: mpc.iter().filter(|&&c| c == root).count(),
      mpc,
    }
  }

  fn oracle_tables(&self, reference: &Reference) -> OracleTables {
    let children = reference.children();
    let orders = Self::calculate_orders(reference.root(), &children);
    let components = Self::calculate_mpc(reference, &children);
    OracleTables {
      children,
      orders,
      components,
    }
  }

  fn oracle_onestep(&self, state: &State, reference: &Reference, tables: &OracleTables) -> Action {
    let complete = |tok: usize| tables.children[tok].iter().all(|&c| state.has_head(c));

    if state.stack_depth() >= 2 {
      let s0 = state.stack_top();
      let s1 = state.stack_second();
      if reference.head(s1) == s0 && complete(s1) {
        return self.left_id(reference.deprel(s1));
      }
      if reference.head(s0) == s1 && complete(s0) {
        return self.right_id(reference.deprel(s0));
      }
      if s1 < s0 && tables.orders[s1] > tables.orders[s0] && state.buffer_depth() > 0 {
        let b = state.buffer_front();
        let swap = match self.oracle {
          SwapOracle::Eager => true,
          SwapOracle::Lazy => {
            b == state.root() || tables.components.mpc[s0] != tables.components.mpc[b]
          }
        };
        if swap {
          return self.swap_id();
        }
      }
    }
    self.shift_id()
  }

  /// 1 when `action` builds an arc the reference does not have
  fn arc_error(&self, state: &State, action: Action, reference: &Reference) -> usize {
    if self.is_shift(action) || self.is_swap(action) {
      return 0;
    }
    let (head, modifier) = if self.is_left(action) {
      (state.stack_top(), state.stack_second())
    } else {
      (state.stack_second(), state.stack_top())
    };
    let correct = reference.head(modifier) == UNDEF_HEAD
      || (reference.head(modifier) == head && reference.deprel(modifier) == self.parse_label(action));
    (!correct) as usize
  }

  fn transition_loss(
    &self,
    state: &State,
    action: Action,
    completion: &mut Completion,
    current: usize,
  ) -> f32 {
    let mut next = state.clone();
    self.perform_action(&mut next, action);
    let lost = self.arc_error(state, action, completion.reference) + completion.search(&next);
    lost.saturating_sub(current) as f32
  }
}

impl<'a> Completion<'a> {
  fn new(system: &'a Swap, reference: &'a Reference) -> Self {
    Self {
      system,
      reference,
      tables: system.oracle_tables(reference),
      lost: HashMap::new(),
    }
  }

  /// The fewest wrong arcs any action sequence from `state` still has to
  /// build. Arcs already in `state` are not counted.
  fn search(&mut self, state: &State) -> usize {
    if state.terminated() {
      return 0;
    }
    let key = (state.stack.clone(), state.buffer.clone());
    if let Some(&lost) = self.lost.get(&key) {
      return lost;
    }

    let floor = self.doomed(state);
    let mut best = usize::MAX;
    for action in self.moves(state) {
      let mut next = state.clone();
      self.system.perform_action(&mut next, action);
      let lost = self
        .search(&next)
        .saturating_add(self.system.arc_error(state, action, self.reference));
      best = best.min(lost);
      if best == floor {
        break;
      }
    }

    self.lost.insert(key, best);
    best
  }

  /// Unreduced words whose reference arc can no longer be built: the head
  /// is already reduced, or the label can't go on that arc
  fn doomed(&self, state: &State) -> usize {
    let root = state.root();
    let root_deprel = self.system.table.root;
    state
      .stack_tokens()
      .iter()
      .chain(state.buffer_tokens())
      .filter(|&&d| d != root && !self.reference.is_undefined(d))
      .filter(|&&d| {
        let (head, deprel) = (self.reference.head(d), self.reference.deprel(d));
        if head == root {
          deprel != root_deprel
        } else {
          head > root || state.has_head(head) || deprel == root_deprel
        }
      })
      .count()
  }

  /// One valid action per structure, labelled with the reference label
  /// where it is allowed. Wrong labels all lead to the same configuration.
  /// The static oracle's move comes first.
  fn moves(&self, state: &State) -> Vec<Action> {
    let system = self.system;
    let mut moves = [system.shift_id(), system.swap_id()]
      .into_iter()
      .filter(|&a| system.is_valid_action(state, a))
      .collect::<Vec<_>>();

    if state.stack_depth() >= 2 {
      moves.extend(self.labelled(state, state.stack_second(), |l| system.left_id(l)));
      moves.extend(self.labelled(state, state.stack_top(), |l| system.right_id(l)));
    }

    let guide = system.split(system.oracle_onestep(state, self.reference, &self.tables)).0;
    moves.sort_by_key(|&a| system.split(a).0 != guide);
    moves
  }

  /// A valid labelling of an arc onto `modifier`, its reference label first
  fn labelled<F>(&self, state: &State, modifier: usize, id: F) -> Option<Action>
  where
    F: Fn(usize) -> Action,
  {
    let system = self.system;
    let gold = self.reference.deprel(modifier);
    if gold < system.num_deprels() && system.is_valid_action(state, id(gold)) {
      return Some(id(gold));
    }
    (0..system.num_deprels())
      .map(id)
      .find(|&a| system.is_valid_action(state, a))
  }
}

impl TransitionSystem for Swap {
  fn system_name(&self) -> &'static str {
    "swap"
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
    } else if self.is_swap(action) {
      (ActionKind::Swap, None)
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
      if state.buffer.len() == 2 && state.stack.len() > 2 {
        return false;
      }
    } else if self.is_swap(action) {
      // only tokens still in sentence order may be swapped
      if state.stack.len() < 3 || state.buffer.len() == 1 {
        return false;
      }
      if state.stack_second() > state.stack_top() {
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
    } else if self.is_swap(action) {
      self.swap_unsafe(state);
    } else if self.is_left(action) {
      self.left_unsafe(state, self.parse_label(action));
    } else {
      self.right_unsafe(state, self.parse_label(action));
    }
  }

  fn get_oracle_actions(&self, reference: &Reference) -> Vec<Action> {
    assert!(reference.is_tree(), "swap: reference is not a tree");
    let tables = self.oracle_tables(reference);
    let components = &tables.components;
    debug!(
      orders = ?tables.orders,
      mpc = ?components.mpc,
      trivial = components.trivial,
      root_component = components.root,
      root_component_size = components.size,
      "swap oracle tables"
    );
    run_oracle(self, reference.len(), |state| {
      self.oracle_onestep(state, reference, &tables)
    })
  }

  /// The loss of an action is what the best completion after it loses on
  /// top of the best completion of `state`. Swapping lets tokens reorder in
  /// ways no span chart captures, so completions are searched exhaustively
  /// over the reachable configurations, stopping early once a completion
  /// loses only the arcs that are already out of reach.
  fn get_transition_costs(
    &self,
    state: &State,
    actions: &[Action],
    reference: &Reference,
  ) -> Vec<f32> {
    let mut completion = Completion::new(self, reference);
    let current = completion.search(state);
    let mut wrong_left = None;
    let mut wrong_right = None;
    let mut costs = Vec::with_capacity(actions.len());

    for &action in actions {
      let cost = if self.arc_error(state, action, reference) == 0 {
        -self.transition_loss(state, action, &mut completion, current)
      } else {
        let cache = if self.is_left(action) {
          &mut wrong_left
        } else {
          &mut wrong_right
        };
        *cache.get_or_insert_with(|| -self.transition_loss(state, action, &mut completion, current))
      };
      costs.push(cost);
    }

    trace!(
      state = %state,
      current,
      explored = completion.lost.len(),
      ?costs,
      "swap costs"
    );
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

  // A <- C, B <- D, C <- root, D <- C: A <- C crosses B <- D
  fn crossing() -> Reference {
    Reference::from_conll(&[3, 4, 0, 3], &[1, 1, 0, 1])
  }

  #[test]
  fn test_action_ids() {
    let s = Swap::new(&labels(), "root").unwrap();
    assert_eq!(s.num_actions(), 6);
    assert_eq!(s.action_name(1), "SWAP");
    assert_eq!(s.split(1), (ActionKind::Swap, None));
    assert_eq!(s.split(s.left_id(1)), (ActionKind::Left, Some(1)));
    assert_eq!(s.oracle(), SwapOracle::Lazy);
  }

  #[test]
  fn test_orders() {
    let r = crossing();
    let orders = Swap::calculate_orders(r.root(), &r.children());
    assert_eq!(orders, vec![0, 2, 1, 3, 4]);
  }

  #[test]
  fn test_mpc() {
    let r = crossing();
    let components = Swap::calculate_mpc(&r, &r.children());
    assert_eq!(components.mpc, vec![0, 1, 2, 3, 4]);
    assert!(!components.trivial);
    assert_eq!((components.root, components.size), (4, 1));

    // fully projective: one component under the root
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    let components = Swap::calculate_mpc(&r, &r.children());
    assert_eq!(components.mpc, vec![3, 3, 3, 3]);
    assert!(components.trivial);
    assert_eq!((components.root, components.size), (3, 4));
  }

  #[test]
  fn test_non_projective_oracle() {
    for oracle in [SwapOracle::Eager, SwapOracle::Lazy] {
      let s = Swap::with_oracle(&labels(), "root", oracle).unwrap();
      let r = crossing();
      let actions = s.get_oracle_actions(&r);
      let names = actions.iter().map(|&a| s.action_name(a)).collect::<Vec<_>>();
      assert_eq!(
        names,
        [
          "SHIFT", "SHIFT", "SHIFT", "SWAP", "LEFT-dep", "SHIFT", "SHIFT", "LEFT-dep", "RIGHT-dep",
          "SHIFT", "LEFT-root"
        ]
      );

      let state = replay(&s, r.len(), &actions);
      assert_eq!(state.heads, r.heads);
      assert_eq!(state.deprels[..4], r.deprels[..4]);
    }
  }

  #[test]
  fn test_swap_keeps_sentence_order() {
    let s = Swap::new(&labels(), "root").unwrap();
    let mut state = State::new(4);
    s.perform_action(&mut state, s.shift_id());
    s.perform_action(&mut state, s.shift_id());
    assert!(s.is_valid_action(&state, s.swap_id()));
    s.perform_action(&mut state, s.swap_id());
    assert_eq!(state.stack_tokens(), &[1]);
    assert_eq!(state.buffer_front(), 0);

    s.perform_action(&mut state, s.shift_id());
    // 1 is now below 0 and may not be swapped back
    assert!(!s.is_valid_action(&state, s.swap_id()));
  }

  #[test]
  fn test_costs_on_crossing_tree() {
    let s = Swap::new(&labels(), "root").unwrap();
    let r = crossing();
    let state = replay(&s, 5, &[0, 0, 0]);
    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![0, 1, 4, 5]);
    // SHIFT D still reaches the tree: SWAP, LEFT B <- D, SWAP, SHIFT, SHIFT,
    // LEFT A <- C, LEFT D <- C. LEFT B <- C is a wrong arc, RIGHT B -> C is
    // wrong and strands A and D
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![0.0, 0.0, -1.0, -3.0]);
  }

  #[test]
  fn test_costs_after_a_swap() {
    let s = Swap::new(&labels(), "root").unwrap();
    // B <- A, A <- C, C <- root
    let r = Reference::from_conll(&[3, 1, 0], &[1, 1, 0]);
    let state = replay(&s, 4, &[0, 0, 1, 0, 0, 1]);
    assert_eq!(format!("{}", state), "[1 2] | [0 3]");

    let valid = s.get_valid_actions(&state);
    assert_eq!(valid, vec![0, 1, 4, 5]);
    // SWAP, SHIFT, SHIFT, LEFT, RIGHT rebuilds the tree. SHIFT puts A on top
    // of C and cuts B <- A or A <- C
    assert_eq!(s.get_transition_costs(&state, &valid, &r), vec![-1.0, 0.0, -1.0, -2.0]);
  }

  #[test]
  fn test_costs_of_wrong_labels_are_shared() {
    let labels: Alphabet = ["root", "nsubj", "obj"].iter().collect();
    let s = Swap::new(&labels, "root").unwrap();
    // A <- B, B <- root
    let r = Reference::from_conll(&[2, 0], &[1, 0]);
    let state = replay(&s, 3, &[0, 0]);
    let lefts = [1, 2].map(|l| s.left_id(l));
    let rights = [1, 2].map(|l| s.right_id(l));
    assert_eq!(s.get_transition_costs(&state, &lefts, &r), vec![0.0, -1.0]);
    // B <- A is wrong whatever its label
    assert_eq!(s.get_transition_costs(&state, &rights, &r), vec![-2.0, -2.0]);
  }
}
