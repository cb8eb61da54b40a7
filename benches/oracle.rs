use criterion::{black_box, criterion_group, criterion_main, Criterion};

use shiftreduce::notation::parse_tree;
use shiftreduce::{Alphabet, Reference, State, SystemConfig, SystemKind, TransitionSystem};

// "the old man who lives next door said that he saw a cat on the roof yesterday"
const PROJECTIVE: &str =
  "3:det 3:amod 8:nsubj 5:nsubj 3:acl 7:amod 5:obl 0:root 11:mark 11:nsubj 8:ccomp 13:det 11:obj 16:case 16:det 11:obl 11:obl";
const CROSSING: &str = "3:dep 4:dep 0:root 3:dep 4:dep 3:dep 6:dep";

fn oracle(system: &dyn TransitionSystem, tree: &Reference) -> usize {
  system.get_oracle_actions(tree).len()
}

/// Scores every valid action along the oracle path
fn costs(system: &dyn TransitionSystem, tree: &Reference, actions: &[usize]) -> f32 {
  let mut state = State::new(tree.len());
  let mut total = 0.0;
  for &action in actions {
    let valid = system.get_valid_actions(&state);
    total += system.get_transition_costs(&state, &valid, tree).iter().sum::<f32>();
    system.perform_action(&mut state, action);
  }
  total
}

fn criterion_benchmark(c: &mut Criterion) {
  let mut deprels: Alphabet = ["root"].iter().collect();
  let projective = parse_tree(PROJECTIVE, &mut deprels).unwrap();
  let crossing = parse_tree(CROSSING, &mut deprels).unwrap();

  for kind in SystemKind::ALL {
    let system = SystemConfig::new(kind).build(&deprels).unwrap();
    let tree = if kind.handles_non_projective() {
      &crossing
    } else {
      &projective
    };
    let actions = system.get_oracle_actions(tree);

    c.bench_function(&format!("{} static oracle", kind), |b| {
      b.iter(|| oracle(black_box(system.as_ref()), black_box(tree)))
    });

    c.bench_function(&format!("{} dynamic oracle", kind), |b| {
      b.iter(|| costs(black_box(system.as_ref()), black_box(tree), black_box(&actions)))
    });
  }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
