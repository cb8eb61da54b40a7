use std::env;
use std::io;
use std::process;

use tracing::{debug, info, warn};

use shiftreduce::notation::{format_tree, parse_tree};
use shiftreduce::{
  replay, Alphabet, Err, Reference, State, SwapOracle, SystemConfig, SystemKind, TransitionSystem,
};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} [options]

Reads one tree per line from stdin (`HEAD:LABEL` per word, 0 for the root) and prints
the static-oracle action sequence that rebuilds each of them.

Options:
  -h, --help           Print this message
  -s, --system NAME    arcstd, arceager, archybrid or swap (defaults to arcstd)
  -r, --root LABEL     Label of the arc from the root (defaults to root)
  -e, --eager-swap     Use the eager swap oracle (defaults to lazy)
  -c, --costs          Print the dynamic-oracle cost of every valid action
                       along the oracle path",
    prog_name
  )
}

struct Args {
  config: SystemConfig,
  print_costs: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let prog_name = match iter.next() {
      Some(name) => name,
      None => {
        return Err(Self::make_error_message(
          "bad argument vector",
          "shiftreduce",
        ));
      }
    };

    let mut config = SystemConfig::default();
    let mut print_costs = false;

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-s" || o == "--system" {
        let name = iter
          .next()
          .ok_or_else(|| Self::make_error_message("missing system name", &prog_name))?;
        config.kind = name
          .parse::<SystemKind>()
          .map_err(|e| Self::make_error_message(&e.to_string(), &prog_name))?;
      } else if o == "-r" || o == "--root" {
        config.root_label = iter
          .next()
          .ok_or_else(|| Self::make_error_message("missing root label", &prog_name))?;
      } else if o == "-e" || o == "--eager-swap" {
        config.swap_oracle = SwapOracle::Eager;
      } else if o == "-c" || o == "--costs" {
        print_costs = true;
      } else {
        return Err(Self::make_error_message(
          &format!("unknown argument {:?}", o),
          &prog_name,
        ));
      }
    }

    Ok(Self {
      config,
      print_costs,
    })
  }
}

/// Why a tree can't go through the static oracle, if it can't
fn rejection(tree: &Reference, config: &SystemConfig, root_deprel: usize) -> Option<&'static str> {
  if !tree.is_tree() {
    Some("not a single-rooted tree")
  } else if (0..tree.root()).any(|i| tree.is_undefined(i)) {
    Some("partially annotated")
  } else if !config.kind.handles_non_projective() && !tree.is_projective() {
    Some("non-projective")
  } else if !tree.has_consistent_root_label(root_deprel) {
    Some("root label not exactly on the root arc")
  } else {
    None
  }
}

fn print_costs(system: &dyn TransitionSystem, tree: &Reference, actions: &[usize]) {
  let mut state = State::new(tree.len());
  for &action in actions {
    let valid = system.get_valid_actions(&state);
    let costs = system.get_transition_costs(&state, &valid, tree);
    let scored = valid
      .iter()
      .zip(costs.iter())
      .map(|(&a, c)| format!("{}={}", system.action_name(a), c))
      .collect::<Vec<_>>();
    println!("  {}  {}", state, scored.join(" "));
    system.perform_action(&mut state, action);
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let mut deprels = Alphabet::new();
  let root_deprel = deprels.insert(&opts.config.root_label);
  let mut system = opts.config.build(&deprels)?;
  let mut built_for = deprels.len();
  info!(system = system.system_name(), "reading trees from stdin");

  let (mut rebuilt, mut skipped, mut lineno) = (0, 0, 0);
  let mut input = String::new();
  loop {
    input.clear();
    if io::stdin().read_line(&mut input)? == 0 {
      // ctrl+d
      break;
    }
    lineno += 1;
    let line = input.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let tree = match parse_tree(line, &mut deprels) {
      Ok(tree) => tree,
      Err(e) => {
        warn!(line = lineno, error = %e, "unreadable tree");
        skipped += 1;
        continue;
      }
    };
    if let Some(reason) = rejection(&tree, &opts.config, root_deprel) {
      warn!(line = lineno, reason, "skipped");
      skipped += 1;
      continue;
    }

    // new labels widen the action space
    if deprels.len() != built_for {
      system = opts.config.build(&deprels)?;
      built_for = deprels.len();
      debug!(deprels = built_for, actions = system.num_actions(), "system rebuilt");
    }

    let actions = system.get_oracle_actions(&tree);
    let names = actions
      .iter()
      .map(|&a| system.action_name(a))
      .collect::<Vec<_>>();
    println!("{}", format_tree(&tree, &deprels));
    println!("{}", names.join(" "));
    if opts.print_costs {
      print_costs(system.as_ref(), &tree, &actions);
    }

    let state = replay(system.as_ref(), tree.len(), &actions);
    if state.heads == tree.heads && state.deprels[..tree.root()] == tree.deprels[..tree.root()] {
      rebuilt += 1;
    } else {
      let parsed = Reference::new(state.heads, state.deprels);
      warn!(
        line = lineno,
        parsed = %format_tree(&parsed, &deprels),
        "oracle sequence does not rebuild the reference"
      );
    }
    println!();
  }

  info!(rebuilt, skipped, "done");
  Ok(())
}
