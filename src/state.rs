use std::fmt;

use crate::reference::{BAD_DEPREL, BAD_HEAD};

/// Sentinel kept at the bottom of both the stack and the buffer
pub const GUARD: usize = BAD_HEAD;

/// A parser configuration: stack, buffer and the partial tree built so far.
///
/// The buffer is stored reversed, so the next token to process is its last
/// element. Both sequences keep a [`GUARD`] at index 0. Configurations are
/// plain vectors of integers; cloning one is how costs are simulated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
  pub stack: Vec<usize>,
  pub buffer: Vec<usize>,
  pub heads: Vec<usize>,
  pub deprels: Vec<usize>,
}

impl State {
  /// The initial configuration for a sentence of `len` tokens, the virtual
  /// root (token `len - 1`) included.
  pub fn new(len: usize) -> Self {
    let mut state = Self {
      stack: Vec::with_capacity(len + 1),
      buffer: Vec::with_capacity(len + 1),
      heads: vec![BAD_HEAD; len],
      deprels: vec![BAD_DEPREL; len],
    };
    state.initialize();
    state
  }

  /// Resets stack and buffer to the initial configuration. Leaves heads and
  /// deprels untouched.
  pub fn initialize(&mut self) {
    let len = self.heads.len();
    self.buffer.clear();
    self.buffer.push(GUARD);
    self.buffer.extend((0..len).rev());
    self.stack.clear();
    self.stack.push(GUARD);
  }

  /// Number of tokens including the virtual root
  pub fn len(&self) -> usize {
    self.heads.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heads.is_empty()
  }

  /// Index of the virtual root
  pub fn root(&self) -> usize {
    self.heads.len() - 1
  }

  /// True once exactly one token remains on the stack and the buffer is
  /// exhausted
  pub fn terminated(&self) -> bool {
    !(self.stack.len() > 2 || self.buffer.len() > 1)
  }

  /// Real elements on the stack, guard excluded
  pub fn stack_depth(&self) -> usize {
    self.stack.len() - 1
  }

  /// Real elements in the buffer, guard excluded
  pub fn buffer_depth(&self) -> usize {
    self.buffer.len() - 1
  }

  /// s0, or [`GUARD`] on an empty stack
  pub fn stack_top(&self) -> usize {
    self.stack[self.stack.len() - 1]
  }

  /// s1, or [`GUARD`] when fewer than two tokens are stacked
  pub fn stack_second(&self) -> usize {
    if self.stack.len() > 2 {
      self.stack[self.stack.len() - 2]
    } else {
      GUARD
    }
  }

  /// b0, or [`GUARD`] on an exhausted buffer
  pub fn buffer_front(&self) -> usize {
    self.buffer[self.buffer.len() - 1]
  }

  /// Real stack tokens, bottom first
  pub fn stack_tokens(&self) -> &[usize] {
    &self.stack[1..]
  }

  /// Real buffer tokens, last-to-process first
  pub fn buffer_tokens(&self) -> &[usize] {
    &self.buffer[1..]
  }

  pub fn has_head(&self, token: usize) -> bool {
    self.heads[token] != BAD_HEAD
  }

  /// Writes an arc. Every token receives its head exactly once.
  pub(crate) fn attach(&mut self, modifier: usize, head: usize, deprel: usize) {
    debug_assert!(
      !self.has_head(modifier),
      "token {} already has head {}",
      modifier,
      self.heads[modifier]
    );
    self.heads[modifier] = head;
    self.deprels[modifier] = deprel;
  }

  /// Removes s0. The guard itself is never handed out.
  pub(crate) fn pop_stack(&mut self) -> usize {
    debug_assert!(self.stack.len() > 1, "pop from an empty stack");
    let top = self.stack_top();
    self.stack.truncate(self.stack.len() - 1);
    top
  }

  /// Removes b0. The guard itself is never handed out.
  pub(crate) fn pop_buffer(&mut self) -> usize {
    debug_assert!(self.buffer.len() > 1, "pop from an exhausted buffer");
    let front = self.buffer_front();
    self.buffer.truncate(self.buffer.len() - 1);
    front
  }
}

impl fmt::Display for State {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (idx, tok) in self.stack_tokens().iter().enumerate() {
      if idx > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", tok)?;
    }
    write!(f, "] | [")?;
    for (idx, tok) in self.buffer_tokens().iter().rev().enumerate() {
      if idx > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", tok)?;
    }
    write!(f, "]")
  }
}
