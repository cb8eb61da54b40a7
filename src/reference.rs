use std::fmt;

/// Marks a slot with no head: an unassigned configuration slot, the virtual
/// root's own head, or the guard at the bottom of the stack and buffer.
pub const BAD_HEAD: usize = usize::MAX;
/// Head of a token left unannotated in a partial reference tree.
pub const UNDEF_HEAD: usize = usize::MAX - 1;
/// Marks a slot with no label.
pub const BAD_DEPREL: usize = usize::MAX - 2;
/// Label of a token left unannotated in a partial reference tree.
pub const UNDEF_DEPREL: usize = usize::MAX - 3;

/// The reference (gold) tree of one sentence.
///
/// Tokens are indexed from 0, and the virtual root is appended as the last
/// token, so a sentence of `n` words has `len() == n + 1` and every word
/// attached to the root has head `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  pub heads: Vec<usize>,
  pub deprels: Vec<usize>,
}

impl Reference {
  /// Builds a reference from internal-encoding vectors that already include
  /// the virtual root.
  pub fn new(heads: Vec<usize>, deprels: Vec<usize>) -> Self {
    assert_eq!(
      heads.len(),
      deprels.len(),
      "#heads should be equal to #deprels"
    );
    assert!(!heads.is_empty(), "reference needs at least the virtual root");
    Self { heads, deprels }
  }

  /// Converts CoNLL heads (1-based, 0 is the root) for the words of a
  /// sentence and appends the virtual root. Panics on a head past the last
  /// word.
  pub fn from_conll(heads: &[usize], deprels: &[usize]) -> Self {
    assert_eq!(
      heads.len(),
      deprels.len(),
      "#heads should be equal to #deprels"
    );
    let root = heads.len();
    if let Some(h) = heads.iter().find(|&&h| h != UNDEF_HEAD && h > root) {
      panic!("head {} out of range for {} words", h, root);
    }
    let mut internal = heads
      .iter()
      .map(|&h| match h {
        UNDEF_HEAD => UNDEF_HEAD,
        0 => root,
        h => h - 1,
      })
      .collect::<Vec<_>>();
    internal.push(BAD_HEAD);

    let mut labels = deprels.to_vec();
    labels.push(BAD_DEPREL);

    Self::new(internal, labels)
  }

  /// Inverse of [`Reference::from_conll`], dropping the virtual root.
  pub fn to_conll(&self) -> (Vec<usize>, Vec<usize>) {
    let root = self.root();
    let heads = self.heads[..root]
      .iter()
      .map(|&h| match h {
        UNDEF_HEAD | BAD_HEAD => h,
        h if h == root => 0,
        h => h + 1,
      })
      .collect();
    (heads, self.deprels[..root].to_vec())
  }

  /// Number of tokens including the virtual root
  pub fn len(&self) -> usize {
    self.heads.len()
  }

  /// True when the sentence has no words, only the virtual root
  pub fn is_empty(&self) -> bool {
    self.len() == 1
  }

  /// Index of the virtual root
  pub fn root(&self) -> usize {
    self.heads.len() - 1
  }

  pub fn head(&self, token: usize) -> usize {
    self.heads[token]
  }

  pub fn deprel(&self, token: usize) -> usize {
    self.deprels[token]
  }

  pub fn is_undefined(&self, token: usize) -> bool {
    self.heads[token] == UNDEF_HEAD
  }

  /// Children lists indexed by head, each in ascending token order.
  /// Undefined and out-of-range heads contribute no edge.
  pub fn children(&self) -> Vec<Vec<usize>> {
    let mut tree = vec![Vec::new(); self.len()];
    for (dep, &head) in self.heads.iter().enumerate() {
      if head < self.len() {
        tree[head].push(dep);
      }
    }
    tree
  }

  /// Words attached directly to the virtual root
  pub fn root_dependents(&self) -> Vec<usize> {
    let root = self.root();
    (0..root).filter(|&i| self.heads[i] == root).collect()
  }

  /// The word attached to the virtual root, if there is exactly one
  pub fn single_root(&self) -> Option<usize> {
    match self.root_dependents().as_slice() {
      &[word] => Some(word),
      _ => None,
    }
  }

  /// True when the annotated part forms a single-rooted tree: every word has
  /// an in-range head or is undefined, exactly one word hangs off the
  /// virtual root and following heads never cycles.
  pub fn is_tree(&self) -> bool {
    let root = self.root();
    if self.heads[root] != BAD_HEAD {
      return false;
    }
    if self
      .heads
      .iter()
      .take(root)
      .any(|&h| h != UNDEF_HEAD && h > root)
    {
      return false;
    }
    if self.single_root().is_none() {
      return false;
    }

    for start in 0..root {
      let mut cur = start;
      let mut steps = 0;
      while cur != root {
        cur = self.heads[cur];
        if cur == UNDEF_HEAD {
          break;
        }
        steps += 1;
        if steps > root || cur == start {
          return false;
        }
      }
    }
    true
  }

  /// True when no two annotated arcs cross, with the virtual root at the end
  /// of the sentence.
  pub fn is_projective(&self) -> bool {
    let arcs = self
      .heads
      .iter()
      .enumerate()
      .filter(|&(_, &h)| h < self.len())
      .map(|(d, &h)| (d.min(h), d.max(h)))
      .collect::<Vec<_>>();

    for (i, &(l1, r1)) in arcs.iter().enumerate() {
      for &(l2, r2) in arcs.iter().skip(i + 1) {
        if (l1 < l2 && l2 < r1 && r1 < r2) || (l2 < l1 && l1 < r2 && r2 < r1) {
          return false;
        }
      }
    }
    true
  }

  /// True when `root_deprel` is carried by exactly the words attached to the
  /// virtual root. Undefined words are ignored.
  pub fn has_consistent_root_label(&self, root_deprel: usize) -> bool {
    let root = self.root();
    (0..root)
      .filter(|&i| !self.is_undefined(i))
      .all(|i| (self.heads[i] == root) == (self.deprels[i] == root_deprel))
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (heads, deprels) = self.to_conll();
    for (idx, (h, l)) in heads.iter().zip(deprels.iter()).enumerate() {
      if idx > 0 {
        write!(f, " ")?;
      }
      if *h == UNDEF_HEAD {
        write!(f, "_")?;
      } else {
        write!(f, "{}:{}", h, l)?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_conll_conversion() {
    // 1 <- 2, 2 <- root, 3 <- 2
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    assert_eq!(r.heads, vec![1, 3, 1, BAD_HEAD]);
    assert_eq!(r.root(), 3);
    assert_eq!(r.to_conll(), (vec![2, 0, 2], vec![1, 0, 1]));
  }

  #[test]
  fn test_undefined_heads_survive_conversion() {
    let r = Reference::from_conll(&[0, UNDEF_HEAD], &[0, UNDEF_DEPREL]);
    assert!(r.is_undefined(1));
    assert_eq!(r.to_conll().0, vec![0, UNDEF_HEAD]);
  }

  #[test]
  fn test_children() {
    let r = Reference::from_conll(&[2, 0, 2], &[1, 0, 1]);
    assert_eq!(r.children(), vec![vec![], vec![0, 2], vec![], vec![1]]);
  }

  #[test]
  fn test_is_tree() {
    assert!(Reference::from_conll(&[2, 0, 2], &[0; 3]).is_tree());
    // two words on the root
    assert!(!Reference::from_conll(&[0, 0], &[0; 2]).is_tree());
    // cycle between 1 and 2, 3 on the root
    assert!(!Reference::from_conll(&[2, 1, 0], &[0; 3]).is_tree());
    // head out of range
    assert!(!Reference::new(vec![2, 7, BAD_HEAD], vec![0; 3]).is_tree());
  }

  #[test]
  #[should_panic(expected = "out of range")]
  fn test_conll_head_past_the_last_word() {
    // head 3 in a two-word sentence would land on the virtual root
    Reference::from_conll(&[2, 3], &[1, 0]);
  }

  #[test]
  fn test_single_root() {
    assert_eq!(Reference::from_conll(&[2, 0, 2], &[0; 3]).single_root(), Some(1));
    assert_eq!(Reference::from_conll(&[0, 0], &[0; 2]).single_root(), None);
    assert_eq!(Reference::from_conll(&[UNDEF_HEAD], &[UNDEF_DEPREL]).single_root(), None);
  }

  #[test]
  fn test_is_projective() {
    assert!(Reference::from_conll(&[2, 0, 2], &[0; 3]).is_projective());
    // 1 <- 3 crosses 2 <- 4
    assert!(!Reference::from_conll(&[3, 4, 0, 3], &[0; 4]).is_projective());
  }

  #[test]
  fn test_root_label_consistency() {
    assert!(Reference::from_conll(&[2, 0, 2], &[1, 0, 1]).has_consistent_root_label(0));
    // the root dependent carries another label
    assert!(!Reference::from_conll(&[2, 0, 2], &[1, 1, 1]).has_consistent_root_label(0));
    // a word below the root carries the root label
    assert!(!Reference::from_conll(&[2, 0, 2], &[0, 0, 1]).has_consistent_root_label(0));
    assert!(Reference::from_conll(&[UNDEF_HEAD, 0], &[UNDEF_DEPREL, 0]).has_consistent_root_label(0));
  }
}
