//! A one-line text format for reference trees.
//!
//! Each whitespace-separated token is `HEAD:LABEL` for the word at that
//! position, with 1-based heads and `0` for the root, or `_` for a word left
//! unannotated. `#` starts a comment that runs to the end of the line.
//!
//! ```text
//! 2:det 3:nsubj 0:root 3:obj   # the cat saw it
//! ```

use regex::Regex;

use crate::alphabet::Alphabet;
use crate::reference::{Reference, BAD_HEAD, UNDEF_DEPREL, UNDEF_HEAD};
use crate::Err;

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => (Some(m.as_str()), &s[m.end()..]),
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {:?}", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {:?}", c, s).into())
  }
}

/// Skips whitespace and comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(\s|#[^\n]*)*");
  optional_re(&*WHITESPACE_OR_COMMENT, s).1
}

/// Parses `_` or `HEAD:LABEL`, adding the label to `deprels`
fn parse_token<'a>(s: &'a str, deprels: &mut Alphabet) -> ParseResult<'a, (usize, usize)> {
  regex_static!(HEAD, r"\d+");
  regex_static!(LABEL, r"[^\s#:]+");

  if let (Some(_), rest) = optional_char('_', s) {
    return Ok(((UNDEF_HEAD, UNDEF_DEPREL), rest));
  }
  let (head, s) = needed_re(&*HEAD, s).map_err(|e| -> Err { format!("head: {}", e).into() })?;
  let (_, s) = needed_char(':', s)?;
  let (label, s) = needed_re(&*LABEL, s).map_err(|e| -> Err { format!("label: {}", e).into() })?;

  Ok(((head.parse()?, deprels.insert(label)), s))
}

/// Parses one sentence. Labels not yet in `deprels` are added to it.
///
/// Errors on malformed tokens, on an empty sentence and on heads that point
/// outside the sentence or at the word itself. Whether the result is a tree
/// is left to [`Reference::is_tree`].
pub fn parse_tree(s: &str, deprels: &mut Alphabet) -> Result<Reference, Err> {
  let mut heads = Vec::new();
  let mut labels = Vec::new();

  let mut rem = skip_whitespace(s);
  while !rem.is_empty() {
    let ((head, label), s) = parse_token(rem, deprels)
      .map_err(|e| -> Err { format!("token {}: {}", heads.len() + 1, e).into() })?;
    heads.push(head);
    labels.push(label);
    rem = skip_whitespace(s);
  }

  if heads.is_empty() {
    return Err("empty sentence".into());
  }
  for (idx, &head) in heads.iter().enumerate() {
    if head == UNDEF_HEAD {
      continue;
    }
    if head > heads.len() {
      return Err(format!("token {}: head {} out of range", idx + 1, head).into());
    }
    if head == idx + 1 {
      return Err(format!("token {}: attached to itself", idx + 1).into());
    }
  }

  Ok(Reference::from_conll(&heads, &labels))
}

/// Parses every non-blank line of `s` as a sentence
pub fn parse_trees(s: &str, deprels: &mut Alphabet) -> Result<Vec<Reference>, Err> {
  let mut trees = Vec::new();
  for (lineno, line) in s.lines().enumerate() {
    if skip_whitespace(line).is_empty() {
      continue;
    }
    let tree = parse_tree(line, deprels).map_err(|e| -> Err { format!("line {}: {}", lineno + 1, e).into() })?;
    trees.push(tree);
  }
  Ok(trees)
}

/// Formats a reference (or a partial parse turned into one) in the same
/// notation. Words with no head yet print as `?`.
pub fn format_tree(reference: &Reference, deprels: &Alphabet) -> String {
  let (heads, labels) = reference.to_conll();
  heads
    .iter()
    .zip(labels.iter())
    .map(|(&head, &label)| match head {
      UNDEF_HEAD => "_".to_string(),
      BAD_HEAD => "?".to_string(),
      head => format!("{}:{}", head, deprels.label(label)),
    })
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_tree() {
    let mut deprels: Alphabet = ["root"].iter().collect();
    let r = parse_tree("2:det 3:nsubj 0:root 3:obj   # the cat saw it", &mut deprels).unwrap();
    assert_eq!(r.len(), 5);
    assert_eq!(r.heads, vec![1, 2, 4, 2, BAD_HEAD]);
    assert_eq!(deprels.len(), 4);
    assert_eq!(r.deprel(2), deprels.get("root").unwrap());
    assert!(r.is_tree());
    assert_eq!(format_tree(&r, &deprels), "2:det 3:nsubj 0:root 3:obj");
  }

  #[test]
  fn test_undefined_tokens() {
    let mut deprels = Alphabet::new();
    let r = parse_tree("_ 0:root _", &mut deprels).unwrap();
    assert!(r.is_undefined(0));
    assert!(r.is_undefined(2));
    assert_eq!(r.deprel(0), UNDEF_DEPREL);
    assert_eq!(format_tree(&r, &deprels), "_ 0:root _");
  }

  #[test]
  fn test_parse_errors() {
    let mut deprels = Alphabet::new();
    assert!(parse_tree("", &mut deprels).is_err());
    assert!(parse_tree("   # only a comment", &mut deprels).is_err());
    assert!(parse_tree("0:root 3:obj", &mut deprels).is_err());
    assert!(parse_tree("1:dep 0:root", &mut deprels).is_err());
    assert!(parse_tree("0:root cat", &mut deprels).is_err());
    assert!(parse_tree("0:root 1:", &mut deprels).is_err());
    assert!(parse_tree("0root", &mut deprels).is_err());
  }

  #[test]
  fn test_parse_trees() {
    let mut deprels = Alphabet::new();
    let text = "# a small corpus\n0:root 1:dep\n\n2:dep 0:root # second\n";
    let trees = parse_trees(text, &mut deprels).unwrap();
    assert_eq!(trees.len(), 2);
    assert_eq!(trees[1].heads, vec![1, 2, BAD_HEAD]);

    let err = parse_trees("0:root\n0:root x\n", &mut deprels).unwrap_err();
    assert!(err.to_string().starts_with("line 2"));
  }
}
