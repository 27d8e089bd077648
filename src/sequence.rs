//! Sequence matcher
//!
//! Longest-matching-block opcode diff over any `Eq + Hash` sequence. Both
//! the leaf text diff (over characters) and the rendered diff (over chunk
//! signatures) run through the same matcher so that tie-breaks agree
//! between the two engines and with other implementations of the same
//! algorithm:
//! - find the longest matching block in the window, earliest in `a` and
//!   then earliest in `b` on ties
//! - recurse on the left and right remainders
//! - elements occurring in more than 1% of a long `b` (200+) do not seed
//!   matches, but may still extend one
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Opcode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

impl OpTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

/// `a[i1..i2]` becomes `b[j1..j2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

/// Matching block `a[a..a+size] == b[b..b+size]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

const AUTOJUNK_MIN_LEN: usize = 200;

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    /// element → positions in `b`, popular elements removed
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elt) in b.iter().enumerate() {
            b2j.entry(elt).or_default().push(j);
        }
        if b.len() >= AUTOJUNK_MIN_LEN {
            let ntest = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= ntest);
        }
        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` × `b[blo..bhi]`
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0);
        // j → length of the match ending at a[i-1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = next;
        }

        // popular elements never seed a match but may extend one
        while besti > alo && bestj > blo && self.a[besti - 1] == self.b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi
            && bestj + bestsize < bhi
            && self.a[besti + bestsize] == self.b[bestj + bestsize]
        {
            bestsize += 1;
        }

        Match {
            a: besti,
            b: bestj,
            size: bestsize,
        }
    }

    /// Non-adjacent matching blocks, ending with the `(len a, len b, 0)` sentinel
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            blocks.push(m);
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
        }
        blocks.sort();

        let mut collapsed = Vec::with_capacity(blocks.len() + 1);
        let mut current = Match { a: 0, b: 0, size: 0 };
        for m in blocks {
            if current.a + current.size == m.a && current.b + current.size == m.b {
                current.size += m.size;
            } else {
                if current.size > 0 {
                    collapsed.push(current);
                }
                current = m;
            }
        }
        if current.size > 0 {
            collapsed.push(current);
        }
        collapsed.push(Match {
            a: la,
            b: lb,
            size: 0,
        });
        collapsed
    }

    /// Edit script turning `a` into `b`
    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut ops = Vec::new();
        for m in self.matching_blocks() {
            let tag = match (i < m.a, j < m.b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                ops.push(Opcode {
                    tag,
                    i1: i,
                    i2: m.a,
                    j1: j,
                    j2: m.b,
                });
            }
            i = m.a + m.size;
            j = m.b + m.size;
            if m.size > 0 {
                ops.push(Opcode {
                    tag: OpTag::Equal,
                    i1: m.a,
                    i2: i,
                    j1: m.b,
                    j2: j,
                });
            }
        }
        ops
    }
}

/// Shorthand for `SequenceMatcher::new(a, b).opcodes()`
pub fn opcodes<T: Eq + Hash>(a: &[T], b: &[T]) -> Vec<Opcode> {
    SequenceMatcher::new(a, b).opcodes()
}

// ── Text diff ──────────────────────────────────────────────────────────

/// One run of a text edit script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOp {
    pub op: OpTag,
    pub before: String,
    pub after: String,
}

/// Character-level edit script between two strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextDiff {
    pub ops: Vec<TextOp>,
}

impl TextDiff {
    /// True when any run is not `equal`
    pub fn has_changes(&self) -> bool {
        self.ops.iter().any(|op| op.op != OpTag::Equal)
    }

    /// Concatenated before spans
    pub fn before_text(&self) -> String {
        self.ops.iter().map(|op| op.before.as_str()).collect()
    }

    /// Concatenated after spans
    pub fn after_text(&self) -> String {
        self.ops.iter().map(|op| op.after.as_str()).collect()
    }

    /// Non-equal runs
    pub fn changes(&self) -> impl Iterator<Item = &TextOp> {
        self.ops.iter().filter(|op| op.op != OpTag::Equal)
    }
}

/// Diff two strings by character
///
/// Equal inputs give a single `equal` run over the whole string, even when
/// empty, so "diffed, no change" is never an empty script.
pub fn diff_text(before: &str, after: &str) -> TextDiff {
    if before == after {
        return TextDiff {
            ops: vec![TextOp {
                op: OpTag::Equal,
                before: String::from(before),
                after: String::from(after),
            }],
        };
    }
    let a: Vec<char> = before.chars().collect();
    let b: Vec<char> = after.chars().collect();
    let ops = opcodes(&a, &b)
        .into_iter()
        .map(|op| TextOp {
            op: op.tag,
            before: a[op.i1..op.i2].iter().collect(),
            after: b[op.j1..op.j2].iter().collect(),
        })
        .collect();
    TextDiff { ops }
}
