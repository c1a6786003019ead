//! Pattern compiler for combinatorial domain generation.
//!
//! A pattern is a literal template containing one or more bracket
//! expressions, each optionally followed by a repeat count:
//!
//! - `[abc]`: one of the listed characters
//! - `[a-z]`: a contiguous code-point range
//! - `[a-z0-9]`: lists and ranges can be mixed
//! - `{n}`: repeat the preceding bracket expression `n` times
//! - anything else is copied verbatim
//!
//! Ranges are expanded by raw code-point order. A reversed range such as
//! `[z-a]` contributes nothing; if a whole bracket expression ends up empty
//! the pattern is rejected.
//!
//! # Examples
//!
//! ```
//! use gois_lib::pattern::{compile, TotalCount};
//!
//! let (plan, total) = compile("[abc]{2}.org").unwrap();
//! assert_eq!(plan.groups().len(), 2);
//! assert_eq!(total, TotalCount::Exact(9));
//!
//! let names: Vec<String> = plan.combinations().collect();
//! assert_eq!(names[0], "aa.org");
//! assert_eq!(names[8], "cc.org");
//! ```

use crate::error::CompileError;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// The characters one position of a generated name may take.
///
/// Repeated segments share the same backing slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsetGroup {
    chars: Arc<[char]>,
}

impl CharsetGroup {
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Product of all group sizes, or `Overflow` when it does not fit in `u64`.
///
/// Only used for reporting. Generation never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalCount {
    Exact(u64),
    Overflow,
}

impl TotalCount {
    /// The exact count when known, suitable as a progress hint.
    pub fn as_hint(&self) -> Option<u64> {
        match self {
            TotalCount::Exact(n) => Some(*n),
            TotalCount::Overflow => None,
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, TotalCount::Overflow)
    }
}

impl fmt::Display for TotalCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TotalCount::Exact(n) => write!(f, "{}", n),
            TotalCount::Overflow => write!(f, "overflow (> {})", u64::MAX),
        }
    }
}

/// One bracket expression (plus repeat) as it appears in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    /// Byte range of `[...]{n}` inside the template.
    span: Range<usize>,
    /// How many consecutive groups this segment produced.
    repeat: usize,
}

/// A compiled pattern: the template, where its bracket expressions sit, and
/// the ordered charset groups that fill them.
#[derive(Debug, Clone)]
pub struct PatternPlan {
    template: String,
    segments: Vec<Segment>,
    groups: Vec<CharsetGroup>,
    total: TotalCount,
}

impl PatternPlan {
    /// The pattern text this plan was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Groups in generation order; group 0 varies slowest.
    pub fn groups(&self) -> &[CharsetGroup] {
        &self.groups
    }

    /// Byte spans of every bracket expression in the template, left to right.
    pub fn spans(&self) -> Vec<Range<usize>> {
        self.segments.iter().map(|s| s.span.clone()).collect()
    }

    pub fn total(&self) -> TotalCount {
        self.total
    }

    /// Build the domain for one combination of per-group indices.
    ///
    /// Substitution runs right to left so that replacing a span never shifts
    /// the offsets of spans still to be replaced.
    ///
    /// # Panics
    ///
    /// Panics if `indices` does not hold one in-range index per group.
    pub fn render(&self, indices: &[usize]) -> String {
        assert_eq!(indices.len(), self.groups.len(), "one index per group");

        let mut domain = self.template.clone();
        let mut end = self.groups.len();
        for segment in self.segments.iter().rev() {
            let start = end - segment.repeat;
            let fill: String = (start..end)
                .map(|g| self.groups[g].chars[indices[g]])
                .collect();
            domain.replace_range(segment.span.clone(), &fill);
            end = start;
        }
        domain
    }

    /// Lazily enumerate every combination in odometer order.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            plan: self,
            counters: vec![0; self.groups.len()],
            exhausted: self.groups.iter().any(CharsetGroup::is_empty),
        }
    }
}

/// Odometer iterator over a [`PatternPlan`]: the last group advances
/// fastest and carries into the one before it.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    plan: &'a PatternPlan,
    counters: Vec<usize>,
    exhausted: bool,
}

impl Iterator for Combinations<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }

        let domain = self.plan.render(&self.counters);

        // Increment odometer (rightmost first); wrapping the leftmost wheel
        // means every combination has been produced.
        self.exhausted = true;
        for i in (0..self.counters.len()).rev() {
            self.counters[i] += 1;
            if self.counters[i] < self.plan.groups[i].len() {
                self.exhausted = false;
                break;
            }
            self.counters[i] = 0;
        }

        Some(domain)
    }
}

/// Compile a pattern into its plan and combination count.
///
/// The count saturates to [`TotalCount::Overflow`] rather than wrapping;
/// compilation carries on either way.
pub fn compile(pattern: &str) -> Result<(PatternPlan, TotalCount), CompileError> {
    let mut segments = Vec::new();
    let mut groups = Vec::new();
    let mut total = TotalCount::Exact(1);

    let mut cursor = 0;
    while let Some(offset) = pattern[cursor..].find('[') {
        let open = cursor + offset;
        let Some(close_offset) = pattern[open + 1..].find(']') else {
            // An unterminated bracket is plain text.
            break;
        };
        let close = open + 1 + close_offset;
        let charset_def = &pattern[open + 1..close];

        let (repeat, end) = parse_repeat(pattern, close + 1)?;

        let chars = expand_charset(charset_def);
        if chars.is_empty() {
            return Err(CompileError::EmptyCharset {
                charset: charset_def.to_string(),
            });
        }

        let group = CharsetGroup {
            chars: Arc::from(chars),
        };
        for _ in 0..repeat {
            total = match total {
                TotalCount::Exact(n) => n
                    .checked_mul(group.len() as u64)
                    .map_or(TotalCount::Overflow, TotalCount::Exact),
                TotalCount::Overflow => TotalCount::Overflow,
            };
            groups.push(group.clone());
        }

        segments.push(Segment {
            span: open..end,
            repeat,
        });
        cursor = end;
    }

    if segments.is_empty() {
        return Err(CompileError::NoPatternFound {
            pattern: pattern.to_string(),
        });
    }

    let plan = PatternPlan {
        template: pattern.to_string(),
        segments,
        groups,
        total,
    };
    Ok((plan, total))
}

/// Parse an optional `{n}` starting at byte `at`.
///
/// Returns the repeat count and the byte offset just past the segment.
/// Anything that is not `{digits}` leaves the brace as template text.
/// Longest repeat accepted; no domain name is longer than this.
pub const MAX_REPEAT: usize = 253;

fn parse_repeat(pattern: &str, at: usize) -> Result<(usize, usize), CompileError> {
    let rest = &pattern[at..];
    let Some(body) = rest.strip_prefix('{') else {
        return Ok((1, at));
    };
    let digits_len = body.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len == 0 || !body[digits_len..].starts_with('}') {
        return Ok((1, at));
    }

    let digits = &body[..digits_len];
    let end = at + 1 + digits_len + 1;
    let invalid = || CompileError::InvalidRepeat {
        segment: pattern[..end].to_string(),
        value: digits.to_string(),
    };
    match digits.parse::<usize>() {
        Ok(n) if (1..=MAX_REPEAT).contains(&n) => Ok((n, end)),
        _ => Err(invalid()),
    }
}

/// Expand a charset definition into its characters.
///
/// `X-Y` is a range whenever a character is followed by `-` and another
/// character; a leading or trailing `-` is literal.
fn expand_charset(def: &str) -> Vec<char> {
    let chars: Vec<char> = def.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            let (start, end) = (chars[i] as u32, chars[i + 2] as u32);
            out.extend((start..=end).filter_map(char::from_u32));
            i += 3;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}
