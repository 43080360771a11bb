//! Rank-range selectors such as `"1, 4-6"`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest rank the scoring service exposes for leaderboards and top plays
pub const MAX_RANK: u32 = 100;

/// A parsed, non-empty set of ranks in `1..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Span {
    ranks: BTreeSet<u32>,
}

impl Span {
    /// Every rank the service can return
    pub fn full() -> Self {
        Self {
            ranks: (1..=MAX_RANK).collect(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut ranks = BTreeSet::new();

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::InvalidSpan(format!("empty element in '{}'", s)));
            }

            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_rank(start, s)?;
                    let end = parse_rank(end, s)?;
                    if start > end {
                        return Err(Error::InvalidSpan(format!(
                            "reversed range {}-{} in '{}'",
                            start, end, s
                        )));
                    }
                    ranks.extend(start..=end);
                }
                None => {
                    ranks.insert(parse_rank(part, s)?);
                }
            }
        }

        Ok(Self { ranks })
    }

    pub fn min(&self) -> u32 {
        self.ranks.first().copied().unwrap_or(1)
    }

    pub fn max(&self) -> u32 {
        self.ranks.last().copied().unwrap_or(1)
    }

    pub fn contains(&self, rank: u32) -> bool {
        self.ranks.contains(&rank)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Ranks in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranks.iter().copied()
    }

    /// Pick the elements of a rank-ordered list selected by this span.
    ///
    /// Ranks past the end of `items` are skipped.
    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        self.iter()
            .filter_map(|rank| items.get(rank as usize - 1).cloned())
            .collect()
    }
}

fn parse_rank(value: &str, whole: &str) -> Result<u32> {
    let rank: u32 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidSpan(format!("'{}' is not a number in '{}'", value.trim(), whole)))?;
    if rank == 0 || rank > MAX_RANK {
        return Err(Error::InvalidSpan(format!(
            "{} is outside 1-{} in '{}'",
            rank, MAX_RANK, whole
        )));
    }
    Ok(rank)
}

impl FromStr for Span {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Span {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Span> for String {
    fn from(span: Span) -> Self {
        span.to_string()
    }
}

impl fmt::Display for Span {
    /// Collapses consecutive ranks back into ranges (`1,4-6`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let mut iter = self.iter().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{}-{}", start, end));
            }
        }
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges_and_singles() {
        let span = Span::parse("1, 4-6").unwrap();
        assert_eq!(span.iter().collect::<Vec<_>>(), vec![1, 4, 5, 6]);
        assert_eq!(span.min(), 1);
        assert_eq!(span.max(), 6);
        assert!(span.contains(5));
        assert!(!span.contains(2));
    }

    #[test]
    fn test_overlapping_ranges_collapse() {
        let span: Span = "1-3,6,2-4".parse().unwrap();
        assert_eq!(span.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 6]);
        assert_eq!(span.to_string(), "1-4,6");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(Span::parse("").is_err());
        assert!(Span::parse("0").is_err());
        assert!(Span::parse("5-2").is_err());
        assert!(Span::parse("1,,2").is_err());
        assert!(Span::parse("a-3").is_err());
        assert!(Span::parse("99-101").is_err());
        assert!(Span::parse("-3").is_err());
    }

    #[test]
    fn test_select_skips_missing_ranks() {
        let span = Span::parse("1,3,5").unwrap();
        let items = vec!['a', 'b', 'c', 'd'];
        assert_eq!(span.select(&items), vec!['a', 'c']);
    }

    #[test]
    fn test_full_span() {
        let span = Span::full();
        assert_eq!(span.len(), 100);
        assert_eq!(span.to_string(), "1-100");
    }

    #[test]
    fn test_serde_as_string() {
        let span: Span = serde_json::from_str("\"2-3\"").unwrap();
        assert_eq!(span.iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(serde_json::to_string(&span).unwrap(), "\"2-3\"");
        assert!(serde_json::from_str::<Span>("\"0\"").is_err());
    }
}
