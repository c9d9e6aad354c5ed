//! Sequence sets for message ranges.

use super::SeqNum;

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Builds the most compact set covering exactly `ids`.
    ///
    /// Duplicates are ignored and consecutive numbers collapse into ranges.
    /// Returns `None` for an empty slice, since IMAP has no empty set syntax.
    #[must_use]
    pub fn from_ids(ids: &[SeqNum]) -> Option<Self> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut runs: Vec<Self> = Vec::new();
        let mut iter = sorted.into_iter();
        let first = iter.next()?;
        let (mut start, mut end) = (first, first);

        for id in iter {
            if end.get().checked_add(1) == Some(id.get()) {
                end = id;
            } else {
                runs.push(Self::run(start, end));
                start = id;
                end = id;
            }
        }
        runs.push(Self::run(start, end));

        Some(if runs.len() == 1 {
            runs.remove(0)
        } else {
            Self::Set(runs)
        })
    }

    fn run(start: SeqNum, end: SeqNum) -> Self {
        if start == end {
            Self::Single(start)
        } else {
            Self::Range(start, end)
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                f.write_str(&s.join(","))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(values: &[u32]) -> Vec<SeqNum> {
        values.iter().map(|&n| SeqNum::new(n).unwrap()).collect()
    }

    #[test]
    fn empty_has_no_set() {
        assert!(SequenceSet::from_ids(&[]).is_none());
    }

    #[test]
    fn single_and_range() {
        assert_eq!(SequenceSet::from_ids(&ids(&[7])).unwrap().to_string(), "7");
        assert_eq!(
            SequenceSet::from_ids(&ids(&[3, 4, 5])).unwrap().to_string(),
            "3:5"
        );
    }

    #[test]
    fn unsorted_with_gaps_and_duplicates() {
        let set = SequenceSet::from_ids(&ids(&[9, 1, 2, 2, 5, 10, 11])).unwrap();
        assert_eq!(set.to_string(), "1:2,5,9:11");
    }

    proptest! {
        #[test]
        fn covers_exactly_the_input(values in proptest::collection::btree_set(1u32..500, 1..40)) {
            let input: Vec<SeqNum> = values.iter().map(|&n| SeqNum::new(n).unwrap()).collect();
            let rendered = SequenceSet::from_ids(&input).unwrap().to_string();

            let mut expanded = Vec::new();
            for part in rendered.split(',') {
                match part.split_once(':') {
                    Some((a, b)) => expanded.extend(a.parse::<u32>().unwrap()..=b.parse::<u32>().unwrap()),
                    None => expanded.push(part.parse::<u32>().unwrap()),
                }
            }
            prop_assert_eq!(expanded, values.into_iter().collect::<Vec<_>>());
        }
    }
}
