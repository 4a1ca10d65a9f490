//! String-based Tag Collection
//!
//! A sorted, de-duplicated `SmallVec<[String; 5]>` of tags. Goods types in a cart and
//! the goods types a coupon template may be used against are both expressed this way.

use std::{
    cmp::Ordering,
    ops::{BitOr, BitOrAssign},
    string::ToString,
};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A string-based tag collection kept sorted for linear-time set operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SmallVec<[String; 5]>", into = "SmallVec<[String; 5]>")]
pub struct StringTagCollection {
    tags: SmallVec<[String; 5]>,
}

impl StringTagCollection {
    /// Create a new string tag collection from a vector of strings.
    #[must_use]
    pub fn new(tags: SmallVec<[String; 5]>) -> Self {
        let mut collection = Self { tags };

        collection.tags.sort();
        collection.tags.dedup();

        collection
    }

    /// Create a new string tag collection from string slices.
    pub fn from_strs(tags: &[&str]) -> Self {
        Self::new(
            tags.iter()
                .map(ToString::to_string)
                .collect::<SmallVec<[String; 5]>>(),
        )
    }

    /// Create an empty collection.
    pub fn empty() -> Self {
        Self {
            tags: SmallVec::with_capacity(0),
        }
    }

    /// Check if this collection contains a specific tag.
    pub fn contains(&self, tag: &str) -> bool {
        self.tags
            .binary_search_by(|probe| probe.as_str().cmp(tag))
            .is_ok()
    }

    /// Check if this collection is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Get the number of tags in this collection.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Iterate over the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Add a tag to this collection.
    pub fn add(&mut self, tag: &str) {
        if let Err(pos) = self.tags.binary_search_by(|probe| probe.as_str().cmp(tag)) {
            self.tags.insert(pos, tag.to_string());
        }
    }

    /// Tags present in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = SmallVec::new();
        let mut right = other.tags.iter().peekable();

        for tag in &self.tags {
            while right.next_if(|candidate| *candidate < tag).is_some() {}

            if right.peek().is_none_or(|candidate| *candidate != tag) {
                result.push(tag.clone());
            }
        }

        Self { tags: result }
    }

    /// Whether every tag in `self` is also in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }
}

impl From<SmallVec<[String; 5]>> for StringTagCollection {
    fn from(tags: SmallVec<[String; 5]>) -> Self {
        Self::new(tags)
    }
}

impl From<StringTagCollection> for SmallVec<[String; 5]> {
    fn from(collection: StringTagCollection) -> Self {
        collection.tags
    }
}

impl FromIterator<String> for StringTagCollection {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl BitOr for StringTagCollection {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self |= rhs;
        self
    }
}

impl BitOrAssign for StringTagCollection {
    fn bitor_assign(&mut self, rhs: Self) {
        let capacity = self.tags.len().saturating_add(rhs.tags.len());
        let mut result = SmallVec::with_capacity(capacity);
        let mut left = std::mem::take(&mut self.tags).into_iter().peekable();
        let mut right = rhs.tags.into_iter().peekable();

        // Merge two sorted vectors (union).
        while let (Some(left_tag), Some(right_tag)) = (left.peek(), right.peek()) {
            match left_tag.cmp(right_tag) {
                Ordering::Less => result.extend(left.next()),
                Ordering::Greater => result.extend(right.next()),
                Ordering::Equal => {
                    result.extend(left.next());
                    right.next();
                }
            }
        }

        result.extend(left);
        result.extend(right);

        self.tags = result;
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn string_collection_deduplicates_and_sorts() {
        let tags = StringTagCollection::from_strs(&["leisure", "furniture", "leisure", "apparel"]);

        assert_eq!(tags.len(), 3);
        assert_eq!(
            tags.iter().collect::<Vec<_>>(),
            ["apparel", "furniture", "leisure"]
        );
    }

    #[test]
    fn string_collection_contains_and_add() {
        let mut tags = StringTagCollection::from_strs(&["furniture"]);

        assert!(tags.contains("furniture"));
        assert!(!tags.contains("leisure"));

        tags.add("leisure");
        tags.add("leisure");

        assert!(tags.contains("leisure"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn string_collection_union() {
        let left = StringTagCollection::from_strs(&["a", "c", "e"]);
        let right = StringTagCollection::from_strs(&["b", "c", "d"]);

        let union = left | right;

        assert_eq!(union.iter().collect::<Vec<_>>(), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn string_collection_difference() {
        let cart = StringTagCollection::from_strs(&["apparel", "furniture", "leisure"]);
        let allowed = StringTagCollection::from_strs(&["furniture", "groceries"]);

        let missing = cart.difference(&allowed);

        assert_eq!(missing.iter().collect::<Vec<_>>(), ["apparel", "leisure"]);
        assert!(!cart.is_subset(&allowed));
    }

    #[test]
    fn string_collection_subset_of_itself_and_superset() {
        let cart = StringTagCollection::from_strs(&["leisure"]);
        let allowed = StringTagCollection::from_strs(&["furniture", "leisure"]);

        assert!(cart.is_subset(&cart));
        assert!(cart.is_subset(&allowed));
        assert!(StringTagCollection::empty().is_subset(&cart));
    }

    #[test]
    fn string_collection_deserializes_sorted() -> TestResult {
        let tags: StringTagCollection = serde_norway::from_str("[zebra, apple, zebra]")?;

        assert_eq!(tags, StringTagCollection::from_strs(&["apple", "zebra"]));

        Ok(())
    }
}
