// src/scandata/pagenums.rs

//! Page-number interpolation from operator assertions.

use std::collections::BTreeMap;

use crate::scandata::model::{Assertion, PageNumber, PageNumberKind};
use crate::scandata::ScanData;

/// Counts of leaves per page-number tag, used by upload pre-checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageNumberSummary {
    pub asserted: u32,
    pub matched: u32,
    pub mismatched: u32,
    pub unnumbered: u32,
}

impl PageNumberSummary {
    pub fn is_consistent(&self) -> bool {
        self.mismatched == 0
    }
}

/// Interpolate page numbers for leaves `0..=end`.
///
/// `assertions` must be sorted by leaf. Leaves before the first assertion
/// get no number. Between two assertions numbers count up from the first
/// one and are tagged `Match` when the leaf delta equals the page delta,
/// `Mismatch` otherwise. Leaves after the last assertion count up as `Match`.
pub fn interpolate(assertions: &[Assertion], end: u32) -> BTreeMap<u32, PageNumber> {
    let relevant: Vec<&Assertion> = assertions.iter().filter(|a| a.leaf_num <= end).collect();
    let mut numbers = BTreeMap::new();

    for (i, current) in relevant.iter().enumerate() {
        numbers.insert(
            current.leaf_num,
            PageNumber {
                num: current.page_num,
                kind: PageNumberKind::Assert,
            },
        );

        let next = relevant.get(i + 1);
        let (stop, kind) = match next {
            Some(next) => {
                let leaf_delta = i64::from(next.leaf_num) - i64::from(current.leaf_num);
                let page_delta = i64::from(next.page_num) - i64::from(current.page_num);
                let kind = if leaf_delta == page_delta {
                    PageNumberKind::Match
                } else {
                    PageNumberKind::Mismatch
                };
                (next.leaf_num, kind)
            }
            None => (end.saturating_add(1), PageNumberKind::Match),
        };

        for leaf in current.leaf_num + 1..stop {
            numbers.insert(
                leaf,
                PageNumber {
                    num: current.page_num.saturating_add(leaf - current.leaf_num),
                    kind,
                },
            );
        }
    }

    numbers
}

impl ScanData {
    /// Rewrite `pageNumber` on leaves `0..=end` from the assertion table.
    pub fn compute_page_nums(&mut self, end: u32) {
        let numbers = interpolate(&self.book_data.page_num_data.assertions, end);
        for (leaf, data) in self.page_data.range_mut(..=end) {
            data.page_number = numbers.get(leaf).copied();
        }
    }

    /// Re-interpolate the whole book.
    pub(crate) fn recompute_page_nums(&mut self) {
        if let Some(max) = self.max_leaf_number() {
            self.compute_page_nums(max);
        }
    }

    pub fn page_number_summary(&self) -> PageNumberSummary {
        let mut summary = PageNumberSummary::default();
        for data in self.page_data.values() {
            match data.page_number.map(|p| p.kind) {
                Some(PageNumberKind::Assert) => summary.asserted += 1,
                Some(PageNumberKind::Match) => summary.matched += 1,
                Some(PageNumberKind::Mismatch) => summary.mismatched += 1,
                None => summary.unnumbered += 1,
            }
        }
        summary
    }

    pub fn mismatched_leaves(&self) -> Vec<u32> {
        self.page_data
            .iter()
            .filter(|(_, d)| matches!(d.page_number, Some(p) if p.kind == PageNumberKind::Mismatch))
            .map(|(leaf, _)| *leaf)
            .collect()
    }
}
