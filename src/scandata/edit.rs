// src/scandata/edit.rs

//! ScanData mutators.
//!
//! Every mutator keeps `pageData`, the leaf index and the assertion table in
//! step, and publishes a single [`ChangeReport`] when it is done.

use serde_json::Value;
use tracing::debug;

use crate::errors::{BookflowError, Result};
use crate::scandata::index::ChangeReport;
use crate::scandata::model::{Assertion, LeafData, PageType};
use crate::scandata::ScanData;
use crate::types::Side;

impl ScanData {
    /// Append one captured leaf at the end of the book.
    pub fn append_leaf(&mut self, side: Side, page_type: PageType, capture_time: Option<i64>) -> u32 {
        let mut report = ChangeReport::new();
        let leaf = self.push_leaf(side, page_type, capture_time, &mut report);
        self.recompute_page_nums();
        self.publish(report);
        leaf
    }

    /// Append a two-sided spread (LEFT then RIGHT) captured in one shot.
    pub fn append_spread(&mut self, capture_time: Option<i64>) -> (u32, u32) {
        let mut report = ChangeReport::new();
        let left = self.push_leaf(Side::Left, PageType::Normal, capture_time, &mut report);
        let right = self.push_leaf(Side::Right, PageType::Normal, capture_time, &mut report);
        self.recompute_page_nums();
        self.publish(report);
        (left, right)
    }

    /// Insert a new leaf at `leaf`, shifting every later leaf up by one.
    ///
    /// Inserting at `leaf_count()` is a plain append.
    pub fn insert_leaf(&mut self, leaf: u32, side: Side, page_type: PageType) -> Result<()> {
        let end = self.leaf_count();
        if leaf > end {
            return Err(BookflowError::Precondition(format!(
                "cannot insert leaf {leaf}: book has {end} leaves"
            )));
        }

        let mut report = ChangeReport::new();

        // Pop the tail in descending order so the stack replays ascending.
        let mut stack = Vec::new();
        while let Some((&last, _)) = self.page_data.last_key_value() {
            if last < leaf {
                break;
            }
            if let Some(data) = self.page_data.remove(&last) {
                self.index.remove(last, &data, &mut report);
                stack.push(data);
            }
        }

        let data = self.new_leaf_data(side, page_type, None);
        self.index.add(leaf, &data, &mut report);
        self.page_data.insert(leaf, data);

        let mut next = leaf + 1;
        while let Some(data) = stack.pop() {
            self.index.add(next, &data, &mut report);
            self.page_data.insert(next, data);
            next += 1;
        }

        for assertion in self.book_data.page_num_data.assertions.iter_mut() {
            if assertion.leaf_num >= leaf {
                assertion.leaf_num += 1;
            }
        }

        debug!(leaf, shifted = end - leaf, "inserted leaf");
        self.recompute_page_nums();
        self.publish(report);
        Ok(())
    }

    /// Remove leaves `left..=right`, shifting later leaves down.
    pub fn delete_spread(&mut self, left: u32, right: u32) -> Result<()> {
        let Some(max) = self.max_leaf_number() else {
            return Err(BookflowError::Precondition(
                "cannot delete from an empty book".to_string(),
            ));
        };
        if left > right || right > max {
            return Err(BookflowError::Precondition(format!(
                "invalid delete range {left}..={right} (last leaf is {max})"
            )));
        }
        if left == 0 && right == max {
            self.delete_all();
            return Ok(());
        }

        let removed = right - left + 1;
        let mut report = ChangeReport::new();

        for leaf in left..=right {
            if let Some(data) = self.page_data.remove(&leaf) {
                self.index.remove(leaf, &data, &mut report);
            }
        }

        let assertions = &mut self.book_data.page_num_data.assertions;
        if right == max {
            // Trailing range: nothing to shift, drop what pointed into it.
            assertions.retain(|a| a.leaf_num < left);
        } else {
            let tail: Vec<u32> = self.page_data.range(right + 1..).map(|(k, _)| *k).collect();
            for old in tail {
                if let Some(data) = self.page_data.remove(&old) {
                    self.index.remove(old, &data, &mut report);
                    let new = old - removed;
                    self.index.add(new, &data, &mut report);
                    self.page_data.insert(new, data);
                }
            }

            assertions.retain(|a| a.leaf_num < left || a.leaf_num > right);
            for assertion in assertions.iter_mut() {
                if assertion.leaf_num > right {
                    assertion.leaf_num -= removed;
                }
            }
        }

        debug!(left, right, removed, "deleted spread");
        self.recompute_page_nums();
        self.publish(report);
        Ok(())
    }

    /// Drop every leaf, the assertion table and the index in one step.
    pub fn delete_all(&mut self) {
        let mut report = ChangeReport::new();
        self.index.clear(&mut report);
        self.page_data.clear();
        self.book_data.page_num_data.assertions.clear();
        debug!("cleared all leaves");
        self.publish(report);
    }

    pub fn set_page_type(&mut self, leaf: u32, page_type: PageType) -> Result<()> {
        self.set_page_types(&[(leaf, page_type)])
    }

    /// Change several leaves' page types as one logical operation.
    ///
    /// Either every leaf exists and all are updated, or nothing changes.
    pub fn set_page_types(&mut self, changes: &[(u32, PageType)]) -> Result<()> {
        for (leaf, _) in changes {
            self.require_leaf(*leaf)?;
        }

        let mut report = ChangeReport::new();
        for (leaf, page_type) in changes {
            self.update_leaf(*leaf, &mut report, |data| data.page_type = *page_type);
        }
        self.publish(report);
        Ok(())
    }

    /// Set or clear the operator note on a leaf.
    pub fn set_note(&mut self, leaf: u32, note: Option<String>) -> Result<()> {
        self.require_leaf(leaf)?;
        let note = note.filter(|n| !n.is_empty());
        let mut report = ChangeReport::new();
        self.update_leaf(leaf, &mut report, |data| data.note = note);
        self.publish(report);
        Ok(())
    }

    pub fn set_rotate_degree(&mut self, leaf: u32, degrees: i32) -> Result<()> {
        let data = self.leaf_mut(leaf)?;
        data.rotate_degree = degrees;
        Ok(())
    }

    /// Set a free-form attribute on a leaf (e.g. `blurriness`).
    pub fn set_leaf_attribute(&mut self, leaf: u32, key: impl Into<String>, value: Value) -> Result<()> {
        let data = self.leaf_mut(leaf)?;
        data.extra.insert(key.into(), value);
        Ok(())
    }

    /// Record an operator-confirmed page number and re-interpolate.
    pub fn assert_page_number(&mut self, leaf: u32, page_num: u32) -> Result<()> {
        self.require_leaf(leaf)?;
        let assertions = &mut self.book_data.page_num_data.assertions;
        match assertions.binary_search_by_key(&leaf, |a| a.leaf_num) {
            Ok(pos) => assertions[pos].page_num = page_num,
            Err(pos) => assertions.insert(
                pos,
                Assertion {
                    leaf_num: leaf,
                    page_num,
                },
            ),
        }
        self.recompute_page_nums();
        Ok(())
    }

    /// Forget the assertion on `leaf`, if any, and re-interpolate.
    pub fn remove_page_number_assertion(&mut self, leaf: u32) -> Result<bool> {
        self.require_leaf(leaf)?;
        let assertions = &mut self.book_data.page_num_data.assertions;
        let before = assertions.len();
        assertions.retain(|a| a.leaf_num != leaf);
        let removed = assertions.len() != before;
        if removed {
            self.recompute_page_nums();
        }
        Ok(removed)
    }

    fn push_leaf(
        &mut self,
        side: Side,
        page_type: PageType,
        capture_time: Option<i64>,
        report: &mut ChangeReport,
    ) -> u32 {
        let leaf = self.leaf_count();
        let data = self.new_leaf_data(side, page_type, capture_time);
        self.index.add(leaf, &data, report);
        self.page_data.insert(leaf, data);
        leaf
    }

    fn new_leaf_data(&self, side: Side, page_type: PageType, capture_time: Option<i64>) -> LeafData {
        let mut data = LeafData::new(side, page_type);
        data.ppi = self.book_data.ppi;
        data.capture_time = capture_time;
        data
    }

    /// Apply `f` to a leaf, re-indexing it around the change.
    fn update_leaf(&mut self, leaf: u32, report: &mut ChangeReport, f: impl FnOnce(&mut LeafData)) {
        let Some(data) = self.page_data.get_mut(&leaf) else {
            return;
        };
        let before = data.clone();
        f(data);
        if before.page_type != data.page_type || before.has_note() != data.has_note() {
            let after = data.clone();
            self.index.remove(leaf, &before, report);
            self.index.add(leaf, &after, report);
        }
    }

    fn require_leaf(&self, leaf: u32) -> Result<()> {
        if self.page_data.contains_key(&leaf) {
            Ok(())
        } else {
            Err(BookflowError::Precondition(format!("no such leaf: {leaf}")))
        }
    }

    fn leaf_mut(&mut self, leaf: u32) -> Result<&mut LeafData> {
        self.page_data
            .get_mut(&leaf)
            .ok_or_else(|| BookflowError::Precondition(format!("no such leaf: {leaf}")))
    }
}
