mod common;
use crate::common::{ScanDataBuilder, TestResult};

use std::sync::{Arc, Mutex};

use bookflow::errors::BookflowError;
use bookflow::scandata::{
    Assertion, ChangeReport, IndexKey, PageNumber, PageNumberKind, PageType, ScanData,
};
use bookflow::types::Side;

fn assertions(scandata: &ScanData) -> Vec<(u32, u32)> {
    scandata
        .assertions()
        .iter()
        .map(|Assertion { leaf_num, page_num }| (*leaf_num, *page_num))
        .collect()
}

fn number(scandata: &ScanData, leaf: u32) -> Option<(u32, PageNumberKind)> {
    scandata.page_number(leaf).map(|PageNumber { num, kind }| (num, kind))
}

/// Collects every change report published by `scandata`.
fn record_reports(scandata: &mut ScanData) -> Arc<Mutex<Vec<ChangeReport>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    scandata.subscribe(move |report| sink.lock().unwrap().push(report.clone()));
    reports
}

#[test]
fn test_interpolation_between_and_after_assertions() -> TestResult {
    let mut scandata = ScanDataBuilder::new()
        .leaves(8)
        .assert(1, 1)
        .assert(3, 3)
        .assert(5, 50)
        .build();

    scandata.compute_page_nums(7);

    assert_eq!(number(&scandata, 0), None);
    assert_eq!(number(&scandata, 1), Some((1, PageNumberKind::Assert)));
    assert_eq!(number(&scandata, 2), Some((2, PageNumberKind::Match)));
    assert_eq!(number(&scandata, 3), Some((3, PageNumberKind::Assert)));
    assert_eq!(number(&scandata, 4), Some((4, PageNumberKind::Mismatch)));
    assert_eq!(number(&scandata, 5), Some((50, PageNumberKind::Assert)));
    assert_eq!(number(&scandata, 6), Some((51, PageNumberKind::Match)));
    assert_eq!(number(&scandata, 7), Some((52, PageNumberKind::Match)));

    let summary = scandata.page_number_summary();
    assert_eq!(summary.asserted, 3);
    assert_eq!(summary.matched, 3);
    assert_eq!(summary.mismatched, 1);
    assert_eq!(summary.unnumbered, 1);
    assert!(!summary.is_consistent());
    assert_eq!(scandata.mismatched_leaves(), vec![4]);
    Ok(())
}

#[test]
fn test_removing_last_assertion_clears_numbers() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(6).assert(0, 10).build();
    assert_eq!(number(&scandata, 5), Some((15, PageNumberKind::Match)));

    scandata.remove_page_number_assertion(0)?;
    assert_eq!(number(&scandata, 5), None);
    Ok(())
}

#[test]
fn test_insert_at_end_is_append() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(3).build();
    let before: Vec<_> = scandata.page_data().values().cloned().collect();

    scandata.insert_leaf(3, Side::Right, PageType::Foldout)?;

    assert_eq!(scandata.leaf_count(), 4);
    let after: Vec<_> = scandata.page_data().values().take(3).cloned().collect();
    assert_eq!(before, after);
    assert_eq!(scandata.page_type(3), Some(PageType::Foldout));
    Ok(())
}

#[test]
fn test_insert_shifts_tail_and_assertions() -> TestResult {
    let mut scandata = ScanDataBuilder::new()
        .leaves(5)
        .page_type(3, PageType::Chapter)
        .assert(1, 1)
        .assert(3, 3)
        .build();

    scandata.insert_leaf(2, Side::Left, PageType::Tissue)?;

    assert_eq!(scandata.leaf_count(), 6);
    assert_eq!(scandata.page_type(2), Some(PageType::Tissue));
    assert_eq!(scandata.page_type(4), Some(PageType::Chapter));
    assert_eq!(scandata.leaves_of(PageType::Chapter), vec![4]);
    assert_eq!(assertions(&scandata), vec![(1, 1), (4, 3)]);

    // Three leaves now sit between pages 1 and 3.
    assert_eq!(number(&scandata, 2), Some((2, PageNumberKind::Mismatch)));
    assert_eq!(number(&scandata, 4), Some((3, PageNumberKind::Assert)));
    assert_eq!(number(&scandata, 5), Some((4, PageNumberKind::Match)));
    assert_eq!(scandata.index(), &scandata.rebuilt_index());
    Ok(())
}

#[test]
fn test_insert_past_end_is_rejected() {
    let mut scandata = ScanDataBuilder::new().leaves(2).build();
    let err = scandata
        .insert_leaf(5, Side::Left, PageType::Normal)
        .unwrap_err();
    assert!(matches!(err, BookflowError::Precondition(_)));
    assert_eq!(scandata.leaf_count(), 2);
}

#[test]
fn test_delete_trailing_spread_keeps_earlier_assertion() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(4).assert(1, 1).build();

    scandata.delete_spread(2, 3)?;

    assert_eq!(scandata.leaf_count(), 2);
    assert_eq!(assertions(&scandata), vec![(1, 1)]);
    Ok(())
}

#[test]
fn test_delete_spread_drops_assertions_inside_range() -> TestResult {
    let mut scandata = ScanDataBuilder::new()
        .leaves(6)
        .assert(1, 1)
        .assert(2, 2)
        .build();

    scandata.delete_spread(2, 3)?;

    assert_eq!(assertions(&scandata), vec![(1, 1)]);
    assert_eq!(number(&scandata, 3), Some((3, PageNumberKind::Match)));
    Ok(())
}

#[test]
fn test_delete_spread_shifts_later_assertions_by_deleted_count() -> TestResult {
    let mut scandata = ScanDataBuilder::new()
        .leaves(8)
        .page_type(6, PageType::Index)
        .assert(1, 1)
        .assert(5, 5)
        .build();

    scandata.delete_spread(2, 3)?;

    assert_eq!(scandata.leaf_count(), 6);
    assert_eq!(assertions(&scandata), vec![(1, 1), (3, 5)]);
    assert_eq!(scandata.leaves_of(PageType::Index), vec![4]);
    // Two leaves gone but page numbers still jump by four.
    assert_eq!(number(&scandata, 2), Some((2, PageNumberKind::Mismatch)));
    assert_eq!(scandata.index(), &scandata.rebuilt_index());
    Ok(())
}

#[test]
fn test_delete_whole_book_clears_everything() -> TestResult {
    let mut scandata = ScanDataBuilder::new()
        .spreads(2)
        .note(1, "smudge")
        .assert(0, 1)
        .build();
    let reports = record_reports(&mut scandata);

    scandata.delete_spread(0, 3)?;

    assert!(scandata.is_empty());
    assert!(scandata.assertions().is_empty());
    assert_eq!(scandata.index().keys().count(), 0);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains(PageType::Normal));
    assert!(reports[0].contains(IndexKey::Note));
    Ok(())
}

#[test]
fn test_invalid_delete_range_is_rejected() {
    let mut scandata = ScanDataBuilder::new().leaves(3).build();

    assert!(matches!(
        scandata.delete_spread(2, 1),
        Err(BookflowError::Precondition(_))
    ));
    assert!(matches!(
        scandata.delete_spread(1, 9),
        Err(BookflowError::Precondition(_))
    ));
    assert!(matches!(
        ScanData::new().delete_spread(0, 0),
        Err(BookflowError::Precondition(_))
    ));
}

#[test]
fn test_batch_page_type_change_publishes_one_report() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(6).build();
    let reports = record_reports(&mut scandata);

    scandata.set_page_types(&[
        (0, PageType::Cover),
        (1, PageType::Title),
        (2, PageType::Title),
        (5, PageType::Cover),
    ])?;

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1, "one logical operation, one report");
    let keys: Vec<IndexKey> = reports[0].keys().collect();
    assert_eq!(
        keys,
        vec![
            IndexKey::PageType(PageType::Normal),
            IndexKey::PageType(PageType::Cover),
            IndexKey::PageType(PageType::Title),
        ]
    );
    Ok(())
}

#[test]
fn test_batch_with_missing_leaf_changes_nothing() {
    let mut scandata = ScanDataBuilder::new().leaves(3).build();
    let reports = record_reports(&mut scandata);

    let result = scandata.set_page_types(&[(0, PageType::Cover), (7, PageType::Title)]);

    assert!(matches!(result, Err(BookflowError::Precondition(_))));
    assert_eq!(scandata.page_type(0), Some(PageType::Normal));
    assert!(reports.lock().unwrap().is_empty());
}

#[test]
fn test_rotation_change_publishes_nothing() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(2).build();
    let reports = record_reports(&mut scandata);

    scandata.set_rotate_degree(1, 180)?;

    assert_eq!(scandata.leaf(1).map(|l| l.rotate_degree), Some(180));
    assert!(reports.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_next_and_prev_leaf_queries() {
    let scandata = ScanDataBuilder::new()
        .leaves(10)
        .page_type(2, PageType::Chapter)
        .page_type(7, PageType::Chapter)
        .note(4, "check gutter")
        .build();

    assert_eq!(scandata.next_leaf(PageType::Chapter, 0), Some(2));
    assert_eq!(scandata.next_leaf(PageType::Chapter, 2), Some(7));
    assert_eq!(scandata.next_leaf(PageType::Chapter, 7), None);
    assert_eq!(scandata.prev_leaf(PageType::Chapter, 7), Some(2));
    assert_eq!(scandata.prev_leaf(PageType::Chapter, 2), None);
    assert_eq!(scandata.next_leaf(IndexKey::Note, 0), Some(4));
}

#[test]
fn test_clearing_note_removes_it_from_index() -> TestResult {
    let mut scandata = ScanDataBuilder::new().leaves(3).note(1, "blurry").build();
    assert_eq!(scandata.leaves_of(IndexKey::Note), vec![1]);

    scandata.set_note(1, Some(String::new()))?;

    assert!(scandata.leaves_of(IndexKey::Note).is_empty());
    assert_eq!(scandata.leaf(1).and_then(|l| l.note.clone()), None);
    Ok(())
}
