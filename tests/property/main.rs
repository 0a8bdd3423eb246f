mod scheduler;

use proptest::prelude::*;

use bookflow::scandata::{PageType, ScanData};
use bookflow::types::Side;

#[derive(Debug, Clone)]
enum Op {
    Append(PageType),
    Spread,
    Insert(u32, PageType),
    Delete(u32, u32),
    SetType(u32, PageType),
    Note(u32, bool),
    Assert(u32, u32),
    Unassert(u32),
}

fn page_type() -> impl Strategy<Value = PageType> {
    proptest::sample::select(PageType::ALL.to_vec())
}

// Leaf arguments are raw; `apply` folds them into range for the current book.
fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        page_type().prop_map(Op::Append),
        Just(Op::Spread),
        (any::<u32>(), page_type()).prop_map(|(l, t)| Op::Insert(l, t)),
        (any::<u32>(), 0..4u32).prop_map(|(l, n)| Op::Delete(l, n)),
        (any::<u32>(), page_type()).prop_map(|(l, t)| Op::SetType(l, t)),
        (any::<u32>(), any::<bool>()).prop_map(|(l, b)| Op::Note(l, b)),
        (any::<u32>(), 1..500u32).prop_map(|(l, p)| Op::Assert(l, p)),
        any::<u32>().prop_map(Op::Unassert),
    ]
}

fn apply(scandata: &mut ScanData, op: &Op) {
    let count = scandata.leaf_count();
    let pick = |raw: u32| raw % count;
    match op {
        Op::Append(t) => {
            scandata.append_leaf(Side::Left, *t, None);
        }
        Op::Spread => {
            scandata.append_spread(None);
        }
        Op::Insert(raw, t) => {
            let at = raw % (count + 1);
            scandata.insert_leaf(at, Side::Right, *t).unwrap();
        }
        Op::Delete(raw, extra) if count > 0 => {
            let left = pick(*raw);
            let right = (left + extra).min(count - 1);
            scandata.delete_spread(left, right).unwrap();
        }
        Op::SetType(raw, t) if count > 0 => scandata.set_page_type(pick(*raw), *t).unwrap(),
        Op::Note(raw, on) if count > 0 => {
            let note = on.then(|| "check".to_string());
            scandata.set_note(pick(*raw), note).unwrap();
        }
        Op::Assert(raw, page) if count > 0 => scandata.assert_page_number(pick(*raw), *page).unwrap(),
        Op::Unassert(raw) if count > 0 => {
            scandata.remove_page_number_assertion(pick(*raw)).unwrap();
        }
        _ => {}
    }
}

fn book(ops: &[Op]) -> ScanData {
    let mut scandata = ScanData::new();
    for op in ops {
        apply(&mut scandata, op);
    }
    scandata
}

proptest! {
    #[test]
    fn test_index_matches_rebuild_after_any_edit_sequence(
        ops in proptest::collection::vec(op(), 0..40)
    ) {
        let mut scandata = ScanData::new();
        for op in &ops {
            apply(&mut scandata, op);
            prop_assert_eq!(scandata.index(), &scandata.rebuilt_index(), "after {:?}", op);

            let count = scandata.leaf_count();
            let keys: Vec<u32> = scandata.page_data().keys().copied().collect();
            prop_assert_eq!(keys, (0..count).collect::<Vec<_>>());

            let leaves: Vec<u32> = scandata.assertions().iter().map(|a| a.leaf_num).collect();
            prop_assert!(leaves.windows(2).all(|w| w[0] < w[1]), "assertions unsorted: {:?}", leaves);
            prop_assert!(leaves.iter().all(|l| *l < count), "dangling assertion: {:?}", leaves);
        }
    }

    #[test]
    fn test_insert_then_delete_restores_ledger(
        ops in proptest::collection::vec(op(), 0..30),
        at in any::<u32>(),
        inserted in page_type(),
    ) {
        let mut scandata = book(&ops);
        let before_pages = scandata.page_data().clone();
        let before_index = scandata.index().clone();
        let before_assertions = scandata.assertions().to_vec();

        let at = at % (scandata.leaf_count() + 1);
        scandata.insert_leaf(at, Side::Left, inserted).unwrap();
        prop_assert_eq!(scandata.page_type(at), Some(inserted));
        scandata.delete_spread(at, at).unwrap();

        prop_assert_eq!(scandata.page_data(), &before_pages);
        prop_assert_eq!(scandata.index(), &before_index);
        prop_assert_eq!(scandata.assertions(), before_assertions.as_slice());
    }

    #[test]
    fn test_json_round_trip_is_fixed_point(ops in proptest::collection::vec(op(), 0..30)) {
        let scandata = book(&ops);
        let text = scandata.to_json().unwrap();
        let reloaded = ScanData::from_json(&text).unwrap();

        prop_assert_eq!(reloaded.to_json().unwrap(), text);
        prop_assert_eq!(reloaded.index(), scandata.index());
    }
}
