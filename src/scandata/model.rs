// src/scandata/model.rs

//! On-disk shape of `scandata.json`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Side;

/// Fixed set of page types an operator can assign to a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PageType {
    Normal,
    Cover,
    Title,
    Copyright,
    Contents,
    Tissue,
    #[serde(rename = "Color Card")]
    ColorCard,
    #[serde(rename = "White Card")]
    WhiteCard,
    Foldout,
    Chapter,
    Index,
    Delete,
}

impl PageType {
    pub const ALL: [PageType; 12] = [
        PageType::Normal,
        PageType::Cover,
        PageType::Title,
        PageType::Copyright,
        PageType::Contents,
        PageType::Tissue,
        PageType::ColorCard,
        PageType::WhiteCard,
        PageType::Foldout,
        PageType::Chapter,
        PageType::Index,
        PageType::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PageType::Normal => "Normal",
            PageType::Cover => "Cover",
            PageType::Title => "Title",
            PageType::Copyright => "Copyright",
            PageType::Contents => "Contents",
            PageType::Tissue => "Tissue",
            PageType::ColorCard => "Color Card",
            PageType::WhiteCard => "White Card",
            PageType::Foldout => "Foldout",
            PageType::Chapter => "Chapter",
            PageType::Index => "Index",
            PageType::Delete => "Delete",
        }
    }
}

impl Default for PageType {
    fn default() -> Self {
        PageType::Normal
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a leaf's page number was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageNumberKind {
    /// Confirmed by the operator.
    Assert,
    /// Interpolated between assertions whose leaf and page deltas agree.
    Match,
    /// Interpolated between assertions whose deltas disagree.
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNumber {
    pub num: u32,
    #[serde(rename = "type")]
    pub kind: PageNumberKind,
}

/// Attributes of one leaf in `pageData`.
///
/// Fields this crate does not know about are kept in `extra` so that a
/// load/save cycle never drops data written by other tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafData {
    pub page_type: PageType,
    pub hand_side: Side,
    pub rotate_degree: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppi: Option<u32>,
    /// Unix timestamp (seconds) of the capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<PageNumber>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LeafData {
    pub fn new(side: Side, page_type: PageType) -> Self {
        Self {
            page_type,
            hand_side: side,
            rotate_degree: side.default_rotation(),
            ppi: None,
            capture_time: None,
            note: None,
            page_number: None,
            extra: Map::new(),
        }
    }

    pub fn has_note(&self) -> bool {
        self.note.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// An operator-confirmed `(leaf, page number)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub leaf_num: u32,
    pub page_num: u32,
}

/// `bookData.pageNumData`.
///
/// Assertions are kept sorted by leaf number with at most one entry per leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageNumData {
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// Whole-book attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookData {
    #[serde(default)]
    pub page_num_data: PageNumData,
    /// Default ppi stamped on newly captured leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppi: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level document. Integer leaf keys serialise as canonical decimal
/// strings and come back in ascending numeric order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScanDataFile {
    #[serde(default)]
    pub book_data: BookData,
    #[serde(default)]
    pub page_data: BTreeMap<u32, LeafData>,
}
