// src/pipelines/blur.rs

use std::sync::Arc;

use serde_json::json;

use crate::book::{Event, SharedBook};
use crate::pipelines::Services;
use crate::scandata::PageType;
use crate::task::{Step, StepOutcome, TaskBuilder};

/// Leaf attribute holding the blur score.
const BLURRINESS: &str = "blurriness";
/// Book attribute holding the count of leaves over the threshold.
const BLURRY_LEAVES: &str = "blurryLeaves";

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
) -> TaskBuilder {
    let threshold = services.config.packaging.blur_threshold;
    let retry = services.config.retry_policy();
    let images = services.images.clone();

    let score = book.clone();
    let save = book.clone();
    let finish = book.clone();

    builder
        .step(Step::retrying("score leaves", retry, move |ctx| {
            let (dir, leaves) = {
                let book = score.lock();
                let leaves: Vec<u32> = book
                    .scandata()
                    .page_data()
                    .iter()
                    .filter(|(_, data)| data.page_type != PageType::Delete)
                    .map(|(leaf, _)| *leaf)
                    .collect();
                (book.dir().to_path_buf(), leaves)
            };

            let mut scores = Vec::with_capacity(leaves.len());
            for leaf in leaves {
                // Long step: abort as soon as a cancel arrives.
                ctx.check_cancelled()?;
                scores.push((leaf, images.blur_score(&dir, leaf)?));
            }

            let blurry = scores.iter().filter(|(_, s)| *s > threshold).count();
            {
                let mut book = score.lock();
                let scandata = book.scandata_mut();
                for (leaf, value) in &scores {
                    scandata.set_leaf_attribute(*leaf, BLURRINESS, json!(value))?;
                }
                scandata.set_book_field(BLURRY_LEAVES, json!(blurry));
            }

            ctx.report(format!("{blurry} of {} leaves above blur threshold", scores.len()));
            Ok(StepOutcome::Continue)
        }))
        .atomic("save scandata", move |_ctx| {
            save.lock().save_scandata()?;
            Ok(StepOutcome::Continue)
        })
        .atomic("finish", move |_ctx| {
            finish.lock().transition(Event::BlurDetectionDone)?;
            Ok(StepOutcome::Continue)
        })
}
