// src/pipelines/package.rs

use std::sync::Arc;

use crate::book::{Event, SharedBook};
use crate::errors::BookflowError;
use crate::pipelines::Services;
use crate::scandata::PageType;
use crate::task::{Answer, InputPrompt, Step, StepOutcome, TaskBuilder};

/// Prompt id used when page numbers disagree with leaf order.
pub const CONFIRM_PAGE_NUMBERS: &str = "confirm_page_numbers";

/// How many mismatched leaves to list in the prompt.
const MISMATCH_PREVIEW: usize = 10;

pub(super) fn pipeline(
    builder: TaskBuilder,
    book: &SharedBook,
    services: &Arc<Services>,
) -> TaskBuilder {
    let required = services.config.orchestrator.required_metadata.clone();
    let retry = services.config.retry_policy();
    let images = services.images.clone();

    let validate = book.clone();
    let confirm = book.clone();
    let identify = book.clone();
    let compress = book.clone();
    let save = book.clone();
    let finish = book.clone();

    builder
        .atomic("validate", move |ctx| {
            let book = validate.lock();
            if book.scandata().is_empty() {
                return Err(BookflowError::Integrity("no leaves captured".to_string()));
            }
            let missing = book.missing_metadata(&required);
            if !missing.is_empty() {
                return Err(BookflowError::Integrity(format!(
                    "missing required metadata: {}",
                    missing.join(", ")
                )));
            }
            ctx.report(format!("{} leaves captured", book.scandata().leaf_count()));
            Ok(StepOutcome::Continue)
        })
        .atomic("confirm page numbers", move |ctx| {
            let mismatched = confirm.lock().scandata().mismatched_leaves();
            if mismatched.is_empty() {
                return Ok(StepOutcome::Continue);
            }

            match ctx.answer(CONFIRM_PAGE_NUMBERS) {
                Some(Answer::YesNo(true)) => {
                    ctx.report("page-number mismatches accepted by operator");
                    Ok(StepOutcome::Continue)
                }
                Some(_) => Err(BookflowError::Precondition(
                    "packaging declined: page numbers need review".to_string(),
                )),
                None => {
                    let preview: Vec<String> = mismatched
                        .iter()
                        .take(MISMATCH_PREVIEW)
                        .map(u32::to_string)
                        .collect();
                    Ok(StepOutcome::Pause(InputPrompt::yes_no(
                        CONFIRM_PAGE_NUMBERS,
                        "Page numbers do not match",
                        format!(
                            "{} leaves have mismatched page numbers (leaves {}). Package anyway?",
                            mismatched.len(),
                            preview.join(", ")
                        ),
                    )))
                }
            }
        })
        .atomic("assign identifier", move |ctx| {
            let id = identify.lock().ensure_identifier()?;
            ctx.report(format!("identifier {id}"));
            Ok(StepOutcome::Continue)
        })
        .step(Step::retrying("compress images", retry, move |ctx| {
            let (dir, leaves) = {
                let book = compress.lock();
                let leaves: Vec<u32> = book
                    .scandata()
                    .page_data()
                    .iter()
                    .filter(|(_, data)| data.page_type != PageType::Delete)
                    .map(|(leaf, _)| *leaf)
                    .collect();
                (book.dir().to_path_buf(), leaves)
            };

            let total = leaves.len();
            for (done, leaf) in leaves.into_iter().enumerate() {
                images.compress(&dir, leaf)?;
                if (done + 1) % 25 == 0 || done + 1 == total {
                    ctx.report(format!("compressed {}/{total} leaves", done + 1));
                }
            }
            Ok(StepOutcome::Continue)
        }))
        .atomic("save scandata", move |_ctx| {
            save.lock().save_scandata()?;
            Ok(StepOutcome::Continue)
        })
        .atomic("finish", move |_ctx| {
            finish.lock().transition(Event::PackagingDone)?;
            Ok(StepOutcome::Continue)
        })
}
