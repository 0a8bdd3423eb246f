#![allow(dead_code)]

use std::sync::Arc;

use bookflow::config::ConfigFile;
use bookflow::library::Library;
use bookflow::pipelines::Services;
use bookflow::task::{Task, TaskState};

pub use bookflow_test_utils::builders::{self, new_book, new_book_with_scandata};
pub use bookflow_test_utils::{
    init_tracing, mock_library, with_timeout, ArchiveCall, ConfigFileBuilder, FakeArchive,
    FakeImages, ScanDataBuilder, StuckRemovalFs,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Services wired to fakes. Returns the fakes so tests can script them.
pub fn fake_services(
    config: ConfigFile,
    library: Arc<dyn Library>,
    archive: FakeArchive,
    images: FakeImages,
) -> (Arc<Services>, Arc<FakeArchive>, Arc<FakeImages>) {
    let archive = Arc::new(archive);
    let images = Arc::new(images);
    let services = Services::new(
        Arc::new(config),
        library,
        archive.clone(),
        images.clone(),
    );
    (services, archive, images)
}

/// Run `task` on this thread until it pauses or ends.
pub fn run(task: &mut Task) -> TaskState {
    task.run()
}
