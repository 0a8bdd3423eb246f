use proptest::prelude::*;

use bookflow::scheduler::TaskQueue;
use bookflow::task::{Task, TaskId};
use bookflow::types::Level;

// Push `count` tasks, cancel the ones picked by `removals`, then drain.
// The survivors must come out in submission order.
proptest! {
    #[test]
    fn test_queue_keeps_submission_order_under_removal(
        count in 1..20usize,
        removals in proptest::collection::vec(any::<usize>(), 0..10),
    ) {
        let mut queue = TaskQueue::new(Level::Medium);
        let mut ids: Vec<TaskId> = Vec::new();
        for i in 0..count {
            let task = Task::builder(format!("task_{i}")).build();
            ids.push(task.id());
            queue.push(task);
        }

        let mut expected = ids.clone();
        for raw in removals {
            if expected.is_empty() {
                break;
            }
            let victim = expected.remove(raw % expected.len());
            prop_assert!(queue.remove(victim).is_some());
            prop_assert!(!queue.contains(victim));
        }

        prop_assert_eq!(queue.len(), expected.len());
        let drained: Vec<TaskId> = queue.drain().iter().map(|t| t.id()).collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(queue.is_empty());
    }
}
