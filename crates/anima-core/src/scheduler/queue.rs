//! Priority Task Queue
//!
//! Five FIFO buckets, one per priority. Pop takes the head of the strongest
//! non-empty bucket; a task bounced by the admission gate is pushed back
//! onto the *front* of its bucket so ordering is preserved under transient
//! back-pressure.

use std::collections::VecDeque;

use super::task::{Task, TaskPriority};

/// Ordered priority queue with FIFO semantics within each priority.
#[derive(Debug, Default)]
pub struct TaskQueue {
    buckets: [VecDeque<Task>; 5],
}

impl TaskQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue at the back of the task's priority bucket.
    pub fn push(&mut self, task: Task) {
        self.buckets[task.priority.index()].push_back(task);
    }

    /// Re-enqueue at the front of the task's priority bucket (admission
    /// bounce-back).
    pub fn push_front(&mut self, task: Task) {
        self.buckets[task.priority.index()].push_front(task);
    }

    /// Dequeue the head of the strongest non-empty bucket.
    pub fn pop(&mut self) -> Option<Task> {
        self.buckets.iter_mut().find_map(|b| b.pop_front())
    }

    /// Peek the priority of the next task without dequeuing.
    pub fn peek_priority(&self) -> Option<TaskPriority> {
        self.buckets
            .iter()
            .find_map(|b| b.front().map(|t| t.priority))
    }

    /// Remove a task by id from any bucket.
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        for bucket in &mut self.buckets {
            if let Some(pos) = bucket.iter().position(|t| t.id == id) {
                return bucket.remove(pos);
            }
        }
        None
    }

    /// Drain everything, strongest priority first.
    pub fn drain(&mut self) -> Vec<Task> {
        let mut drained = Vec::with_capacity(self.len());
        for bucket in &mut self.buckets {
            drained.extend(bucket.drain(..));
        }
        drained
    }

    /// Total queued tasks.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::QueueClass;
    use std::collections::HashMap;
    use std::time::Duration;

    fn task(priority: TaskPriority) -> Task {
        Task::new(
            QueueClass::Reactive,
            priority,
            Box::new(|| Box::pin(async { Ok(serde_json::Value::Null) })),
            Duration::from_secs(30),
            HashMap::new(),
        )
    }

    #[test]
    fn test_pop_respects_priority() {
        let mut queue = TaskQueue::new();
        queue.push(task(TaskPriority::Low));
        queue.push(task(TaskPriority::Critical));
        queue.push(task(TaskPriority::Normal));

        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Critical);
        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Normal);
        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Low);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = TaskQueue::new();
        let first = task(TaskPriority::Normal);
        let second = task(TaskPriority::Normal);
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        queue.push(first);
        queue.push(second);

        assert_eq!(queue.pop().unwrap().id, first_id);
        assert_eq!(queue.pop().unwrap().id, second_id);
    }

    #[test]
    fn test_push_front_preserves_head() {
        let mut queue = TaskQueue::new();
        let bounced = task(TaskPriority::Normal);
        let bounced_id = bounced.id.clone();
        queue.push(bounced);
        queue.push(task(TaskPriority::Normal));

        let head = queue.pop().unwrap();
        assert_eq!(head.id, bounced_id);
        queue.push_front(head);
        // Bounced task is still the head.
        assert_eq!(queue.pop().unwrap().id, bounced_id);
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = TaskQueue::new();
        let victim = task(TaskPriority::Background);
        let victim_id = victim.id.clone();
        queue.push(victim);
        queue.push(task(TaskPriority::Background));

        assert!(queue.remove(&victim_id).is_some());
        assert!(queue.remove(&victim_id).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_orders_by_priority() {
        let mut queue = TaskQueue::new();
        queue.push(task(TaskPriority::Background));
        queue.push(task(TaskPriority::Critical));
        let drained = queue.drain();
        assert_eq!(drained[0].priority, TaskPriority::Critical);
        assert!(queue.is_empty());
    }
}
