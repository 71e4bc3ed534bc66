use std::collections::VecDeque;

use enostr::Filter;
use hashbrown::HashSet;

use crate::job::{Category, Job};

/// FIFO of jobs waiting for one category's next cycle
#[derive(Debug, Default)]
pub struct CategoryQueue {
    jobs: VecDeque<Job>,
}

impl CategoryQueue {
    pub fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Remove up to `max` jobs from the front and return their identifiers,
    /// deduplicated in first-seen order. Duplicates past the first `max`
    /// jobs stay queued for a later batch.
    #[profiling::function]
    pub fn drain_batch(&mut self, max: usize) -> Vec<String> {
        let take = max.min(self.jobs.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(take);
        let mut batch = Vec::with_capacity(take);

        for job in self.jobs.drain(..take) {
            if seen.insert(job.identifier.clone()) {
                batch.push(job.identifier);
            }
        }

        batch
    }

    /// Take every queued job, oldest first
    pub fn take_all(&mut self) -> Vec<Job> {
        self.jobs.drain(..).collect()
    }

    /// Put a batch back at the head of the queue, keeping its order
    pub fn requeue_front(&mut self, category: Category, identifiers: Vec<String>) {
        for identifier in identifiers.into_iter().rev() {
            self.jobs.push_front(Job::new(category, identifier));
        }
    }

    /// Drop every job with `identifier`, returning how many went
    pub fn remove(&mut self, identifier: &str) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.identifier != identifier);
        before - self.jobs.len()
    }
}

/// One queue per [`Category`]
#[derive(Debug, Default)]
pub struct QueueSet {
    queues: [CategoryQueue; Category::COUNT],
}

impl QueueSet {
    pub fn enqueue(&mut self, job: Job) {
        self.queues[job.category.index()].push(job);
    }

    /// Queue an ad-hoc subscription until the connection opens
    pub fn enqueue_subscription(&mut self, id: String, filters: Vec<Filter>) {
        self.enqueue(Job::subscription(id, filters));
    }

    pub fn get(&self, category: Category) -> &CategoryQueue {
        &self.queues[category.index()]
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryQueue {
        &mut self.queues[category.index()]
    }

    pub fn drain_batch(&mut self, category: Category, max: usize) -> Vec<String> {
        self.get_mut(category).drain_batch(max)
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(CategoryQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(CategoryQueue::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn drain_dedups_in_first_seen_order() {
        let mut queue = CategoryQueue::default();
        for id in ["a", "a", "b", "a", "c", "b"] {
            queue.push(Job::profile(id));
        }

        assert_eq!(queue.drain_batch(500), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_is_capped() {
        let mut queue = CategoryQueue::default();
        for i in 0..600 {
            queue.push(Job::event(format!("id{i}")));
        }

        let batch = queue.drain_batch(500);
        assert_eq!(batch.len(), 500);
        assert_eq!(batch.first().map(String::as_str), Some("id0"));
        assert_eq!(batch.last().map(String::as_str), Some("id499"));
        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn duplicates_past_the_cap_stay_queued() {
        let mut queue = CategoryQueue::default();
        for id in ["a", "b", "a"] {
            queue.push(Job::profile(id));
        }

        assert_eq!(queue.drain_batch(2), vec!["a", "b"]);
        assert_eq!(queue.drain_batch(2), vec!["a"]);
    }

    #[test]
    fn requeue_goes_back_to_the_head() {
        let mut queue = CategoryQueue::default();
        queue.push(Job::article("c"));
        queue.requeue_front(Category::Article, vec!["a".to_owned(), "b".to_owned()]);

        assert_eq!(queue.drain_batch(10), vec!["a", "b", "c"]);
    }

    #[test]
    fn queue_set_routes_by_category() {
        let mut queues = QueueSet::default();
        queues.enqueue(Job::profile("p"));
        queues.enqueue(Job::contacts("c"));
        queues.enqueue_subscription("feed".to_owned(), vec![]);

        assert_eq!(queues.len(), 3);
        assert_eq!(queues.get(Category::Profile).len(), 1);
        assert_eq!(queues.get(Category::AdHocSubscription).len(), 1);
        assert_eq!(queues.get_mut(Category::AdHocSubscription).remove("feed"), 1);
        assert_eq!(queues.len(), 2);
    }
}
