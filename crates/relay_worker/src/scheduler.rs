//! Cycle scheduling for batched categories. Each category keeps at most one
//! subscription open; when it resolves, the next batch goes out.

use std::time::Instant;

use enostr::{ClientMessage, RelayReqId, RelayTransport};
use tracing::{debug, error, trace, warn};

use crate::{
    cycle::{Resolution, SubscriptionHandle},
    job::Category,
    policy::CategoryPolicy,
    timers::TimerKey,
    worker::{RelayWorker, Route},
};

enum Dispatch {
    Opened,
    /// Nothing in the batch produced a filter
    Empty,
    SendFailed,
}

impl<T: RelayTransport> RelayWorker<T> {
    /// Drain every queue, ad-hoc subscriptions first
    #[profiling::function]
    pub fn drain_all(&mut self, now: Instant) {
        for category in Category::DRAIN_ORDER {
            self.drain_category(category, now);
        }
    }

    pub(crate) fn drain_category(&mut self, category: Category, now: Instant) {
        if !self.conn.is_open() {
            trace!("{}: not open, leaving {category} queued", self.url());
            return;
        }

        let Some(policy) = category.policy() else {
            self.replay_subscriptions();
            return;
        };

        loop {
            if self.cycles.in_flight(category) {
                return;
            }

            let batch = self
                .queues
                .drain_batch(category, policy.batch_size(&self.config));
            if batch.is_empty() {
                return;
            }

            match self.dispatch(category, policy, batch, now) {
                Dispatch::Opened | Dispatch::SendFailed => return,
                Dispatch::Empty => continue,
            }
        }
    }

    fn dispatch(
        &mut self,
        category: Category,
        policy: &CategoryPolicy,
        batch: Vec<String>,
        now: Instant,
    ) -> Dispatch {
        let filters = (policy.filters)(&batch);
        if filters.is_empty() {
            warn!(
                "{}: no usable {category} identifiers in batch of {}, skipping",
                self.url(),
                batch.len()
            );
            return Dispatch::Empty;
        }

        if let Some(stale) = self.cycles.take(category) {
            warn!(
                "{}: {category} sub {} still open, closing before continuing",
                self.url(),
                stale.sub_id
            );
            self.close_cycle_subscription(&stale);
        }

        let sub_id = RelayReqId::default();
        if let Err(err) = self.conn.send(&ClientMessage::req(sub_id.clone(), filters)) {
            error!("{}: failed to send {category} REQ: {err}", self.url());
            self.queues.get_mut(category).requeue_front(category, batch);
            return Dispatch::SendFailed;
        }

        let timeout = policy.timeout(batch.len(), &self.config);
        debug!(
            "{}: {category} sub {sub_id} opened with {} identifiers",
            self.url(),
            batch.len()
        );

        self.routes.insert(sub_id.clone(), Route::Cycle(category));
        let deadline = self.timers.set_after(TimerKey::Cycle(category), now, timeout);
        self.cycles.dispatch(SubscriptionHandle {
            category,
            sub_id,
            batch,
            deadline,
        });

        Dispatch::Opened
    }

    fn close_cycle_subscription(&mut self, handle: &SubscriptionHandle) {
        self.routes.remove(handle.sub_id.as_str());
        self.timers.cancel(&TimerKey::Cycle(handle.category));
        if let Err(err) = self.conn.send(&ClientMessage::close(handle.sub_id.clone())) {
            debug!("{}: could not close sub {}: {err}", self.url(), handle.sub_id);
        }
    }

    /// End `category`'s cycle and start the next one. `sub_id` guards
    /// against signals meant for an earlier batch; timers pass `None`.
    pub(crate) fn resolve(
        &mut self,
        category: Category,
        sub_id: Option<&str>,
        resolution: Resolution,
        now: Instant,
    ) {
        let Some(handle) = self.cycles.take_matching(category, sub_id) else {
            trace!("{}: {category} already resolved", self.url());
            return;
        };

        match resolution {
            Resolution::ClosedByRelay(reason) => {
                warn!(
                    "{}: {category} sub {} closed by relay: {reason}",
                    self.url(),
                    handle.sub_id
                );
                self.routes.remove(handle.sub_id.as_str());
                self.timers.cancel(&TimerKey::Cycle(category));
            }
            Resolution::Timeout => {
                self.close_cycle_subscription(&handle);
                self.reporter.timeout(category, handle.batch);
            }
            Resolution::EndOfStoredEvents | Resolution::FirstEvent => {
                debug!(
                    "{}: {category} sub {} done ({resolution:?})",
                    self.url(),
                    handle.sub_id
                );
                self.close_cycle_subscription(&handle);
            }
        }

        self.drain_category(category, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::Job,
        report::{ResponseBody, TimeoutData},
        test_utils::{note, open_worker, MockTransport},
        WorkerConfig,
    };
    use enostr::{kinds, RelayMessage};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn drained(config: &WorkerConfig, now: Instant) -> Instant {
        now + config.drain_debounce
    }

    #[test]
    fn burst_is_one_deduplicated_batch() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        for id in ["a", "a", "b"] {
            worker.enqueue(Job::profile(id), now).expect("enqueue");
        }
        assert!(worker.transport().reqs().is_empty());

        worker.tick(drained(&config, now));

        let reqs = worker.transport().reqs();
        assert_eq!(reqs.len(), 1);
        assert_eq!(
            reqs[0].1[0].json().expect("json"),
            r#"{"authors":["a","b"],"kinds":[0]}"#
        );
        assert_eq!(
            worker.in_flight_batch(Category::Profile),
            Some(&["a".to_string(), "b".to_string()][..])
        );
    }

    #[test]
    fn later_enqueue_does_not_postpone_drain() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::event("e1"), now).expect("enqueue");
        worker
            .enqueue(Job::event("e2"), now + Duration::from_millis(400))
            .expect("enqueue");
        worker.tick(drained(&config, now));

        assert_eq!(worker.transport().reqs().len(), 1);
        assert_eq!(worker.queued(Category::Event), 0);
    }

    #[test]
    fn oversized_queue_drains_in_cycles() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        for i in 0..600 {
            worker.enqueue(Job::event(format!("id{i}")), now).expect("enqueue");
        }
        let now = drained(&config, now);
        worker.tick(now);

        assert_eq!(worker.in_flight_batch(Category::Event).map(<[String]>::len), Some(500));
        assert_eq!(worker.queued(Category::Event), 100);

        let (sub_id, _) = worker.transport().reqs()[0].clone();
        worker
            .transport_mut()
            .push_message(RelayMessage::eose(sub_id.as_str()));
        worker.poll_transport(now);

        assert_eq!(worker.transport().closes_sent(), vec![sub_id]);
        assert_eq!(worker.in_flight_batch(Category::Event).map(<[String]>::len), Some(100));
        assert_eq!(worker.queued(Category::Event), 0);
    }

    #[test]
    fn silent_relay_times_out() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        for id in ["a", "b", "c"] {
            worker.enqueue(Job::article(id), now).expect("enqueue");
        }
        let now = drained(&config, now);
        worker.tick(now);

        worker.tick(now + Duration::from_secs(8));
        assert!(worker.next_response().is_none());

        worker.tick(now + Duration::from_secs(9));
        let sub_id = worker.transport().reqs()[0].0.clone();
        assert_eq!(worker.transport().closes_sent(), vec![sub_id]);
        assert_eq!(
            worker.next_response().map(|r| r.body),
            Some(ResponseBody::Timeout {
                data: TimeoutData::Lookup {
                    category: Category::Article,
                    identifier: vec!["a".into(), "b".into(), "c".into()],
                }
            })
        );
        assert!(!worker.in_flight(Category::Article));
    }

    #[test]
    fn eose_wins_over_a_later_timeout() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::profile("a"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        let sub_id = worker.transport().reqs()[0].0.clone();
        worker
            .transport_mut()
            .push_message(RelayMessage::event(sub_id.as_str(), note("n1", kinds::METADATA)));
        worker
            .transport_mut()
            .push_message(RelayMessage::eose(sub_id.as_str()));
        worker.poll_transport(now);

        worker.tick(now + Duration::from_secs(60));

        let bodies: Vec<ResponseBody> =
            worker.drain_responses().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies.len(), 1);
        assert!(matches!(&bodies[0], ResponseBody::Event { subscription: None, .. }));
        assert_eq!(worker.transport().closes_sent().len(), 1);
    }

    #[test]
    fn late_eose_after_timeout_is_ignored() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::event("e"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);
        worker.tick(now + Duration::from_secs(3));

        let sub_id = worker.transport().reqs()[0].0.clone();
        worker
            .transport_mut()
            .push_message(RelayMessage::eose(sub_id.as_str()));
        worker
            .transport_mut()
            .push_message(RelayMessage::event(sub_id.as_str(), note("late", kinds::TEXT_NOTE)));
        worker.poll_transport(now + Duration::from_secs(4));

        let bodies: Vec<ResponseBody> =
            worker.drain_responses().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies.len(), 1);
        assert!(matches!(bodies[0], ResponseBody::Timeout { .. }));
        assert_eq!(worker.transport().closes_sent().len(), 1);
    }

    #[test]
    fn contacts_resolve_on_first_event_one_at_a_time() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::contacts("alice"), now).expect("enqueue");
        worker.enqueue(Job::contacts("bob"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        let reqs = worker.transport().reqs();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].1[0].authors, Some(vec!["alice".to_string()]));

        // EOSE alone does not finish a contacts lookup
        let first = reqs[0].0.clone();
        worker
            .transport_mut()
            .push_message(RelayMessage::eose(first.as_str()));
        worker.poll_transport(now);
        assert_eq!(worker.transport().reqs().len(), 1);

        worker
            .transport_mut()
            .push_message(RelayMessage::event(first.as_str(), note("c1", kinds::CONTACTS)));
        worker.poll_transport(now);

        let reqs = worker.transport().reqs();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].1[0].authors, Some(vec!["bob".to_string()]));
        assert_eq!(worker.transport().closes_sent(), vec![first]);
    }

    #[test]
    fn contacts_timeout_is_reported() {
        let config = WorkerConfig::default().with_contacts_timeout(Duration::from_secs(30));
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::contacts("alice"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);
        worker.tick(now + Duration::from_secs(30));

        assert_eq!(
            worker.next_response().map(|r| r.body),
            Some(ResponseBody::Timeout {
                data: TimeoutData::Lookup {
                    category: Category::Contacts,
                    identifier: vec!["alice".into()],
                }
            })
        );
    }

    #[test]
    fn unbounded_contacts_timeout_never_fires() {
        let config = WorkerConfig::default().with_contacts_timeout(Duration::MAX);
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::contacts("alice"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        assert_eq!(worker.transport().reqs().len(), 1);
        assert_eq!(
            worker.in_flight_batch(Category::Contacts),
            Some(&["alice".to_string()][..])
        );
        assert_eq!(worker.next_deadline(), None);

        worker.tick(now + Duration::from_secs(u32::MAX.into()));
        assert!(worker.in_flight(Category::Contacts));
        assert!(worker.next_response().is_none());
    }

    #[test]
    fn per_identifier_timeout_saturates() {
        let config = WorkerConfig::default().with_secs_per_identifier(u64::MAX);
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::profile("a"), now).expect("enqueue");
        worker.enqueue(Job::profile("b"), now).expect("enqueue");
        worker.tick(drained(&config, now));

        assert!(worker.in_flight(Category::Profile));
        assert_eq!(worker.next_deadline(), None);
    }

    #[test]
    fn stale_cycle_is_closed_before_the_next_req() {
        let (mut worker, now) = open_worker(WorkerConfig::default());
        let stale = RelayReqId::from("stale");

        worker
            .routes
            .insert(stale.clone(), Route::Cycle(Category::Profile));
        worker.cycles.dispatch(SubscriptionHandle {
            category: Category::Profile,
            sub_id: stale.clone(),
            batch: vec!["old".into()],
            deadline: Some(now),
        });

        let policy = Category::Profile.policy().expect("policy");
        let outcome = worker.dispatch(Category::Profile, policy, vec!["new".into()], now);
        assert!(matches!(outcome, Dispatch::Opened));

        let sent = &worker.transport().sent;
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], ClientMessage::Close { sub_id } if *sub_id == stale));
        let new_id = match &sent[1] {
            ClientMessage::Req { sub_id, .. } => sub_id.clone(),
            other => panic!("expected REQ, got {other:?}"),
        };
        assert_ne!(new_id, stale);

        assert!(worker.routes.get(stale.as_str()).is_none());
        assert_eq!(
            worker.in_flight_batch(Category::Profile),
            Some(&["new".to_string()][..])
        );

        // a late EOSE for the stale id leaves the new batch alone
        worker
            .transport_mut()
            .push_message(RelayMessage::eose(stale.as_str()));
        worker.poll_transport(now);
        assert!(worker.in_flight(Category::Profile));
    }

    #[test]
    fn categories_run_independently() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::profile("p"), now).expect("enqueue");
        worker.enqueue(Job::event("e"), now).expect("enqueue");
        worker.enqueue(Job::badge_definition("30009:pk:slug"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        let kinds: Vec<Option<Vec<u64>>> = worker
            .transport()
            .reqs()
            .into_iter()
            .map(|(_, filters)| filters[0].kinds.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(vec![kinds::METADATA]),
                Some(vec![kinds::TEXT_NOTE]),
                Some(vec![kinds::BADGE_DEFINITION]),
            ]
        );
    }

    #[test]
    fn unusable_badge_batch_opens_nothing() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::badge_definition("garbage"), now).expect("enqueue");
        worker.tick(drained(&config, now));

        assert!(worker.transport().reqs().is_empty());
        assert!(!worker.in_flight(Category::BadgeDefinition));
        assert_eq!(worker.queued(Category::BadgeDefinition), 0);
    }

    #[test]
    fn relay_closed_subscription_frees_the_category() {
        let config = WorkerConfig::default().with_max_batch_size(1);
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::profile("a"), now).expect("enqueue");
        worker.enqueue(Job::profile("b"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        let first = worker.transport().reqs()[0].0.clone();
        worker
            .transport_mut()
            .push_message(RelayMessage::closed(first.as_str(), "error: too many"));
        worker.poll_transport(now);

        // the relay already closed it, no CLOSE goes back
        assert!(worker.transport().closes_sent().is_empty());
        assert_eq!(worker.transport().reqs().len(), 2);
        assert_eq!(worker.in_flight_batch(Category::Profile), Some(&["b".to_string()][..]));
    }

    #[test]
    fn failed_send_requeues_the_batch() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());
        worker.transport_mut().fail_send = true;

        worker.enqueue(Job::profile("a"), now).expect("enqueue");
        worker.enqueue(Job::profile("b"), now).expect("enqueue");
        worker.tick(drained(&config, now));

        assert!(!worker.in_flight(Category::Profile));
        assert_eq!(worker.queued(Category::Profile), 2);

        worker.transport_mut().fail_send = false;
        let later = drained(&config, now) + Duration::from_secs(1);
        worker.enqueue(Job::profile("c"), later).expect("enqueue");
        worker.tick(later + config.drain_debounce);

        assert_eq!(
            worker.in_flight_batch(Category::Profile),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
    }

    #[test]
    fn reconnect_drains_backlog_before_new_work() {
        let config = WorkerConfig::default();
        let (mut worker, now) = open_worker(config.clone());

        worker.enqueue(Job::event("in-flight"), now).expect("enqueue");
        let now = drained(&config, now);
        worker.tick(now);

        worker.enqueue(Job::event("backlog"), now).expect("enqueue");
        worker.disconnect();
        assert!(!worker.in_flight(Category::Event));
        assert_eq!(worker.queued(Category::Event), 1);
        assert_eq!(worker.next_deadline(), None);

        worker.connect(None);
        worker.transport_mut().push(enostr::TransportEvent::Opened);
        worker.poll_transport(now);

        let reqs = worker.transport().reqs();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].1[0].ids, Some(vec!["backlog".to_string()]));
    }

    #[test]
    fn a_disconnected_worker_sends_nothing() {
        let config = WorkerConfig::default();
        let now = Instant::now();
        let mut worker = RelayWorker::new(
            crate::test_utils::URL,
            MockTransport::default(),
            config.clone(),
        );

        worker.enqueue(Job::profile("a"), now).expect("enqueue");
        worker.drain_all(drained(&config, now));

        assert!(worker.transport().sent.is_empty());
        assert_eq!(worker.queued(Category::Profile), 1);
    }
}
