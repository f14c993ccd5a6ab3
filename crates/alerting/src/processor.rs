//! Event Processor
//!
//! Handles one queue payload from decode to ack/requeue decision. Org and alarm
//! lookups are the only failures that requeue; once both succeed the message is
//! claimed and always acknowledged, whatever happens to individual alarms and
//! users.

use crate::{with_deadline, AlarmMatcher, DedupGate, Recipients};
use metrics::counter;
use models::{decode_event, Alarm, Alert, AlertStatus, Decoded, Event, Org, User};
use notify::Dispatcher;
use rules::{RuleError, TemplateRenderer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use storage::{AlarmQuery, AlarmStore, AlertStore, OrgStore, UserStore};
use tracing::{debug, error, info_span, warn, Instrument};

/// What to do with a delivery after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Requeue,
}

/// Deadlines for collaborator calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Store and cache calls in milliseconds (default: 5000)
    pub data_ms: u64,
    /// Provider sends in milliseconds, rate-limit wait included (default: 60000)
    pub send_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            data_ms: 5_000,
            send_ms: 60_000,
        }
    }
}

impl Timeouts {
    pub fn data(&self) -> Duration {
        Duration::from_millis(self.data_ms)
    }

    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }
}

/// Persistence collaborators
#[derive(Clone)]
pub struct Stores {
    pub orgs: Arc<dyn OrgStore>,
    pub alarms: Arc<dyn AlarmStore>,
    pub users: Arc<dyn UserStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Stores {
    /// All four contracts served by one backend
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: OrgStore + AlarmStore + UserStore + AlertStore + 'static,
    {
        Self {
            orgs: store.clone(),
            alarms: store.clone(),
            users: store.clone(),
            alerts: store,
        }
    }
}

pub struct Processor {
    stores: Stores,
    matcher: AlarmMatcher,
    renderer: TemplateRenderer,
    dedup: DedupGate,
    dispatcher: Dispatcher,
    timeouts: Timeouts,
}

impl Processor {
    pub fn new(stores: Stores, dedup: DedupGate, dispatcher: Dispatcher, timeouts: Timeouts) -> Self {
        Self {
            matcher: AlarmMatcher::new(stores.users.clone(), timeouts.data()),
            stores,
            renderer: TemplateRenderer::new(),
            dedup,
            dispatcher,
            timeouts,
        }
    }

    /// Process one raw payload and decide how to settle it
    pub async fn handle(&self, payload: &[u8]) -> Outcome {
        let event = match decode_event(payload) {
            Ok(Decoded::Event(event)) => event,
            Ok(Decoded::Prime) => {
                debug!("Dropping prime message");
                counter!("alerter_messages_total", "outcome" => "prime").increment(1);
                return Outcome::Ack;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                counter!("alerter_messages_total", "outcome" => "decode_error").increment(1);
                return Outcome::Ack;
            }
        };

        let span = info_span!(
            "event",
            trace_id = %event.point.trace_id,
            org_id = %event.device.org_id,
            uniq_id = %event.device.uniq_id,
            dev_id = %event.device.id,
        );
        self.process_event(&event).instrument(span).await
    }

    async fn process_event(&self, event: &Event) -> Outcome {
        let org_id = &event.device.org_id;

        let org = match with_deadline(
            "read org",
            self.timeouts.data(),
            self.stores.orgs.read_org(org_id),
        )
        .await
        {
            Ok(org) => org,
            Err(e) => {
                warn!(error = %e, "Org lookup failed, requeueing");
                counter!("alerter_messages_total", "outcome" => "requeue").increment(1);
                return Outcome::Requeue;
            }
        };

        let query = AlarmQuery::for_rule(&event.rule.id);
        let alarms = match with_deadline(
            "list alarms",
            self.timeouts.data(),
            self.stores.alarms.list_alarms(org_id, &query),
        )
        .await
        {
            Ok((alarms, _)) => alarms,
            Err(e) => {
                warn!(rule_id = %event.rule.id, error = %e, "Alarm listing failed, requeueing");
                counter!("alerter_messages_total", "outcome" => "requeue").increment(1);
                return Outcome::Requeue;
            }
        };
        debug!(rule_id = %event.rule.id, alarms = alarms.len(), "Matched alarms");

        for alarm in &alarms {
            self.process_alarm(event, &org, alarm).await;
        }

        counter!("alerter_messages_total", "outcome" => "processed").increment(1);
        Outcome::Ack
    }

    async fn process_alarm(&self, event: &Event, org: &Org, alarm: &Alarm) {
        let users = match self.matcher.resolve(alarm).await {
            Recipients::Notify(users) => users,
            Recipients::Skip(reason) => {
                counter!("alerter_alarms_skipped_total", "reason" => reason.as_str()).increment(1);
                return;
            }
        };

        let (subject, body) = match self.render(event, alarm) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(alarm_id = %alarm.id, error = %e, "Template render failed, skipping alarm");
                counter!("alerter_alarms_skipped_total", "reason" => "template").increment(1);
                return;
            }
        };

        for user in &users {
            self.notify_user(event, org, alarm, user, &subject, &body).await;
        }
    }

    fn render(&self, event: &Event, alarm: &Alarm) -> Result<(String, String), RuleError> {
        let subject = self.renderer.render(
            &event.point,
            &event.rule,
            &event.device,
            &alarm.subject_template,
        )?;
        let body = self.renderer.render(
            &event.point,
            &event.rule,
            &event.device,
            &alarm.body_template,
        )?;
        Ok((subject, body))
    }

    async fn notify_user(
        &self,
        event: &Event,
        org: &Org,
        alarm: &Alarm,
        user: &User,
        subject: &str,
        body: &str,
    ) {
        let dedup = with_deadline(
            "repeat check",
            self.timeouts.data(),
            self.dedup.try_acquire(
                &event.device.org_id,
                &event.device.id,
                &alarm.id,
                &user.id,
                alarm.repeat_ttl(),
            ),
        )
        .await;

        match dedup {
            Ok(true) => {
                counter!("alerter_dedup_total", "outcome" => "acquired").increment(1);
            }
            Ok(false) => {
                debug!(alarm_id = %alarm.id, user_id = %user.id, "Repeat suppressed");
                counter!("alerter_dedup_total", "outcome" => "repeat").increment(1);
                return;
            }
            Err(e) => {
                warn!(alarm_id = %alarm.id, user_id = %user.id, error = %e, "Repeat check failed, not sending");
                counter!("alerter_dedup_total", "outcome" => "error").increment(1);
                return;
            }
        }

        let channel = alarm.alarm_type.as_str();
        let sent = with_deadline(
            "send notification",
            self.timeouts.send(),
            self.dispatcher
                .send(alarm.alarm_type, org, user, subject, body),
        )
        .await;

        let send_error = match sent {
            Ok(()) => {
                debug!(alarm_id = %alarm.id, user_id = %user.id, channel, "Notification sent");
                counter!("alerter_notifications_total", "type" => channel, "outcome" => "sent")
                    .increment(1);
                None
            }
            Err(e) => {
                warn!(alarm_id = %alarm.id, user_id = %user.id, channel, error = %e, "Notification failed");
                counter!("alerter_notifications_total", "type" => channel, "outcome" => "error")
                    .increment(1);
                Some(e.to_string())
            }
        };

        let alert = Alert::from_outcome(
            &event.device.org_id,
            &event.device.uniq_id,
            &alarm.id,
            &user.id,
            &event.point.trace_id,
            send_error,
        );

        match with_deadline(
            "create alert",
            self.timeouts.data(),
            self.stores.alerts.create_alert(&alert),
        )
        .await
        {
            Ok(()) => {
                let status = match alert.status {
                    AlertStatus::Sent => "sent",
                    AlertStatus::Error => "error",
                };
                counter!("alerter_alerts_total", "status" => status).increment(1);
            }
            Err(e) => {
                error!(alarm_id = %alarm.id, user_id = %user.id, error = %e, "Failed to persist alert");
                counter!("alerter_alerts_total", "status" => "persist_error").increment(1);
            }
        }
    }
}
