//! Repository Implementation

use crate::{AlarmQuery, AlarmStore, AlertStore, OrgStore, StorageError, UserStore};
use async_trait::async_trait;
use models::{Alarm, Alert, Org, Status, User};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// In-memory repository for development and tests
pub struct Repository {
    orgs: Mutex<HashMap<String, Org>>,
    alarms: Mutex<Vec<Alarm>>,
    users: Mutex<Vec<User>>,
    alerts: Mutex<VecDeque<Alert>>,
    /// Max alert records retained
    max_alert_records: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            orgs: Mutex::new(HashMap::new()),
            alarms: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            alerts: Mutex::new(VecDeque::with_capacity(1000)),
            max_alert_records: 100_000,
        }
    }

    pub fn insert_org(&self, org: Org) -> Result<(), StorageError> {
        lock(&self.orgs)?.insert(org.id.clone(), org);
        Ok(())
    }

    /// Insert or replace an alarm by ID
    pub fn insert_alarm(&self, alarm: Alarm) -> Result<(), StorageError> {
        let mut alarms = lock(&self.alarms)?;
        alarms.retain(|a| a.id != alarm.id);
        alarms.push(alarm);
        alarms.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(())
    }

    /// Insert or replace a user by ID
    pub fn insert_user(&self, user: User) -> Result<(), StorageError> {
        let mut users = lock(&self.users)?;
        users.retain(|u| u.id != user.id);
        users.push(user);
        Ok(())
    }

    /// Snapshot of stored alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get total alert count
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrgStore for Repository {
    async fn read_org(&self, org_id: &str) -> Result<Org, StorageError> {
        lock(&self.orgs)?
            .get(org_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AlarmStore for Repository {
    async fn list_alarms(
        &self,
        org_id: &str,
        query: &AlarmQuery,
    ) -> Result<(Vec<Alarm>, i64), StorageError> {
        let alarms = lock(&self.alarms)?;

        let matching: Vec<&Alarm> = alarms
            .iter()
            .filter(|a| a.org_id == org_id)
            .filter(|a| query.since.map_or(true, |since| a.created_at > since))
            .filter(|a| query.rule_id.as_ref().map_or(true, |r| &a.rule_id == r))
            .collect();
        let total = matching.len() as i64;

        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .filter(|a| query.cursor.as_ref().map_or(true, |c| &a.id > c))
            .take(limit)
            .cloned()
            .collect();

        Ok((page, total))
    }
}

#[async_trait]
impl UserStore for Repository {
    async fn list_users_by_tags(
        &self,
        org_id: &str,
        tags: &[String],
    ) -> Result<Vec<User>, StorageError> {
        let users = lock(&self.users)?;

        Ok(users
            .iter()
            .filter(|u| u.org_id == org_id && u.status == Status::Active && u.has_any_tag(tags))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AlertStore for Repository {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut alerts = lock(&self.alerts)?;

        // Enforce retention
        if alerts.len() >= self.max_alert_records {
            alerts.pop_front();
        }

        alerts.push_back(alert.clone());
        debug!(alarm_id = %alert.alarm_id, user_id = %alert.user_id, "Inserted alert");
        Ok(())
    }
}
