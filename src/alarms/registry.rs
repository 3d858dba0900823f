// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory alarm table with due-time bookkeeping.
//!
//! Pure data structure: no timers, no I/O. The durable scheduler persists it
//! and decides when to call [`AlarmRegistry::acknowledge`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Alarm, AlarmError, AlarmSpec};

const MS_PER_MINUTE: i64 = 60 * 1000;

/// Alarms keyed by name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmRegistry {
    alarms: BTreeMap<String, Alarm>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// Alarms in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.values()
    }

    pub fn get(&self, name: &str) -> Option<&Alarm> {
        self.alarms.get(name)
    }

    /// Register `name`, replacing any alarm with the same name.
    pub fn insert(&mut self, name: &str, spec: AlarmSpec, now_ms: i64) -> Result<Alarm, AlarmError> {
        let alarm = match spec {
            AlarmSpec::Periodic { period_minutes: 0 } => {
                return Err(AlarmError::Invalid {
                    name: name.to_string(),
                    reason: "period must be at least one minute".to_string(),
                });
            }
            AlarmSpec::Periodic { period_minutes } => Alarm {
                name: name.to_string(),
                scheduled_time: now_ms.saturating_add(i64::from(period_minutes) * MS_PER_MINUTE),
                period_in_minutes: Some(period_minutes),
            },
            AlarmSpec::At { when_ms } => Alarm {
                name: name.to_string(),
                scheduled_time: when_ms,
                period_in_minutes: None,
            },
        };
        self.alarms.insert(name.to_string(), alarm.clone());
        Ok(alarm)
    }

    pub fn remove(&mut self, name: &str) -> Option<Alarm> {
        self.alarms.remove(name)
    }

    /// Every alarm due at `now_ms`, oldest first. Nothing is consumed.
    pub fn due(&self, now_ms: i64) -> Vec<Alarm> {
        let mut due: Vec<Alarm> = self
            .alarms
            .values()
            .filter(|alarm| alarm.scheduled_time <= now_ms)
            .cloned()
            .collect();
        due.sort_by_key(|alarm| alarm.scheduled_time);
        due
    }

    /// Consume a delivered firing of `fired`.
    ///
    /// One-shot alarms are removed. Periodic alarms fire once no matter how
    /// many periods were missed, then move to `fired_at_ms + period`. An
    /// alarm that was replaced or cleared since `fired` was read is left
    /// alone. Returns whether the table changed.
    pub fn acknowledge(&mut self, fired: &Alarm, fired_at_ms: i64) -> bool {
        match self.alarms.get_mut(&fired.name) {
            Some(current) if *current == *fired => match fired.period_in_minutes {
                Some(period) => {
                    current.scheduled_time =
                        fired_at_ms.saturating_add(i64::from(period) * MS_PER_MINUTE);
                    true
                }
                None => {
                    self.alarms.remove(&fired.name);
                    true
                }
            },
            _ => false,
        }
    }
}
