//! Desired-state reconciliation.
//!
//! Every provisioning step probes the platform first and hands the probed
//! state together with the desired state to one of the functions here. The
//! returned [`Action`] is the only mutation the step is allowed to make.

use crate::domain::model::{JobDefinition, ScheduleDefinition, SecretEnv, SecretState, SecretValue};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create,
    Update { changed: Vec<&'static str> },
    Unchanged,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Unchanged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update { .. } => "update",
            Action::Unchanged => "unchanged",
        }
    }
}

/// Field-level comparison between a desired value and what was probed.
pub trait Reconcile {
    fn changed_fields(&self, current: &Self) -> Vec<&'static str>;
}

pub fn plan<T: Reconcile>(current: Option<&T>, desired: &T) -> Action {
    match current {
        None => Action::Create,
        Some(current) => {
            let changed = desired.changed_fields(current);
            if changed.is_empty() {
                Action::Unchanged
            } else {
                Action::Update { changed }
            }
        }
    }
}

/// Secrets are versioned rather than updated: a differing payload means a new version.
pub fn plan_secret(current: Option<&SecretState>, payload: &SecretValue) -> Action {
    match current {
        None => Action::Create,
        Some(state) if state.latest.as_ref() == Some(payload) => Action::Unchanged,
        Some(_) => Action::Update {
            changed: vec!["payload"],
        },
    }
}

/// Entries of `desired` not yet present in `current`, in input order, without repeats.
pub fn missing_members(current: &BTreeSet<String>, desired: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    desired
        .iter()
        .filter(|member| !current.contains(*member) && seen.insert((*member).clone()))
        .cloned()
        .collect()
}

/// `1000m` and `1` describe the same limit; Cloud Run reports either.
pub fn normalize_cpu(cpu: &str) -> String {
    if let Some(millis) = cpu.strip_suffix('m') {
        if let Ok(value) = millis.parse::<u64>() {
            if value % 1000 == 0 {
                return (value / 1000).to_string();
            }
        }
        return cpu.to_string();
    }
    match cpu.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => format!("{}", value as u64),
        _ => cpu.to_string(),
    }
}

fn sorted_secret_env(entries: &[SecretEnv]) -> Vec<&SecretEnv> {
    let mut sorted: Vec<&SecretEnv> = entries.iter().collect();
    sorted.sort_by(|a, b| a.env_var.cmp(&b.env_var));
    sorted
}

impl Reconcile for JobDefinition {
    fn changed_fields(&self, current: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.image != current.image {
            changed.push("image");
        }
        if normalize_cpu(&self.limits.cpu) != normalize_cpu(&current.limits.cpu) {
            changed.push("cpu");
        }
        if self.limits.memory != current.limits.memory {
            changed.push("memory");
        }
        if self.env != current.env {
            changed.push("env");
        }
        if sorted_secret_env(&self.secret_env) != sorted_secret_env(&current.secret_env) {
            changed.push("secrets");
        }
        // An unset service account means "platform default", whatever the probe reports.
        if self.service_account.is_some() && self.service_account != current.service_account {
            changed.push("service_account");
        }
        if self.max_retries != current.max_retries {
            changed.push("max_retries");
        }
        if self.task_timeout_secs != current.task_timeout_secs {
            changed.push("task_timeout");
        }
        if self.mounts != current.mounts {
            changed.push("mounts");
        }
        changed
    }
}

impl Reconcile for ScheduleDefinition {
    fn changed_fields(&self, current: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.cron != current.cron {
            changed.push("schedule");
        }
        if self.timezone != current.timezone {
            changed.push("timezone");
        }
        if self.target_uri != current.target_uri {
            changed.push("uri");
        }
        if self.service_account != current.service_account {
            changed.push("service_account");
        }
        changed
    }
}
