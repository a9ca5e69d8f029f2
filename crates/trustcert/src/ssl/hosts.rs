//! Host-set reconciliation between an existing leaf certificate and a
//! signing request. Hosts compare by exact, case-sensitive string equality.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    Reuse,
    Extend,
    Regenerate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub action: HostAction,
    pub hosts: Vec<String>,
}

/// Order-preserving dedup.
pub fn dedup(hosts: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(hosts.len());
    for host in hosts {
        if !unique.contains(host) {
            unique.push(host.clone());
        }
    }
    unique
}

pub fn covers(current: &[String], requested: &[String]) -> bool {
    requested.iter().all(|host| current.contains(host))
}

/// `current` in its own order, followed by the requested hosts it lacks.
pub fn extend(current: &[String], requested: &[String]) -> Vec<String> {
    let mut hosts = dedup(current);
    for host in requested {
        if !hosts.contains(host) {
            hosts.push(host.clone());
        }
    }
    hosts
}

pub fn reconcile(current: &[String], requested: &[String], overwrite: bool) -> Reconciliation {
    if overwrite {
        return Reconciliation {
            action: HostAction::Regenerate,
            hosts: dedup(requested),
        };
    }

    if covers(current, requested) {
        return Reconciliation {
            action: HostAction::Reuse,
            hosts: dedup(current),
        };
    }

    Reconciliation {
        action: HostAction::Extend,
        hosts: extend(current, requested),
    }
}
