//! # Monitor List
//!
//! The global monitor registry: one record per display, indices dense and
//! primary-first after sort (SPEC_FULL §3). Rebuilt on demand, guarded by a
//! single mutex so the signaling/control-plane thread and the capture
//! thread never see a half-updated list.

use std::sync::Mutex;

/// One display's static properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRecord {
    /// Opaque platform handle (e.g. a display index from `scrap`).
    pub handle: u64,
    pub index: u8,
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u16,
    pub primary: bool,
    pub name: String,
}

/// Sorts monitors primary-first, then by their original order, and
/// reassigns dense `[0..count)` indices. Called whenever the list is
/// rebuilt.
pub fn normalize(mut monitors: Vec<MonitorRecord>) -> Vec<MonitorRecord> {
    monitors.sort_by_key(|m| (!m.primary, m.index));
    for (new_index, monitor) in monitors.iter_mut().enumerate() {
        monitor.index = new_index as u8;
    }
    monitors
}

/// The process-wide monitor list, mutex-guarded per §3.
#[derive(Debug, Default)]
pub struct MonitorList {
    monitors: Mutex<Vec<MonitorRecord>>,
}

impl MonitorList {
    pub fn new() -> Self {
        Self {
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the list wholesale with a freshly-enumerated, normalized set.
    pub fn rebuild(&self, monitors: Vec<MonitorRecord>) {
        let normalized = normalize(monitors);
        *self.monitors.lock().unwrap() = normalized;
    }

    pub fn snapshot(&self) -> Vec<MonitorRecord> {
        self.monitors.lock().unwrap().clone()
    }

    pub fn get(&self, index: u8) -> Option<MonitorRecord> {
        self.monitors
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.index == index)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(handle: u64, index: u8, primary: bool) -> MonitorRecord {
        MonitorRecord {
            handle,
            index,
            width: 1920,
            height: 1080,
            refresh_hz: 60,
            primary,
            name: format!("monitor-{index}"),
        }
    }

    #[test]
    fn normalize_puts_primary_first_with_dense_indices() {
        let monitors = vec![monitor(1, 0, false), monitor(2, 1, true), monitor(3, 2, false)];
        let normalized = normalize(monitors);
        assert_eq!(normalized[0].handle, 2);
        assert_eq!(normalized[0].index, 0);
        assert_eq!(normalized[1].index, 1);
        assert_eq!(normalized[2].index, 2);
    }

    #[test]
    fn rebuild_replaces_list_and_preserves_order() {
        let list = MonitorList::new();
        list.rebuild(vec![monitor(1, 0, true), monitor(2, 1, false)]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().handle, 1);
        assert_eq!(list.get(1).unwrap().handle, 2);
        assert!(list.get(5).is_none());
    }
}
