// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! String dictionaries for device ids, signals, categories and sources.

use plcscope_kernel::config::SIGNAL_KEY_SEPARATOR;
use plcscope_kernel::SignalType;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Bidirectional string <-> dense id table.
#[derive(Clone, Debug, Default)]
pub struct Interner {
    names: Vec<Arc<str>>,
    ids: FxHashMap<Arc<str>, u32>,
}

impl Interner {
    /// Returns the id of `name`, and whether it was newly added.
    pub fn intern(&mut self, name: &str) -> (u32, bool) {
        if let Some(&id) = self.ids.get(name) {
            return (id, false);
        }
        let id = self.names.len() as u32;
        let shared: Arc<str> = Arc::from(name);
        self.names.push(shared.clone());
        self.ids.insert(shared, id);
        (id, true)
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_ref())
    }

    /// Rank of every id when names are sorted ascending.
    pub fn ranks(&self) -> Vec<u32> {
        let mut order: Vec<u32> = (0..self.names.len() as u32).collect();
        order.sort_by(|a, b| self.names[*a as usize].cmp(&self.names[*b as usize]));
        let mut ranks = vec![0u32; order.len()];
        for (rank, id) in order.into_iter().enumerate() {
            ranks[id as usize] = rank as u32;
        }
        ranks
    }
}

#[derive(Clone, Debug)]
pub struct SignalInfo {
    pub device: u32,
    pub name: Arc<str>,
    /// `device::signal`
    pub key: Arc<str>,
    /// Type of the most recently stored value.
    pub latest_type: SignalType,
}

#[derive(Clone, Debug, Default)]
pub struct Dictionaries {
    pub devices: Interner,
    pub categories: Interner,
    pub sources: Interner,
    signals: Vec<SignalInfo>,
    signal_ids: FxHashMap<Arc<str>, u32>,
}

impl Dictionaries {
    /// Resolves (and registers on first sight) the signal id for a
    /// device/name pair. `scratch` is reused to build the lookup key.
    /// Returns the id and whether the dictionaries changed.
    pub fn signal_id(
        &mut self,
        device_id: &str,
        signal_name: &str,
        observed: SignalType,
        scratch: &mut String,
    ) -> (u32, bool) {
        scratch.clear();
        scratch.push_str(device_id);
        scratch.push_str(SIGNAL_KEY_SEPARATOR);
        scratch.push_str(signal_name);

        if let Some(&id) = self.signal_ids.get(scratch.as_str()) {
            let info = &mut self.signals[id as usize];
            if info.latest_type != observed {
                info.latest_type = observed;
                return (id, true);
            }
            return (id, false);
        }

        let (device, _) = self.devices.intern(device_id);
        let id = self.signals.len() as u32;
        let key: Arc<str> = Arc::from(scratch.as_str());
        self.signals.push(SignalInfo {
            device,
            name: Arc::from(signal_name),
            key: key.clone(),
            latest_type: observed,
        });
        self.signal_ids.insert(key, id);
        (id, true)
    }

    pub fn signal(&self, id: u32) -> Option<&SignalInfo> {
        self.signals.get(id as usize)
    }

    pub fn signal_by_key(&self, key: &str) -> Option<u32> {
        self.signal_ids.get(key).copied()
    }

    pub fn signals(&self) -> &[SignalInfo] {
        &self.signals
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Rank of every signal id when ordered by signal name, then key.
    pub fn signal_name_ranks(&self) -> Vec<u32> {
        let mut order: Vec<u32> = (0..self.signals.len() as u32).collect();
        order.sort_by(|a, b| {
            let (a, b) = (&self.signals[*a as usize], &self.signals[*b as usize]);
            a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key))
        });
        let mut ranks = vec![0u32; order.len()];
        for (rank, id) in order.into_iter().enumerate() {
            ranks[id as usize] = rank as u32;
        }
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interner_ids_are_dense_and_stable() {
        let mut names = Interner::default();
        assert_eq!(names.intern("b"), (0, true));
        assert_eq!(names.intern("a"), (1, true));
        assert_eq!(names.intern("b"), (0, false));
        assert_eq!(names.name(1), Some("a"));
        assert_eq!(names.id_of("zzz"), None);
        assert_eq!(names.ranks(), vec![1, 0]);
    }

    #[test]
    fn test_signal_registration_tracks_latest_type() {
        let mut dicts = Dictionaries::default();
        let mut scratch = String::new();
        let (id, changed) = dicts.signal_id("Robot-01", "Mode", SignalType::String, &mut scratch);
        assert!(changed);
        assert_eq!(dicts.signal_id("Robot-01", "Mode", SignalType::String, &mut scratch), (id, false));
        assert_eq!(dicts.signal_id("Robot-01", "Mode", SignalType::Integer, &mut scratch), (id, true));

        let info = dicts.signal(id).unwrap();
        assert_eq!(&*info.key, "Robot-01::Mode");
        assert_eq!(info.latest_type, SignalType::Integer);
        assert_eq!(dicts.devices.name(info.device), Some("Robot-01"));
        assert_eq!(dicts.signal_by_key("Robot-01::Mode"), Some(id));
    }
}
