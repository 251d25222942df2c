//! In-memory printer profile registry
//!
//! Profile persistence belongs to the configuration collaborators; the
//! spool only keeps the working set it schedules against. All lookups are
//! cheap clones so printing never holds a registry lock.

use crate::error::{SpoolError, SpoolResult};
use crate::types::PrinterProfile;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: DashMap<String, PrinterProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile
    pub fn upsert(&self, profile: PrinterProfile) {
        tracing::debug!(printer_id = %profile.id, name = %profile.name, "profile upserted");
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn remove(&self, id: &str) -> Option<PrinterProfile> {
        self.profiles.remove(id).map(|(_, p)| p)
    }

    pub fn get(&self, id: &str) -> Option<PrinterProfile> {
        self.profiles.get(id).map(|p| p.clone())
    }

    pub fn list(&self) -> Vec<PrinterProfile> {
        let mut all: Vec<_> = self.profiles.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The profile marked default, if any
    pub fn default_profile(&self) -> Option<PrinterProfile> {
        self.profiles
            .iter()
            .find(|p| p.is_default)
            .map(|p| p.clone())
    }

    /// Resolve a submission's printer reference: explicit id, or the
    /// registry default when the request names none.
    pub fn resolve(&self, printer_id: Option<&str>) -> SpoolResult<PrinterProfile> {
        match printer_id {
            Some(id) => self
                .get(id)
                .ok_or_else(|| SpoolError::ProfileNotFound(id.to_string())),
            None => self.default_profile().ok_or_else(|| {
                SpoolError::Validation("no printer specified and no default configured".into())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_printer::transport::{LinkConfig, NetworkLink};

    fn profile(id: &str, is_default: bool) -> PrinterProfile {
        PrinterProfile {
            id: id.to_string(),
            name: format!("Printer {}", id),
            printer_type: Some("thermal".into()),
            link: LinkConfig::Network(NetworkLink {
                host: "192.168.1.50".into(),
                port: 9100,
            }),
            capabilities: Default::default(),
            defaults: Default::default(),
            is_default,
        }
    }

    #[test]
    fn test_resolve_explicit_and_default() {
        let registry = ProfileRegistry::new();
        registry.upsert(profile("gate-1", false));
        registry.upsert(profile("booth", true));

        assert_eq!(registry.resolve(Some("gate-1")).unwrap().id, "gate-1");
        assert_eq!(registry.resolve(None).unwrap().id, "booth");
        assert!(matches!(
            registry.resolve(Some("missing")),
            Err(SpoolError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_without_default_fails() {
        let registry = ProfileRegistry::new();
        registry.upsert(profile("gate-1", false));
        assert!(matches!(
            registry.resolve(None),
            Err(SpoolError::Validation(_))
        ));
    }

    #[test]
    fn test_upsert_replaces() {
        let registry = ProfileRegistry::new();
        registry.upsert(profile("gate-1", false));
        let mut updated = profile("gate-1", true);
        updated.name = "Renamed".into();
        registry.upsert(updated);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("gate-1").unwrap().name, "Renamed");
        assert!(registry.default_profile().is_some());
    }
}
