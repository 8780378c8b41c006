use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{Binding, CommitError, Store, StoreError, StoreResult};
use crate::models::{
    ActivationKey, Authorization, AuthorizationState, CertificateRecord, KeyState,
    UnauthorizedReport,
};

#[derive(Debug, Default)]
struct Tables {
    keys: HashMap<String, ActivationKey>,
    authorizations: HashMap<String, Authorization>,
    certificates: HashMap<String, CertificateRecord>,
    reports: Vec<UnauthorizedReport>,
}

impl Tables {
    fn check_authorization_unique(&self, auth: &Authorization) -> StoreResult<()> {
        if self.authorizations.contains_key(&auth.domain) {
            return Err(StoreError::unique("domain"));
        }
        for existing in self.authorizations.values() {
            if existing.token == auth.token {
                return Err(StoreError::unique("token"));
            }
            if existing.hash == auth.hash {
                return Err(StoreError::unique("hash"));
            }
        }
        Ok(())
    }

    fn check_certificate_unique(&self, cert: &CertificateRecord) -> StoreResult<()> {
        if self.certificates.contains_key(&cert.domain) {
            return Err(StoreError::unique("domain"));
        }
        for existing in self.certificates.values() {
            if existing.token == cert.token {
                return Err(StoreError::unique("token"));
            }
            if existing.hash == cert.hash {
                return Err(StoreError::unique("hash"));
            }
        }
        Ok(())
    }
}

/// In-process store.
///
/// All tables live behind one lock, so every operation (including
/// [`Store::commit_binding`]) is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_key(&self, key: &str) -> StoreResult<Option<ActivationKey>> {
        Ok(self.tables.lock().keys.get(key).cloned())
    }

    async fn insert_keys(&self, keys: &[ActivationKey]) -> StoreResult<()> {
        let mut tables = self.tables.lock();

        let mut batch = std::collections::HashSet::with_capacity(keys.len());
        for key in keys {
            if tables.keys.contains_key(&key.key) || !batch.insert(key.key.as_str()) {
                return Err(StoreError::unique("key"));
            }
        }

        for key in keys {
            tables.keys.insert(key.key.clone(), key.clone());
        }
        Ok(())
    }

    async fn mark_key_used(&self, key: &str, domain: &str) -> StoreResult<Option<ActivationKey>> {
        let mut tables = self.tables.lock();
        match tables.keys.get_mut(key) {
            Some(stored) if stored.is_unused() => {
                stored.state = KeyState::Used;
                stored.bound_domain = Some(domain.to_string());
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_unused_key(&self, key: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        let deletable = matches!(tables.keys.get(key), Some(stored) if stored.is_unused());
        if deletable {
            tables.keys.remove(key);
        }
        Ok(deletable)
    }

    async fn count_keys(&self, state: Option<KeyState>) -> StoreResult<u64> {
        let tables = self.tables.lock();
        let count = tables
            .keys
            .values()
            .filter(|k| state.map_or(true, |s| k.state == s))
            .count();
        Ok(count as u64)
    }

    async fn find_authorization(&self, domain: &str) -> StoreResult<Option<Authorization>> {
        Ok(self.tables.lock().authorizations.get(domain).cloned())
    }

    async fn find_matching_authorization(
        &self,
        domain: &str,
        certificate: &str,
        hash: &str,
    ) -> StoreResult<Option<Authorization>> {
        let tables = self.tables.lock();
        Ok(tables
            .authorizations
            .get(domain)
            .filter(|a| a.certificate == certificate && a.hash == hash)
            .cloned())
    }

    async fn insert_authorization(&self, authorization: &Authorization) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        tables.check_authorization_unique(authorization)?;
        tables
            .authorizations
            .insert(authorization.domain.clone(), authorization.clone());
        Ok(())
    }

    async fn set_authorization_state(
        &self,
        domain: &str,
        state: AuthorizationState,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        match tables.authorizations.get_mut(domain) {
            Some(auth) => {
                auth.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_authorizations(&self, state: Option<AuthorizationState>) -> StoreResult<u64> {
        let tables = self.tables.lock();
        let count = tables
            .authorizations
            .values()
            .filter(|a| state.map_or(true, |s| a.state == s))
            .count();
        Ok(count as u64)
    }

    async fn find_certificate(&self, domain: &str) -> StoreResult<Option<CertificateRecord>> {
        Ok(self.tables.lock().certificates.get(domain).cloned())
    }

    async fn insert_certificate(&self, certificate: &CertificateRecord) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        tables.check_certificate_unique(certificate)?;
        tables
            .certificates
            .insert(certificate.domain.clone(), certificate.clone());
        Ok(())
    }

    async fn insert_unauthorized_report(&self, report: &UnauthorizedReport) -> StoreResult<()> {
        self.tables.lock().reports.push(report.clone());
        Ok(())
    }

    async fn count_unauthorized_reports(&self) -> StoreResult<u64> {
        Ok(self.tables.lock().reports.len() as u64)
    }

    async fn commit_binding(&self, binding: &Binding) -> Result<ActivationKey, CommitError> {
        let mut tables = self.tables.lock();

        match tables.keys.get(binding.key()) {
            Some(key) if key.is_unused() => {}
            _ => return Err(CommitError::KeyUnavailable),
        }

        match tables.check_authorization_unique(&binding.authorization) {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on("domain") => return Err(CommitError::DomainTaken),
            Err(e) => return Err(CommitError::Store(e)),
        }
        match tables.check_certificate_unique(&binding.certificate) {
            Ok(()) => {}
            Err(e) if e.is_unique_violation_on("domain") => return Err(CommitError::DomainTaken),
            Err(e) => return Err(CommitError::Store(e)),
        }

        let Some(key) = tables.keys.get_mut(binding.key()) else {
            return Err(CommitError::KeyUnavailable);
        };
        key.state = KeyState::Used;
        key.bound_domain = Some(binding.domain().to_string());
        let key = key.clone();

        tables.authorizations.insert(
            binding.authorization.domain.clone(),
            binding.authorization.clone(),
        );
        tables
            .certificates
            .insert(binding.certificate.domain.clone(), binding.certificate.clone());

        Ok(key)
    }
}
