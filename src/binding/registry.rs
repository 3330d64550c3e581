use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{MethodBinding, MethodContract, bind};
use crate::core::{BindingError, TableDescriptor};

type MethodKey = (String, String);

/// Bound methods by (table, method name).
///
/// Registration is idempotent for equal contracts. Lookups hand out shared
/// `Arc<MethodBinding>`s, so a binding stays valid for as long as a caller
/// holds it.
#[derive(Default)]
pub struct MethodRegistry {
    bindings: RwLock<HashMap<MethodKey, Arc<MethodBinding>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MethodKey, Arc<MethodBinding>>> {
        self.bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MethodKey, Arc<MethodBinding>>> {
        self.bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(
        &self,
        contract: MethodContract,
        table: &TableDescriptor,
    ) -> Result<Arc<MethodBinding>, BindingError> {
        self.register_all(vec![contract], table)?
            .pop()
            .ok_or_else(|| BindingError::InvalidContract {
                method: String::new(),
                reason: "nothing was registered".to_string(),
            })
    }

    /// Binds every contract first and registers them only if all succeed.
    pub fn register_all(
        &self,
        contracts: Vec<MethodContract>,
        table: &TableDescriptor,
    ) -> Result<Vec<Arc<MethodBinding>>, BindingError> {
        let bound = contracts
            .iter()
            .map(|contract| bind(contract, table))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bindings = self.write();
        let mut staged: HashMap<MethodKey, Arc<MethodBinding>> = HashMap::new();
        let mut result = Vec::with_capacity(bound.len());

        for binding in bound {
            let key = (binding.table().to_string(), binding.name().to_string());
            let existing = staged.get(&key).or_else(|| bindings.get(&key));

            match existing {
                Some(existing) if **existing == binding => result.push(Arc::clone(existing)),
                Some(_) => {
                    return Err(BindingError::DuplicateMethod {
                        table: key.0,
                        method: key.1,
                    });
                }
                None => {
                    let binding = Arc::new(binding);
                    staged.insert(key, Arc::clone(&binding));
                    result.push(binding);
                }
            }
        }

        for ((table, method), binding) in staged {
            debug!(table = %table, method = %method, sql = binding.sql(), "registered method");
            bindings.insert((table, method), binding);
        }

        Ok(result)
    }

    /// Loads a JSON array of contracts and registers them against `table`.
    pub fn register_json(
        &self,
        json: &str,
        table: &TableDescriptor,
    ) -> Result<Vec<Arc<MethodBinding>>, BindingError> {
        let contracts: Vec<MethodContract> =
            serde_json::from_str(json).map_err(|e| BindingError::InvalidContract {
                method: "<json>".to_string(),
                reason: e.to_string(),
            })?;
        self.register_all(contracts, table)
    }

    pub fn get(&self, table: &str, method: &str) -> Result<Arc<MethodBinding>, BindingError> {
        self.read()
            .get(&(table.to_string(), method.to_string()))
            .cloned()
            .ok_or_else(|| BindingError::UnknownMethod {
                table: table.to_string(),
                method: method.to_string(),
            })
    }

    /// Method names registered for `table`, sorted.
    pub fn methods(&self, table: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, method)| method.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
