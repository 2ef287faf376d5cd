use std::collections::HashMap;
use tracing::info;

use crate::domain::ObjectRule;
use crate::ports::StorageRepository;

/// Generation rules keyed by object type, loaded once at startup and read-only
/// for the process lifetime. Shared behind an `Arc` with no locking.
pub struct RuleCache {
    rules: HashMap<i16, ObjectRule>,
}

impl RuleCache {
    pub async fn load(store: &dyn StorageRepository) -> anyhow::Result<Self> {
        let rules = store.load_rules().await?;
        let mut map = HashMap::with_capacity(rules.len());
        for rule in rules {
            map.insert(rule.param_id, rule);
        }
        info!("Loaded {} object rules into cache", map.len());
        Ok(Self { rules: map })
    }

    /// Rule for the given object type. An unknown type gets the zero rule,
    /// which generates a constant zero value.
    pub fn get(&self, param_id: i16) -> ObjectRule {
        self.rules
            .get(&param_id)
            .cloned()
            .unwrap_or_else(|| ObjectRule::zero(param_id))
    }

    #[cfg(test)]
    pub fn from_rules(rules: Vec<ObjectRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.param_id, r)).collect(),
        }
    }
}
