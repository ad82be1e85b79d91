//! Argument bags attached to slices, and the resolver contract that looks them up

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Real(v) => write!(f, "{v}"),
            ArgValue::Text(v) => f.write_str(v),
        }
    }
}

/// Key/value arguments of a slice. Cheap to clone; the empty set allocates nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSet {
    entries: Option<Arc<BTreeMap<String, ArgValue>>>,
}

impl ArgSet {
    pub const EMPTY: ArgSet = ArgSet { entries: None };

    pub fn new(entries: BTreeMap<String, ArgValue>) -> Self {
        if entries.is_empty() {
            return Self::EMPTY;
        }
        Self {
            entries: Some(Arc::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.entries.as_ref().and_then(|e| e.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.entries
            .iter()
            .flat_map(|e| e.iter())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(String, ArgValue)> for ArgSet {
    fn from_iter<I: IntoIterator<Item = (String, ArgValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Looks up argument sets by id. Unknown ids resolve to [`ArgSet::EMPTY`], never an error.
#[async_trait]
pub trait ArgResolver: Send + Sync {
    async fn resolve_many(&self, ids: &HashSet<i64>) -> Result<HashMap<i64, ArgSet>, QueryError>;

    async fn resolve_one(&self, id: i64) -> Result<ArgSet, QueryError> {
        let ids = HashSet::from([id]);
        let mut found = self.resolve_many(&ids).await?;
        Ok(found.remove(&id).unwrap_or_default())
    }
}
