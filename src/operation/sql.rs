use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SqlSource {
    Static {
        sql: Vec<String>,
        only_backends: Option<Vec<String>>,
    },
    ByBackend(BTreeMap<String, Vec<String>>),
}

impl SqlSource {
    fn resolve(&self, dialect: &str) -> Option<Vec<String>> {
        match self {
            SqlSource::Static { sql, only_backends } => {
                if let Some(ref only) = only_backends {
                    if !only.iter().any(|b| b == dialect) {
                        return Some(vec![]);
                    }
                }
                Some(sql.clone())
            }
            SqlSource::ByBackend(map) => map.get(dialect).cloned(),
        }
    }

    fn only_backends(&self) -> Option<Vec<String>> {
        match self {
            SqlSource::Static {
                ref only_backends, ..
            } => only_backends.clone(),
            SqlSource::ByBackend(_) => None,
        }
    }
}

/// Opaque SQL passed through to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSql {
    forward: SqlSource,
    backward: Option<SqlSource>,
    description: String,
}

impl RawSql {
    /// SQL that runs on every backend.
    pub fn new(sql: impl Into<String>) -> Self {
        Self::multiple(vec![sql.into()])
    }

    pub fn multiple(sqls: Vec<String>) -> Self {
        Self {
            forward: SqlSource::Static {
                sql: sqls,
                only_backends: None,
            },
            backward: None,
            description: "Run custom SQL".to_string(),
        }
    }

    pub fn reversible(forward: impl Into<String>, backward: impl Into<String>) -> Self {
        Self::new(forward).with_reverse(backward)
    }

    /// SQL that must be given per backend with `for_backend()`.
    /// Compiling for a backend without an entry is an error.
    pub fn portable() -> Self {
        Self {
            forward: SqlSource::ByBackend(BTreeMap::new()),
            backward: None,
            description: "Run portable SQL".to_string(),
        }
    }

    pub fn for_backend(mut self, backend: &str, sql: impl Into<String>) -> Self {
        if let SqlSource::ByBackend(ref mut map) = self.forward {
            map.insert(backend.to_string(), vec![sql.into()]);
        }
        self
    }

    pub fn for_backend_reversible(
        mut self,
        backend: &str,
        forward: impl Into<String>,
        backward: impl Into<String>,
    ) -> Self {
        if let SqlSource::ByBackend(ref mut map) = self.forward {
            map.insert(backend.to_string(), vec![forward.into()]);
        }
        let mut backward_map = match self.backward {
            Some(SqlSource::ByBackend(map)) => map,
            _ => BTreeMap::new(),
        };
        backward_map.insert(backend.to_string(), vec![backward.into()]);
        self.backward = Some(SqlSource::ByBackend(backward_map));
        self
    }

    /// Restrict to the named backends; elsewhere the statement is skipped.
    pub fn only_for(mut self, backends: &[&str]) -> Self {
        let only: Vec<String> = backends.iter().map(|s| s.to_string()).collect();
        if let SqlSource::Static {
            ref mut only_backends,
            ..
        } = self.forward
        {
            *only_backends = Some(only.clone());
        }
        if let Some(SqlSource::Static {
            ref mut only_backends,
            ..
        }) = self.backward
        {
            *only_backends = Some(only);
        }
        self
    }

    pub fn with_reverse(self, sql: impl Into<String>) -> Self {
        self.with_reverse_multiple(vec![sql.into()])
    }

    pub fn with_reverse_multiple(mut self, sqls: Vec<String>) -> Self {
        self.backward = Some(SqlSource::Static {
            sql: sqls,
            only_backends: self.forward.only_backends(),
        });
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Statements for the named dialect.
    pub fn statements(&self, dialect: &'static str) -> Result<Vec<String>, CompileError> {
        self.forward.resolve(dialect).ok_or_else(|| {
            CompileError::unsupported(
                dialect,
                format!("raw SQL '{}' (no statement for this backend)", self.description),
            )
        })
    }

    pub fn inverse(&self) -> Option<RawSql> {
        self.backward.as_ref().map(|backward| RawSql {
            forward: backward.clone(),
            backward: Some(self.forward.clone()),
            description: self.description.clone(),
        })
    }
}
