// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RBAC policy engine backed by casbin.
//!
//! Requests are evaluated as `(role:<name>, path, method)` for each role the
//! caller holds. The decision is allow as soon as one role is allowed; a
//! caller without roles is always denied. Role inheritance (`g` rules) and
//! path wildcards are resolved by the casbin model.

use std::collections::BTreeSet;
use std::path::Path;

use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter, MemoryAdapter, MgmtApi};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{AuthzConfig, AuthzProvider, ConfigError};

/// Prefix that namespaces role subjects in the policy.
pub const ROLE_PREFIX: &str = "role:";

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// `role` is the first namespaced role that was allowed.
    Allow { role: String },
    /// No role was allowed; `errors` holds per-role evaluation failures.
    Deny { errors: Vec<String> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Namespace a role name for policy evaluation.
pub fn namespaced_role(role: &str) -> String {
    format!("{ROLE_PREFIX}{role}")
}

pub struct PolicyEnforcer {
    enforcer: RwLock<Enforcer>,
}

impl PolicyEnforcer {
    /// Build the engine from the `authZ` configuration section.
    pub async fn from_config(config: &AuthzConfig) -> Result<Self, ConfigError> {
        match config.provider {
            AuthzProvider::File => {
                let file = config
                    .file
                    .as_ref()
                    .ok_or(ConfigError::MissingProviderConfig("file"))?;
                Self::from_files(&file.model_path, &file.policy_path).await
            }
            AuthzProvider::Inline => {
                let inline = config
                    .inline
                    .as_ref()
                    .ok_or(ConfigError::MissingProviderConfig("inline"))?;
                Self::from_strings(&inline.model, &inline.policy).await
            }
            AuthzProvider::Database => Err(ConfigError::NotImplemented("database")),
        }
    }

    /// Load a casbin model file and CSV policy file.
    pub async fn from_files(model_path: &Path, policy_path: &Path) -> Result<Self, ConfigError> {
        info!(
            model = %model_path.display(),
            policy = %policy_path.display(),
            "Loading casbin model and policy files"
        );
        for path in [model_path, policy_path] {
            if !path.is_file() {
                return Err(ConfigError::Policy(format!("{} does not exist", path.display())));
            }
        }

        let model_path = model_path.to_string_lossy().into_owned();
        let model = DefaultModel::from_file(model_path.as_str())
            .await
            .map_err(|e| ConfigError::Policy(format!("invalid model {model_path}: {e}")))?;
        let adapter = FileAdapter::new(policy_path.to_string_lossy().into_owned());
        let enforcer = Enforcer::new(model, adapter)
            .await
            .map_err(|e| ConfigError::Policy(e.to_string()))?;

        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }

    /// Build from a model and a CSV policy held in memory.
    ///
    /// Blank lines and `#` comments are ignored; leading indentation is
    /// stripped so both can be embedded in YAML block scalars.
    pub async fn from_strings(model: &str, policy: &str) -> Result<Self, ConfigError> {
        info!("Loading inline casbin model and policy");
        let model_text = non_blank_lines(model).collect::<Vec<_>>().join("\n");
        let model = DefaultModel::from_str(&model_text)
            .await
            .map_err(|e| ConfigError::Policy(format!("invalid inline model: {e}")))?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default())
            .await
            .map_err(|e| ConfigError::Policy(e.to_string()))?;

        let mut policies: Vec<(String, Vec<String>)> = Vec::new();
        for line in non_blank_lines(policy) {
            let mut fields = line.split(',').map(str::trim);
            let ptype = fields.next().unwrap_or_default().to_string();
            let rule: Vec<String> = fields.map(str::to_string).collect();
            if rule.is_empty() {
                return Err(ConfigError::Policy(format!("invalid policy line: {line}")));
            }
            if !policies.contains(&(ptype.clone(), rule.clone())) {
                policies.push((ptype, rule));
            }
        }

        for (ptype, rule) in policies {
            let result = match ptype.chars().next() {
                Some('p') => enforcer.add_named_policies(&ptype, vec![rule]).await,
                Some('g') => enforcer.add_named_grouping_policies(&ptype, vec![rule]).await,
                _ => return Err(ConfigError::Policy(format!("unknown policy type: {ptype}"))),
            };
            result.map_err(|e| ConfigError::Policy(e.to_string()))?;
        }

        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }

    /// Decide whether any of `roles` may perform `method` on `path`.
    pub async fn authorize(&self, roles: &BTreeSet<String>, path: &str, method: &str) -> Decision {
        let enforcer = self.enforcer.read().await;
        let mut errors = Vec::new();

        for role in roles {
            let subject = namespaced_role(role);
            match enforcer.enforce((subject.as_str(), path, method)) {
                Ok(true) => {
                    debug!(role = %subject, path, method, "Policy allowed request");
                    return Decision::Allow { role: subject };
                }
                Ok(false) => {}
                Err(e) => errors.push(format!("{subject}: {e}")),
            }
        }

        Decision::Deny { errors }
    }

    /// Re-read the policy through the adapter.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .load_policy()
            .await
            .map_err(|e| ConfigError::Policy(e.to_string()))?;
        info!("Authorization policy reloaded");
        Ok(())
    }
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}
