// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_config_core::{ResolvedValue, TenantId};
use tokio::sync::RwLock;

use crate::error::{ResolveError, Result};

/// Shape a resolved value must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
	Any,
	String,
	Integer {
		#[serde(default)]
		min: Option<i64>,
		#[serde(default)]
		max: Option<i64>,
	},
	/// Integers or floats.
	Number,
	Boolean,
	Bytes,
	Secret,
	Array {
		items: Box<Schema>,
	},
	Object {
		#[serde(default)]
		fields: BTreeMap<String, Schema>,
		#[serde(default)]
		required: Vec<String>,
		#[serde(default = "default_additional")]
		additional: bool,
	},
}

fn default_additional() -> bool {
	true
}

impl Schema {
	pub fn validate(&self, value: &ResolvedValue) -> Result<()> {
		self.validate_at(value, "$")
	}

	fn validate_at(&self, value: &ResolvedValue, path: &str) -> Result<()> {
		match (self, value) {
			(Schema::Any, _)
			| (Schema::String, ResolvedValue::String(_))
			| (Schema::Number, ResolvedValue::Integer(_) | ResolvedValue::Float(_))
			| (Schema::Boolean, ResolvedValue::Boolean(_))
			| (Schema::Bytes, ResolvedValue::Bytes(_))
			| (Schema::Secret, ResolvedValue::Secret(_)) => Ok(()),
			(Schema::Integer { min, max }, ResolvedValue::Integer(i)) => {
				if min.is_some_and(|min| *i < min) || max.is_some_and(|max| *i > max) {
					return Err(ResolveError::mismatch(path, "integer out of range"));
				}
				Ok(())
			}
			(Schema::Array { items }, ResolvedValue::Array(values)) => {
				for (i, item) in values.iter().enumerate() {
					items.validate_at(item, &format!("{path}[{i}]"))?;
				}
				Ok(())
			}
			(
				Schema::Object {
					fields,
					required,
					additional,
				},
				ResolvedValue::Object(map),
			) => {
				if let Some(missing) = required.iter().find(|name| !map.contains_key(*name)) {
					return Err(ResolveError::mismatch(
						format!("{path}.{missing}"),
						"required field missing",
					));
				}
				for (name, item) in map {
					let field_path = format!("{path}.{name}");
					match fields.get(name) {
						Some(schema) => schema.validate_at(item, &field_path)?,
						None if !additional => {
							return Err(ResolveError::mismatch(field_path, "unexpected field"))
						}
						None => {}
					}
				}
				Ok(())
			}
			(schema, value) => Err(ResolveError::mismatch(
				path,
				format!("expected {}, found {}", schema.kind_name(), value.kind_name()),
			)),
		}
	}

	fn kind_name(&self) -> &'static str {
		match self {
			Schema::Any => "any",
			Schema::String => "string",
			Schema::Integer { .. } => "integer",
			Schema::Number => "number",
			Schema::Boolean => "boolean",
			Schema::Bytes => "bytes",
			Schema::Secret => "secret",
			Schema::Array { .. } => "array",
			Schema::Object { .. } => "object",
		}
	}
}

/// Source of declared schemas, keyed by entry scope and schema version.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
	async fn schema(
		&self,
		tenant_id: &TenantId,
		namespace: &str,
		key: &str,
		version: u32,
	) -> Option<Schema>;
}

type SchemaKey = (TenantId, String, String, u32);

#[derive(Default)]
pub struct InMemorySchemaRegistry {
	schemas: RwLock<HashMap<SchemaKey, Schema>>,
}

impl InMemorySchemaRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn register(
		&self,
		tenant_id: &TenantId,
		namespace: &str,
		key: &str,
		version: u32,
		schema: Schema,
	) {
		self.schemas.write().await.insert(
			(
				tenant_id.clone(),
				namespace.to_string(),
				key.to_string(),
				version,
			),
			schema,
		);
	}
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
	async fn schema(
		&self,
		tenant_id: &TenantId,
		namespace: &str,
		key: &str,
		version: u32,
	) -> Option<Schema> {
		self.schemas
			.read()
			.await
			.get(&(
				tenant_id.clone(),
				namespace.to_string(),
				key.to_string(),
				version,
			))
			.cloned()
	}
}
