use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{AuthError, AuthResult};

/// Verified token payload, kept as the provider sent it.
///
/// Role containers are read lazily from the raw JSON so that unexpected
/// shapes can be told apart from absent ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    raw: Map<String, Value>,
}

/// The nested role path existed but did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRoles(pub &'static str);

impl TokenClaims {
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(Value::as_str)
    }

    pub fn bool_claim(&self, name: &str) -> Option<bool> {
        self.raw.get(name).and_then(Value::as_bool)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.raw
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// `aud` as a list, whether the token carried one value or many.
    pub fn audience(&self) -> Vec<String> {
        match self.raw.get("aud") {
            Some(Value::String(item)) => vec![item.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Roles under `realm_access.roles`; empty when the path is missing or malformed.
    pub fn realm_roles(&self) -> Vec<String> {
        let container = self.raw.get("realm_access");
        roles_at(container, "realm_access").unwrap_or_default()
    }

    /// Roles under `resource_access.<client_id>.roles`; empty when missing or malformed.
    pub fn client_roles(&self, client_id: &str) -> Vec<String> {
        self.client_role_list(client_id).unwrap_or_default()
    }

    /// Looks up one client-scoped role.
    ///
    /// `Ok(false)` when any segment of `resource_access.<client_id>.roles` is
    /// absent, `Err` when a segment is present with the wrong JSON type.
    pub fn lookup_client_role(&self, client_id: &str, role: &str) -> Result<bool, MalformedRoles> {
        let roles = self.client_role_list(client_id)?;
        Ok(roles.iter().any(|value| value == role))
    }

    fn client_role_list(&self, client_id: &str) -> Result<Vec<String>, MalformedRoles> {
        let resource_access = match self.raw.get("resource_access") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(MalformedRoles("resource_access")),
        };
        roles_at(resource_access.get(client_id), "resource_access.client")
    }
}

fn roles_at(container: Option<&Value>, path: &'static str) -> Result<Vec<String>, MalformedRoles> {
    let container = match container {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(MalformedRoles(path)),
    };

    match container.get("roles") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or(MalformedRoles("roles")))
            .collect(),
        Some(_) => {
            warn!(path, "role container has a non-array roles entry");
            Err(MalformedRoles("roles"))
        }
    }
}

impl TryFrom<Value> for TokenClaims {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        match value {
            Value::Object(raw) => Ok(Self { raw }),
            other => Err(AuthError::MalformedClaims(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
