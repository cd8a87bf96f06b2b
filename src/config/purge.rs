use serde::{Deserialize, Serialize};

/// Tables that are always reserved, whatever the configuration says.
pub const RESERVED_TABLES: [&str; 2] = ["organizations", "organization_auth"];

/// Engine-wide purge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PurgeSettings {
    /// Tables that must never be reached as a dependent of a purged table,
    /// in addition to `organizations` and `organization_auth`.
    /// Their data has to be removed through its own controlled path first.
    /// Default: []
    #[serde(default)]
    pub reserved_tables: Vec<String>,

    /// Column scoping every root row to a tenant.
    /// Default: "resource_path"
    #[serde(default = "default_tenant_column")]
    pub tenant_column: String,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            reserved_tables: Vec::new(),
            tenant_column: default_tenant_column(),
        }
    }
}

fn default_tenant_column() -> String {
    "resource_path".to_string()
}

impl PurgeSettings {
    pub fn is_reserved(&self, table: &str) -> bool {
        RESERVED_TABLES.contains(&table) || self.reserved_tables.iter().any(|t| t == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PurgeSettings::default();
        assert!(settings.is_reserved("organizations"));
        assert!(settings.is_reserved("organization_auth"));
        assert!(!settings.is_reserved("lessons"));
        assert_eq!(settings.tenant_column, "resource_path");
    }

    #[test]
    fn test_configured_tables_extend_reserved_set() {
        let settings: PurgeSettings = toml::from_str(r#"reserved_tables = ["tenants"]"#).unwrap();
        assert!(settings.is_reserved("tenants"));
        assert!(settings.is_reserved("organizations"));
        assert!(settings.is_reserved("organization_auth"));
        assert_eq!(settings.tenant_column, "resource_path");
    }

    #[test]
    fn test_empty_list_keeps_fixed_reserved_tables() {
        let settings: PurgeSettings = toml::from_str("reserved_tables = []").unwrap();
        assert!(settings.is_reserved("organizations"));
        assert!(settings.is_reserved("organization_auth"));
    }
}
