//! Catalog statements built as SQL text plus positional parameters.
//!
//! Every caller-supplied value (assembly, permission names, search text) is
//! bound as a parameter; only fixed fragments are ever concatenated.

use rusqlite::types::Value;

use crate::domain::Principal;

const SAMPLE_COLUMNS: &str = "s.public_id, d.public_id, d.genome, d.assembly, d.platform, \
     d.name, s.name, s.reads, s.type, s.url, s.tags";

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Dataset visibility for one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionFilter {
    /// Admins: no permission predicate at all.
    Unrestricted,
    /// Dataset must carry at least one of these permission names.
    AnyOf(Vec<String>),
    /// Non-admin without permissions sees nothing.
    Nothing,
}

impl PermissionFilter {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.is_admin {
            PermissionFilter::Unrestricted
        } else if principal.permissions.is_empty() {
            PermissionFilter::Nothing
        } else {
            PermissionFilter::AnyOf(principal.permissions.iter().cloned().collect())
        }
    }

    fn render(&self, params: &mut Vec<Value>) -> Option<String> {
        match self {
            PermissionFilter::Unrestricted => None,
            PermissionFilter::Nothing => Some("0 = 1".to_string()),
            PermissionFilter::AnyOf(names) => {
                let placeholders = vec!["?"; names.len()].join(", ");
                params.extend(names.iter().cloned().map(Value::Text));
                Some(format!(
                    "EXISTS (SELECT 1 FROM dataset_permissions dp \
                     JOIN permissions p ON dp.permission_id = p.id \
                     WHERE dp.dataset_id = d.id AND p.name IN ({placeholders}))"
                ))
            }
        }
    }
}

struct Select {
    sql: String,
    where_parts: Vec<String>,
    params: Vec<Value>,
}

impl Select {
    fn new(head: &str) -> Self {
        Self {
            sql: head.to_string(),
            where_parts: Vec::new(),
            params: Vec::new(),
        }
    }

    fn permissions(mut self, filter: &PermissionFilter) -> Self {
        if let Some(predicate) = filter.render(&mut self.params) {
            self.where_parts.push(predicate);
        }
        self
    }

    fn eq(mut self, column: &str, value: &str) -> Self {
        self.where_parts.push(format!("{column} = ?"));
        self.params.push(Value::Text(value.to_string()));
        self
    }

    fn assembly(mut self, assembly: &str) -> Self {
        self.where_parts.push("LOWER(d.assembly) = ?".to_string());
        self.params
            .push(Value::Text(assembly.trim().to_lowercase()));
        self
    }

    fn any_match(mut self, term: &str) -> Self {
        let pattern = format!("%{}%", escape_like(term));
        self.where_parts.push(
            "(s.public_id = ? OR d.public_id = ? OR d.platform = ? \
             OR d.name LIKE ? ESCAPE '!' OR s.name LIKE ? ESCAPE '!')"
                .to_string(),
        );
        for _ in 0..3 {
            self.params.push(Value::Text(term.to_string()));
        }
        for _ in 0..2 {
            self.params.push(Value::Text(pattern.clone()));
        }
        self
    }

    fn order_by(self, columns: &str) -> SqlQuery {
        let mut sql = self.sql;
        if !self.where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_parts.join(" AND "));
        }
        if !columns.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(columns);
        }
        SqlQuery {
            sql,
            params: self.params,
        }
    }
}

pub fn platforms(assembly: &str, filter: &PermissionFilter) -> SqlQuery {
    Select::new("SELECT DISTINCT d.genome, d.assembly, d.platform FROM datasets d")
        .permissions(filter)
        .assembly(assembly)
        .order_by("d.genome, d.assembly, d.platform")
}

pub fn datasets(assembly: &str, platform: Option<&str>, filter: &PermissionFilter) -> SqlQuery {
    let select = Select::new(
        "SELECT d.public_id, d.genome, d.assembly, d.platform, d.name FROM datasets d",
    )
    .permissions(filter)
    .assembly(assembly);
    let select = match platform {
        Some(platform) => select.eq("d.platform", platform),
        None => select,
    };
    select.order_by("d.genome, d.assembly, d.name, d.public_id")
}

/// `term` is expected to be trimmed; an empty term lists every visible sample.
pub fn search_samples(assembly: &str, term: &str, filter: &PermissionFilter) -> SqlQuery {
    let select = Select::new(&sample_head())
        .permissions(filter)
        .assembly(assembly);
    let select = if term.is_empty() {
        select
    } else {
        select.any_match(term)
    };
    select.order_by("d.platform, d.name, s.name, s.public_id")
}

pub fn dataset_samples(dataset_id: &str, filter: &PermissionFilter) -> SqlQuery {
    Select::new(&sample_head())
        .permissions(filter)
        .eq("d.public_id", dataset_id)
        .order_by("s.name, s.public_id")
}

pub fn can_view(sample_id: &str, filter: &PermissionFilter) -> SqlQuery {
    Select::new("SELECT s.public_id FROM samples s JOIN datasets d ON s.dataset_id = d.id")
        .permissions(filter)
        .eq("s.public_id", sample_id)
        .order_by("")
}

pub fn sample_by_id(sample_id: &str) -> SqlQuery {
    Select::new(&sample_head())
        .eq("s.public_id", sample_id)
        .order_by("")
}

fn sample_head() -> String {
    format!("SELECT {SAMPLE_COLUMNS} FROM samples s JOIN datasets d ON s.dataset_id = d.id")
}

pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '!' | '%' | '_' => {
                out.push('!');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
