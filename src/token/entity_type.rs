// fillpdf-service/src/token/entity_type.rs

/// Translates between entity type names and token namespaces.
#[derive(Debug, Clone)]
pub struct EntityTypeMapper {
    aliases: Vec<(String, String)>,
}

impl Default for EntityTypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTypeMapper {
    pub fn new() -> Self {
        Self {
            aliases: vec![
                ("taxonomy_term".to_string(), "term".to_string()),
                ("taxonomy_vocabulary".to_string(), "vocabulary".to_string()),
            ],
        }
    }

    /// Registers an entity type whose token namespace differs from its name.
    pub fn with_alias(mut self, entity_type: impl Into<String>, token_type: impl Into<String>) -> Self {
        self.aliases.push((entity_type.into(), token_type.into()));
        self
    }

    pub fn token_type_for(&self, entity_type: &str) -> String {
        self.aliases
            .iter()
            .find(|(et, _)| et == entity_type)
            .map(|(_, tt)| tt.clone())
            .unwrap_or_else(|| entity_type.to_string())
    }

    /// Entity type owning `token_type`. A namespace that is itself an
    /// aliased entity type name has no entity type.
    pub fn entity_type_for(&self, token_type: &str) -> Option<String> {
        if let Some((et, _)) = self.aliases.iter().find(|(_, tt)| tt == token_type) {
            return Some(et.clone());
        }
        if self.aliases.iter().any(|(et, _)| et == token_type) {
            return None;
        }
        Some(token_type.to_string())
    }
}
