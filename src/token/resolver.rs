// fillpdf-service/src/token/resolver.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TokensConfig;
use crate::entity::{Entity, EntityContext, FileAccessor};
use crate::mapping::FieldMapping;
use crate::models::Replacements;
use crate::token::entity_type::EntityTypeMapper;
use crate::token::html;
use crate::token::provider::{
    EntityTokenProvider, FieldImageProvider, GlobalTokenProvider, ImageTokenProvider,
    SubmissionImageProvider, TextTokenProvider,
};
use crate::token::scanner::{self, TokenGroup};

/// Which mapping variant a resolution may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Any,
    Text,
    Image,
}

impl ContentKind {
    fn allows_image(self) -> bool {
        self != ContentKind::Text
    }

    fn allows_text(self) -> bool {
        self != ContentKind::Image
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub content: ContentKind,
    pub replacements: Replacements,
    pub prefix: String,
    pub suffix: String,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: ContentKind) -> Self {
        self.content = content;
        self
    }

    pub fn with_replacements(mut self, replacements: Replacements) -> Self {
        self.replacements = replacements;
        self
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }
}

/// Turns one token template plus candidate entities into one [`FieldMapping`].
///
/// Resolution never fails. Tokens nobody can resolve become empty strings.
/// When several entities of one type resolve the same token, the last one in
/// the supplied list wins, for images and text alike.
pub struct TokenResolver {
    mapper: EntityTypeMapper,
    text_providers: Vec<Arc<dyn TextTokenProvider>>,
    image_providers: Vec<Arc<dyn ImageTokenProvider>>,
}

impl TokenResolver {
    pub fn new(mapper: EntityTypeMapper) -> Self {
        Self {
            mapper,
            text_providers: Vec::new(),
            image_providers: Vec::new(),
        }
    }

    /// Entity fields, submission elements, and the `site`/`current-date`
    /// namespaces.
    pub fn standard(files: Arc<dyn FileAccessor>, site: TokensConfig) -> Self {
        Self::new(EntityTypeMapper::new())
            .with_text_provider(Arc::new(EntityTokenProvider::new()))
            .with_text_provider(Arc::new(GlobalTokenProvider::new(site)))
            .with_image_provider(Arc::new(FieldImageProvider::new(files.clone())))
            .with_image_provider(Arc::new(SubmissionImageProvider::new(files)))
    }

    pub fn with_text_provider(mut self, provider: Arc<dyn TextTokenProvider>) -> Self {
        self.text_providers.push(provider);
        self
    }

    pub fn with_image_provider(mut self, provider: Arc<dyn ImageTokenProvider>) -> Self {
        self.image_providers.push(provider);
        self
    }

    pub fn resolve(&self, text: &str, data: &EntityContext, options: &ResolveOptions) -> FieldMapping {
        if !scanner::has_tokens(text) {
            return FieldMapping::text(html::to_plain_text(text));
        }

        let tokens = scanner::scan(text);
        let mut values: HashMap<String, String> = HashMap::new();

        for group in scanner::group_by_namespace(&tokens) {
            let entities = self.entities_for(&group.namespace, data);

            if options.content.allows_image() {
                if let Some(image) = entities.and_then(|list| self.find_image(&group, list)) {
                    return FieldMapping::Image(image);
                }
            }

            if options.content.allows_text() {
                match entities {
                    Some(list) => {
                        for entity in list {
                            values.extend(self.text_values(&group, Some(entity)));
                        }
                    }
                    None => {
                        debug!(
                            namespace = %group.namespace,
                            "No entities supplied for token namespace, resolving without context"
                        );
                        values.extend(self.text_values(&group, None));
                    }
                }
            }

            for token in &group.tokens {
                values.entry(token.raw.clone()).or_default();
            }
        }

        let mut output = scanner::substitute(text, &values).replace("<br />", "\n");

        if let Some(replacement) = options.replacements.lookup(&output) {
            output = replacement.to_string();
        }

        if !output.is_empty() {
            output = format!("{}{}{}", options.prefix, output, options.suffix);
        }

        FieldMapping::text(html::to_plain_text(&output))
    }

    fn entities_for<'a>(&self, namespace: &str, data: &'a EntityContext) -> Option<&'a [Entity]> {
        data.iter()
            .filter(|(entity_type, _)| self.mapper.token_type_for(entity_type) == namespace)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, list)| list.as_slice())
    }

    fn find_image(&self, group: &TokenGroup, entities: &[Entity]) -> Option<crate::mapping::ImageMapping> {
        entities.iter().rev().find_map(|entity| {
            self.image_providers
                .iter()
                .find_map(|p| p.try_resolve_image(&group.namespace, &group.tokens, entity))
        })
    }

    fn text_values(&self, group: &TokenGroup, entity: Option<&Entity>) -> HashMap<String, String> {
        let mut values = HashMap::new();
        for provider in &self.text_providers {
            values.extend(provider.replacements(&group.namespace, &group.tokens, entity));
        }
        values
    }
}
