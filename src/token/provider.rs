// fillpdf-service/src/token/provider.rs

//! Capabilities the resolver consults for token values. Each entity family
//! brings its own provider; the resolver only iterates the registered ones.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::TokensConfig;
use crate::entity::{Entity, FieldValue, FileAccessor, FileRef};
use crate::error::{FillPdfError, Result};
use crate::mapping::ImageMapping;
use crate::token::html;
use crate::token::scanner::Token;

/// Produces text values for tokens of one namespace.
pub trait TextTokenProvider: Send + Sync {
    /// Values keyed by raw token. Tokens the provider cannot resolve are
    /// simply absent. `entity` is `None` for context-free namespaces.
    fn replacements(
        &self,
        namespace: &str,
        tokens: &[Token],
        entity: Option<&Entity>,
    ) -> HashMap<String, String>;
}

/// Produces image content for tokens of one namespace, if the entity has any.
pub trait ImageTokenProvider: Send + Sync {
    fn try_resolve_image(
        &self,
        namespace: &str,
        tokens: &[Token],
        entity: &Entity,
    ) -> Option<ImageMapping>;
}

// ------------------------------------------------------------
// Text
// ------------------------------------------------------------

/// Resolves token paths against the fields of a fieldable entity.
#[derive(Debug, Default, Clone)]
pub struct EntityTokenProvider;

impl EntityTokenProvider {
    pub fn new() -> Self {
        Self
    }

    fn resolve(entity: &Entity, segments: &[&str]) -> Option<String> {
        match segments {
            ["id"] => Some(html::escape(&entity.id)),
            ["label"] => entity.label.as_deref().map(html::escape),
            ["title"] if entity.field("title").is_none() => entity.label.as_deref().map(html::escape),
            ["bundle"] | ["type"] if entity.field(segments[0]).is_none() => {
                entity.bundle.as_deref().map(html::escape)
            }
            ["values", element, rest @ ..] if entity.is_submission() => {
                field_text(entity.field(element)?, rest)
            }
            [field, rest @ ..] => field_text(entity.field(field)?, rest),
            [] => None,
        }
    }
}

impl TextTokenProvider for EntityTokenProvider {
    fn replacements(
        &self,
        _namespace: &str,
        tokens: &[Token],
        entity: Option<&Entity>,
    ) -> HashMap<String, String> {
        let Some(entity) = entity else {
            return HashMap::new();
        };
        tokens
            .iter()
            .filter_map(|token| {
                Self::resolve(entity, &token.segments()).map(|value| (token.raw.clone(), value))
            })
            .collect()
    }
}

fn field_text(value: &FieldValue, rest: &[&str]) -> Option<String> {
    match (value, rest) {
        (FieldValue::Text(text), [] | ["value"]) => Some(html::escape(text)),
        (FieldValue::Markup(markup), [] | ["value"]) => Some(markup.clone()),
        (FieldValue::Image(file) | FieldValue::File(file), rest) => file_text(file, rest),
        (FieldValue::List(items), []) => {
            let rendered: Vec<String> = items.iter().filter_map(|i| field_text(i, &[])).collect();
            Some(rendered.join(", "))
        }
        (FieldValue::List(items), path @ [index, tail @ ..]) => match index.parse::<usize>() {
            Ok(i) => field_text(items.get(i)?, tail),
            Err(_) => field_text(items.first()?, path),
        },
        _ => None,
    }
}

fn file_text(file: &FileRef, rest: &[&str]) -> Option<String> {
    match rest {
        [] | ["uri"] | ["url"] | ["entity", "uri"] | ["entity", "url"] => Some(html::escape(&file.uri)),
        ["fid"] | ["target_id"] => file.fid.map(|fid| fid.to_string()),
        ["mime"] | ["entity", "mime"] => file.mime.as_deref().map(html::escape),
        _ => None,
    }
}

/// Context-free namespaces: `site` and `current-date`.
#[derive(Debug, Clone)]
pub struct GlobalTokenProvider {
    site: TokensConfig,
    now: Option<DateTime<Utc>>,
}

impl GlobalTokenProvider {
    pub fn new(site: TokensConfig) -> Self {
        Self { site, now: None }
    }

    /// Pins `current-date` tokens to a fixed instant.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn site_value(&self, path: &str) -> Option<String> {
        let value = match path {
            "name" => &self.site.site_name,
            "mail" => &self.site.site_mail,
            "url" => &self.site.site_url,
            "slogan" => &self.site.site_slogan,
            _ => return None,
        };
        Some(html::escape(value))
    }

    fn date_value(&self, path: &str) -> Option<String> {
        let now = self.now.unwrap_or_else(Utc::now);
        let formatted = match path {
            "short" => now.format("%m/%d/%Y - %H:%M").to_string(),
            "medium" => now.format("%a, %m/%d/%Y - %H:%M").to_string(),
            "long" => now.format("%A, %B %-d, %Y - %H:%M").to_string(),
            "html_date" => now.format("%Y-%m-%d").to_string(),
            "html_datetime" => now.to_rfc3339(),
            "timestamp" => now.timestamp().to_string(),
            _ => return None,
        };
        Some(formatted)
    }
}

impl TextTokenProvider for GlobalTokenProvider {
    fn replacements(
        &self,
        namespace: &str,
        tokens: &[Token],
        entity: Option<&Entity>,
    ) -> HashMap<String, String> {
        if entity.is_some() {
            return HashMap::new();
        }
        tokens
            .iter()
            .filter_map(|token| {
                let value = match namespace {
                    "site" => self.site_value(&token.path),
                    "current-date" | "date" => self.date_value(&token.path),
                    _ => None,
                }?;
                Some((token.raw.clone(), value))
            })
            .collect()
    }
}

// ------------------------------------------------------------
// Images
// ------------------------------------------------------------

/// Image fields on any fieldable entity. `[node:field_image]` matches the
/// `field_image` field when it holds an image.
pub struct FieldImageProvider {
    files: Arc<dyn FileAccessor>,
}

impl FieldImageProvider {
    pub fn new(files: Arc<dyn FileAccessor>) -> Self {
        Self { files }
    }
}

impl ImageTokenProvider for FieldImageProvider {
    fn try_resolve_image(
        &self,
        _namespace: &str,
        tokens: &[Token],
        entity: &Entity,
    ) -> Option<ImageMapping> {
        tokens.iter().find_map(|token| {
            let segments = token.segments();
            let value = entity.field(segments[0])?;
            let file = image_file(value, &segments[1..])?;
            load_image(self.files.as_ref(), file, entity)
        })
    }
}

/// Image upload and signature elements on submission-like entities,
/// addressed as `values:<element>`.
pub struct SubmissionImageProvider {
    files: Arc<dyn FileAccessor>,
}

impl SubmissionImageProvider {
    pub fn new(files: Arc<dyn FileAccessor>) -> Self {
        Self { files }
    }
}

impl ImageTokenProvider for SubmissionImageProvider {
    fn try_resolve_image(
        &self,
        _namespace: &str,
        tokens: &[Token],
        entity: &Entity,
    ) -> Option<ImageMapping> {
        if !entity.is_submission() {
            return None;
        }
        tokens.iter().find_map(|token| {
            let segments = token.segments();
            let ["values", element, rest @ ..] = segments.as_slice() else {
                return None;
            };
            match (entity.field(element)?, rest) {
                (FieldValue::Signature(data_uri), []) => match decode_data_uri(data_uri) {
                    Ok((data, extension)) => Some(ImageMapping::new(data, None, extension)),
                    Err(e) => {
                        warn!(
                            entity = %entity.reference(),
                            element = %element,
                            error = %e,
                            "Signature element does not hold a base64 data URI"
                        );
                        None
                    }
                },
                (value, rest) => {
                    let file = image_file(value, rest)?;
                    load_image(self.files.as_ref(), file, entity)
                }
            }
        })
    }
}

/// The file behind a token that names the field itself, optionally with a
/// list index. Longer paths (`:uri`, `:alt`, ...) are text.
fn image_file<'a>(value: &'a FieldValue, rest: &[&str]) -> Option<&'a FileRef> {
    match (value, rest) {
        (FieldValue::Image(file), []) => Some(file),
        (FieldValue::List(items), []) => image_file(items.first()?, &[]),
        (FieldValue::List(items), [index]) => image_file(items.get(index.parse::<usize>().ok()?)?, &[]),
        _ => None,
    }
}

fn load_image(files: &dyn FileAccessor, file: &FileRef, entity: &Entity) -> Option<ImageMapping> {
    match files.read(file) {
        Ok(data) => {
            let extension = file.mime.as_deref().and_then(mime_extension);
            Some(ImageMapping::new(data, Some(file.uri.clone()), extension))
        }
        Err(e) => {
            warn!(
                entity = %entity.reference(),
                uri = %file.uri,
                error = %e,
                "Image file could not be read"
            );
            None
        }
    }
}

fn mime_extension(mime: &str) -> Option<String> {
    let subtype = mime.strip_prefix("image/")?;
    let ext = match subtype {
        "jpeg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    Some(ext.to_string())
}

/// Splits `data:image/png;base64,...` into bytes and an extension.
fn decode_data_uri(uri: &str) -> Result<(Vec<u8>, Option<String>)> {
    let (mime, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .and_then(|(header, payload)| Some((header.strip_suffix(";base64")?, payload)))
        .ok_or_else(|| FillPdfError::InvalidData("not a base64 data URI".to_string()))?;
    let data = general_purpose::STANDARD.decode(payload.trim())?;
    Ok((data, mime_extension(mime)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FillPdfError, Result};
    use crate::token::scanner::scan;

    struct NoFiles;

    impl FileAccessor for NoFiles {
        fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
            Err(FillPdfError::TemplateNotFound(file.uri.clone()))
        }
    }

    struct EchoFiles;

    impl FileAccessor for EchoFiles {
        fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
            Ok(file.uri.as_bytes().to_vec())
        }
    }

    fn site() -> TokensConfig {
        TokensConfig {
            site_name: "Example & Co".into(),
            site_mail: "admin@example.com".into(),
            site_url: "https://example.com".into(),
            site_slogan: String::new(),
        }
    }

    #[test]
    fn entity_paths() {
        let node = Entity::new("node", "4")
            .with_label("Alpha")
            .with_bundle("article")
            .with_field("body", FieldValue::Markup("<p>x</p>".into()))
            .with_field(
                "field_tags",
                FieldValue::List(vec![FieldValue::Text("a".into()), FieldValue::Text("b".into())]),
            );
        let tokens = scan("[node:id] [node:title] [node:type] [node:body:value] [node:field_tags] [node:field_tags:1] [node:missing]");
        let values = EntityTokenProvider::new().replacements("node", &tokens, Some(&node));
        assert_eq!(values["[node:id]"], "4");
        assert_eq!(values["[node:title]"], "Alpha");
        assert_eq!(values["[node:type]"], "article");
        assert_eq!(values["[node:body:value]"], "<p>x</p>");
        assert_eq!(values["[node:field_tags]"], "a, b");
        assert_eq!(values["[node:field_tags:1]"], "b");
        assert!(!values.contains_key("[node:missing]"));
    }

    #[test]
    fn plain_text_is_escaped() {
        let node = Entity::new("node", "1").with_field("title", FieldValue::Text("A & B".into()));
        let values = EntityTokenProvider::new().replacements("node", &scan("[node:title]"), Some(&node));
        assert_eq!(values["[node:title]"], "A &amp; B");
    }

    #[test]
    fn global_tokens_only_without_entity() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T10:20:00Z").unwrap().with_timezone(&Utc);
        let provider = GlobalTokenProvider::new(site()).with_now(now);
        let tokens = scan("[site:name] [current-date:html_date] [site:nope]");
        let values = provider.replacements("site", &tokens[..1], None);
        assert_eq!(values["[site:name]"], "Example &amp; Co");
        let values = provider.replacements("current-date", &tokens[1..2], None);
        assert_eq!(values["[current-date:html_date]"], "2024-03-05");
        assert!(provider.replacements("site", &tokens[2..], None).is_empty());
        assert!(provider
            .replacements("site", &tokens[..1], Some(&Entity::new("node", "1")))
            .is_empty());
    }

    #[test]
    fn field_image_reads_file() {
        let node = Entity::new("node", "1")
            .with_field("field_image", FieldValue::Image(FileRef::new("public://cat.png")));
        let provider = FieldImageProvider::new(Arc::new(EchoFiles));
        let image = provider
            .try_resolve_image("node", &scan("[node:field_image]"), &node)
            .unwrap();
        assert_eq!(image.data(), b"public://cat.png");
        assert_eq!(image.uri(), Some("public://cat.png"));
        assert_eq!(image.extension(), Some("png"));
    }

    #[test]
    fn image_sub_paths_are_left_to_text() {
        let node = Entity::new("node", "1").with_field(
            "field_image",
            FieldValue::List(vec![FieldValue::Image(FileRef::new("public://cat.png"))]),
        );
        let provider = FieldImageProvider::new(Arc::new(EchoFiles));
        for token in ["[node:field_image:uri]", "[node:field_image:0:alt]", "[node:field_image:entity:url]"] {
            assert!(
                provider.try_resolve_image("node", &scan(token), &node).is_none(),
                "{token} resolved to an image"
            );
        }
        assert!(provider
            .try_resolve_image("node", &scan("[node:field_image:0]"), &node)
            .is_some());
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(FillPdfError::Base64Error(_))
        ));
        assert!(matches!(
            decode_data_uri("image/png,AAAA"),
            Err(FillPdfError::InvalidData(_))
        ));
    }

    #[test]
    fn unreadable_image_is_skipped() {
        let node = Entity::new("node", "1")
            .with_field("field_image", FieldValue::Image(FileRef::new("public://gone.png")));
        let provider = FieldImageProvider::new(Arc::new(NoFiles));
        assert!(provider
            .try_resolve_image("node", &scan("[node:field_image]"), &node)
            .is_none());
    }

    #[test]
    fn submission_signature_is_decoded() {
        let encoded = general_purpose::STANDARD.encode(b"PNGDATA");
        let submission = Entity::new("webform_submission", "12").with_field(
            "signature",
            FieldValue::Signature(format!("data:image/png;base64,{encoded}")),
        );
        let provider = SubmissionImageProvider::new(Arc::new(NoFiles));
        let image = provider
            .try_resolve_image(
                "webform_submission",
                &scan("[webform_submission:values:signature]"),
                &submission,
            )
            .unwrap();
        assert_eq!(image.data(), b"PNGDATA");
        assert_eq!(image.uri(), None);
        assert_eq!(image.extension(), Some("png"));
    }

    #[test]
    fn submission_provider_ignores_other_entities() {
        let node = Entity::new("node", "1")
            .with_field("signature", FieldValue::Signature("data:image/png;base64,AA==".into()));
        let provider = SubmissionImageProvider::new(Arc::new(NoFiles));
        assert!(provider
            .try_resolve_image("node", &scan("[node:values:signature]"), &node)
            .is_none());
    }
}
