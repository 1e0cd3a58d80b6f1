// fillpdf-service/src/token/mod.rs

mod entity_type;
mod html;
mod provider;
mod resolver;
mod scanner;

pub use entity_type::EntityTypeMapper;
pub use html::{escape, to_plain_text};
pub use provider::{
    EntityTokenProvider, FieldImageProvider, GlobalTokenProvider, ImageTokenProvider,
    SubmissionImageProvider, TextTokenProvider,
};
pub use resolver::{ContentKind, ResolveOptions, TokenResolver};
pub use scanner::{group_by_namespace, has_tokens, scan, substitute, Token, TokenGroup};
