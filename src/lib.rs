//! # fillpdf-service
//!
//! Fills PDF form templates with content-entity data.
//!
//! A [`models::Form`] pairs a fillable PDF template with one
//! [`models::FormField`] per PDF field. Each field holds a token template
//! such as `Dear [user:name]` that the [`token::TokenResolver`] turns into a
//! [`mapping::FieldMapping`] against the entities supplied with a fill
//! request. The mappings are handed to an external [`backend::PdfBackend`]
//! (pdftk, a local PDF service, or a hosted API) which produces the PDF.
//!
//! Form configuration travels as JSON through [`serializer`]; re-uploading a
//! template carries existing mappings over by PDF key ([`template`],
//! [`reconcile`]).

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod pubsub;
pub mod reconcile;
pub mod serializer;
pub mod storage;
pub mod template;
pub mod token;

pub use error::{FillPdfError, Result};
pub use mapping::{FieldMapping, ImageMapping, TextMapping};
pub use token::{ContentKind, ResolveOptions, TokenResolver};
