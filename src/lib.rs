#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(
    // Acceptable for trait naming consistency (e.g., DocumentDao, PgDocumentDao)
    clippy::module_name_repetitions,

    // Counter and score arithmetic converts u32/u64 to f64 deliberately
    clippy::cast_precision_loss,

    // Row counts and offsets convert usize <-> i64 for database bindings
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,

    // Error context via anyhow::Context already provides sufficient documentation
    clippy::missing_errors_doc,

    // Panic paths are defensive (e.g., mutex poisoning), not part of normal flow
    clippy::missing_panics_doc,

    // Technical identifiers (SHA-256, JSONB, PACER) don't need markdown formatting
    clippy::doc_markdown,

    // Named format args reduce readability for long messages with many placeholders
    clippy::uninlined_format_args,

    // if-let-else patterns are clearer than map_or for error handling flows
    clippy::option_if_let_else,

    // Pass-by-value is required by async trait methods taking owned records
    clippy::needless_pass_by_value,

    // Too noisy: many accessors return useful values but aren't always used
    clippy::must_use_candidate
)]

pub mod config;
pub mod index;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod store;
pub mod util;
