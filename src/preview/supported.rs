//! Which keys get a preview
//!
//! Previewability is decided by extension; compressed keys (`.gz`, `.zst`,
//! `.zstd`) are judged by the extension underneath, so `app.log.gz` counts
//! as a log file.

/// Text-ish extensions worth fetching a preview for.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Plain text and documentation
    ".txt", ".md", ".markdown", ".rst", ".tex", ".log", ".readme",
    // Web markup and styles
    ".html", ".htm", ".xhtml", ".xml", ".svg", ".css", ".scss", ".sass", ".less",
    // Data formats
    ".json", ".jsonl", ".ndjson", ".yaml", ".yml", ".toml", ".csv", ".tsv",
    ".ini", ".cfg", ".conf", ".properties", ".env",
    // C family
    ".c", ".h", ".cpp", ".hpp", ".cc", ".hh", ".cxx", ".hxx", ".m", ".mm",
    // JVM
    ".java", ".kt", ".kts", ".scala", ".groovy", ".gradle",
    // Scripting
    ".py", ".pyw", ".pyi", ".js", ".mjs", ".cjs", ".jsx", ".ts", ".tsx",
    ".rb", ".rake", ".gemspec", ".php", ".pl", ".pm", ".lua", ".r",
    // Systems
    ".go", ".rs", ".swift", ".zig", ".nim", ".d",
    // Functional
    ".hs", ".ml", ".mli", ".fs", ".fsx", ".ex", ".exs", ".erl", ".hrl",
    ".clj", ".cljs", ".edn", ".lisp", ".el", ".scm",
    // Shells
    ".sh", ".bash", ".zsh", ".fish", ".ksh", ".ps1", ".bat", ".cmd",
    // Queries
    ".sql", ".graphql", ".gql",
    // Infrastructure
    ".dockerfile", ".tf", ".tfvars", ".hcl", ".cmake", ".mk", ".bazel", ".bzl",
    // VCS / editor config
    ".gitignore", ".gitattributes", ".editorconfig",
    // Schemas
    ".proto", ".thrift", ".avsc", ".xsd", ".dtd",
    // Diffs
    ".diff", ".patch",
    // Assembly
    ".asm", ".s",
];

const COMPRESSED_EXTENSIONS: &[&str] = &[".gz", ".zst", ".zstd"];

fn extension_of(key: &str) -> Option<String> {
    let dot = key.rfind('.')?;
    Some(key[dot..].to_ascii_lowercase())
}

/// Does the key name a compressed object this crate can decode?
pub fn is_compressed(key: &str) -> bool {
    extension_of(key)
        .map(|ext| COMPRESSED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Is the key previewable? Compound compressed extensions are resolved by
/// the inner suffix.
pub fn is_preview_supported(key: &str) -> bool {
    let Some(ext) = extension_of(key) else {
        return false;
    };

    if COMPRESSED_EXTENSIONS.contains(&ext.as_str()) {
        let dot = key.rfind('.').unwrap();
        let inner = &key[..dot];
        let Some(inner_ext) = extension_of(inner) else {
            return false;
        };
        return SUPPORTED_EXTENSIONS.contains(&inner_ext.as_str());
    }

    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}
