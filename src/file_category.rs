/// Extension-based file categorization.
///
/// This module maps file extensions to category tokens (e.g. "documents",
/// "images") and owns the normalization rules every category token obeys:
/// lowercase ASCII letters, digits, `_` and `-`, never empty.
///
/// # Examples
///
/// ```
/// use classifile::file_category::CategoryResolver;
///
/// let resolver = CategoryResolver::default();
/// assert_eq!(resolver.resolve("report.pdf").unwrap().as_str(), "documents");
/// assert_eq!(resolver.resolve("movie.MKV").unwrap().as_str(), "videos");
/// assert!(resolver.resolve("notes.unknownext").is_none());
/// ```
use std::collections::HashMap;
use std::fmt;

/// Category used whenever nothing better is known.
pub const DEFAULT_CATEGORY: &str = "others";

/// The closed label set offered to the oracle.
pub const ORACLE_LABELS: [&str; 8] = [
    "images",
    "documents",
    "data",
    "videos",
    "audio",
    "archives",
    "code",
    DEFAULT_CATEGORY,
];

/// A normalized category token.
///
/// The only way to build one is through [`Category::normalize`] (or the
/// resolver table), so the inner string always matches `[a-z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(String);

impl Category {
    /// Normalizes free text into a category token.
    ///
    /// Trims, lowercases and drops every character outside `[a-z0-9_-]`.
    /// An empty result becomes [`DEFAULT_CATEGORY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use classifile::file_category::Category;
    ///
    /// assert_eq!(Category::normalize("  Images.\n").as_str(), "images");
    /// assert_eq!(Category::normalize("**").as_str(), "others");
    /// ```
    pub fn normalize(raw: &str) -> Self {
        Category(normalize_category(raw))
    }

    /// The default `others` category.
    pub fn others() -> Self {
        Category(DEFAULT_CATEGORY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory name for this category.
    pub fn dir_name(&self) -> &str {
        &self.0
    }

    /// Whether this token is one of the labels the oracle is asked to choose from.
    pub fn is_oracle_label(&self) -> bool {
        ORACLE_LABELS.contains(&self.0.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// String form of [`Category::normalize`].
///
/// Idempotent: `normalize_category(&normalize_category(x)) == normalize_category(x)`.
pub fn normalize_category(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        cleaned
    }
}

/// Extracts the lowercased extension of a file name.
///
/// The extension is whatever follows the final `.`. Names without a dot,
/// names ending in a dot and dot-files such as `.bashrc` have none.
///
/// # Examples
///
/// ```
/// use classifile::file_category::extension_of;
///
/// assert_eq!(extension_of("archive.tar.GZ").as_deref(), Some("gz"));
/// assert_eq!(extension_of("Makefile"), None);
/// assert_eq!(extension_of(".bashrc"), None);
/// ```
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Maps file extensions to categories.
///
/// Lookups are pure and case-insensitive. A miss (`None`) tells the caller
/// to consult the oracle.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    extension_map: HashMap<String, Category>,
}

impl CategoryResolver {
    /// Creates a new `CategoryResolver` with the standard extension table.
    pub fn new() -> Self {
        let mut resolver = Self {
            extension_map: HashMap::new(),
        };
        resolver.populate_standard_mappings();
        resolver
    }

    fn populate_standard_mappings(&mut self) {
        const TABLE: &[(&str, &[&str])] = &[
            ("documents", &["pdf", "doc", "docx", "txt", "md", "rtf", "epub"]),
            ("images", &["png", "jpg", "jpeg", "gif", "svg", "webp"]),
            ("videos", &["mp4", "mkv", "mov", "avi", "wmv", "webm"]),
            ("audio", &["mp3", "wav", "aac", "ogg", "flac"]),
            ("archives", &["zip", "rar", "tar", "gz", "7z"]),
            (
                "code",
                &[
                    "py", "js", "ts", "html", "css", "java", "c", "cpp", "cs", "rb", "php",
                    "swift", "go", "rs", "kt", "sh", "bat",
                ],
            ),
            ("data", &["csv", "json", "xml", "yaml", "yml"]),
            ("spreadsheets", &["xlsx", "xls", "ods"]),
            ("applications", &["exe"]),
            ("system", &["dll"]),
            ("binaries", &["bin"]),
            ("disk_images", &["iso"]),
        ];

        for (category, extensions) in TABLE {
            for ext in *extensions {
                self.add_extension_mapping(ext, category);
            }
        }
    }

    /// Adds a file extension to category mapping. The category is normalized.
    pub fn add_extension_mapping(&mut self, ext: &str, category: &str) {
        self.extension_map
            .insert(ext.to_ascii_lowercase(), Category::normalize(category));
    }

    /// Maps a bare extension (without the dot) to a category.
    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        self.extension_map.get(&ext.to_ascii_lowercase()).cloned()
    }

    /// Resolves a file name to its category.
    ///
    /// Returns `None` when the name has no extension or the extension is not
    /// in the table.
    pub fn resolve(&self, file_name: &str) -> Option<Category> {
        extension_of(file_name).and_then(|ext| self.extension_to_category(&ext))
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_extensions() {
        let resolver = CategoryResolver::default();
        let cases = [
            ("report.pdf", "documents"),
            ("book.epub", "documents"),
            ("photo.jpeg", "images"),
            ("movie.mkv", "videos"),
            ("song.flac", "audio"),
            ("backup.7z", "archives"),
            ("main.rs", "code"),
            ("run.bat", "code"),
            ("table.csv", "data"),
            ("config.yml", "data"),
            ("budget.xlsx", "spreadsheets"),
            ("setup.exe", "applications"),
            ("driver.dll", "system"),
            ("firmware.bin", "binaries"),
            ("ubuntu.iso", "disk_images"),
        ];
        for (name, expected) in cases {
            assert_eq!(
                resolver.resolve(name).map(|c| c.as_str().to_string()),
                Some(expected.to_string()),
                "{name}"
            );
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve("movie.MKV").unwrap().as_str(), "videos");
        assert_eq!(resolver.resolve("Report.Pdf").unwrap().as_str(), "documents");
    }

    #[test]
    fn test_resolve_uses_last_extension() {
        let resolver = CategoryResolver::default();
        assert_eq!(resolver.resolve("site.tar.gz").unwrap().as_str(), "archives");
        assert_eq!(resolver.resolve("notes.pdf.txt").unwrap().as_str(), "documents");
    }

    #[test]
    fn test_resolve_misses() {
        let resolver = CategoryResolver::default();
        assert!(resolver.resolve("model.blend").is_none());
        assert!(resolver.resolve("README").is_none());
        assert!(resolver.resolve("pdf").is_none());
        assert!(resolver.resolve("trailing.").is_none());
        assert!(resolver.resolve(".gitignore").is_none());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.b.C").as_deref(), Some("c"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(""), None);
        assert_eq!(extension_of(".hidden.toml").as_deref(), Some("toml"));
    }

    #[test]
    fn test_custom_mapping() {
        let mut resolver = CategoryResolver::default();
        resolver.add_extension_mapping("BLEND", "3D Models");
        assert_eq!(resolver.resolve("scene.blend").unwrap().as_str(), "3dmodels");
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Documents"), "documents");
        assert_eq!(normalize_category("  code\n"), "code");
        assert_eq!(normalize_category("\"images\"."), "images");
        assert_eq!(normalize_category("disk_images"), "disk_images");
        assert_eq!(normalize_category("e-books"), "e-books");
        assert_eq!(normalize_category("Category: Audio!"), "categoryaudio");
        assert_eq!(normalize_category(""), "others");
        assert_eq!(normalize_category("   "), "others");
        assert_eq!(normalize_category("???"), "others");
        assert_eq!(normalize_category("Ünïcode"), "ncode");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "", " Images ", "VIDEOS\n", "../../etc", "data/ sets", "Ωmega", "others", "a_b-c9",
        ];
        for raw in samples {
            let once = normalize_category(raw);
            assert_eq!(normalize_category(&once), once, "{raw:?}");
        }
    }

    #[test]
    fn test_normalized_alphabet() {
        let token = Category::normalize("../Some Weird/Label!!");
        assert!(!token.as_str().is_empty());
        assert!(
            token
                .as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        );
    }

    #[test]
    fn test_oracle_labels() {
        assert!(Category::normalize("Images").is_oracle_label());
        assert!(Category::others().is_oracle_label());
        assert!(!Category::normalize("spreadsheets").is_oracle_label());
    }
}
