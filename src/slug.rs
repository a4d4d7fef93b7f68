// ============================================================================
// hmr-runner - Slug parsing
//
// `<slug>` is `module:attr` or `path:attr`; attr names the application
// object within the module.
// ============================================================================

use std::path::{Path, PathBuf};

use crate::error::HmrError;

/// A parsed `module:attr` or `path:attr` slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slug {
    /// The module's dotted name, if given that way (e.g. `app.main`).
    pub module: Option<String>,
    /// The module's file path, if given that way (e.g. `./app/main.py`).
    pub path: Option<PathBuf>,
    /// The attribute naming the application object (e.g. `app`).
    pub attr: String,
}

impl Slug {
    pub fn parse(raw: &str) -> Result<Self, HmrError> {
        let (left, attr) = raw
            .rsplit_once(':')
            .ok_or_else(|| HmrError::Config(format!("invalid slug '{raw}': expected 'module:attr' or 'path:attr'")))?;

        if left.is_empty() || attr.is_empty() {
            return Err(HmrError::Config(format!("invalid slug '{raw}': empty module or attr")));
        }
        if !is_valid_attr(attr) {
            return Err(HmrError::Config(format!("invalid slug '{raw}': '{attr}' is not a valid attribute name")));
        }

        if looks_like_path(left) {
            Ok(Slug { module: None, path: Some(PathBuf::from(left)), attr: attr.to_string() })
        } else {
            Ok(Slug { module: Some(left.to_string()), path: None, attr: attr.to_string() })
        }
    }

    pub fn display_entry(&self) -> String {
        match (&self.module, &self.path) {
            (Some(m), _) => m.clone(),
            (_, Some(p)) => p.display().to_string(),
            _ => unreachable!("slug always has a module or a path"),
        }
    }
}

fn is_valid_attr(attr: &str) -> bool {
    let mut chars = attr.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn looks_like_path(s: &str) -> bool {
    s.contains('/') || s.contains('\\') || s == "." || s == ".." || Path::new(s).extension().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_slug() {
        let slug = Slug::parse("app.main:app").unwrap();
        assert_eq!(slug.module.as_deref(), Some("app.main"));
        assert!(slug.path.is_none());
        assert_eq!(slug.attr, "app");
    }

    #[test]
    fn parses_path_slug() {
        let slug = Slug::parse("./app/main.py:app").unwrap();
        assert_eq!(slug.path.as_deref(), Some(Path::new("./app/main.py")));
        assert!(slug.module.is_none());
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(Slug::parse("app.main").is_err());
    }

    #[test]
    fn rejects_invalid_attr_name() {
        assert!(Slug::parse("app.main:1bad").is_err());
        assert!(Slug::parse("app.main:has-dash").is_err());
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(Slug::parse(":attr").is_err());
        assert!(Slug::parse("module:").is_err());
    }

    #[test]
    fn splits_on_last_colon_for_windows_paths() {
        // rsplit_once ensures a drive-letter colon on the left doesn't confuse parsing
        // as long as the attr itself has no colon.
        let slug = Slug::parse("C:/app/main.py:app").unwrap();
        assert_eq!(slug.attr, "app");
        assert_eq!(slug.path.as_deref(), Some(Path::new("C:/app/main.py")));
    }
}
