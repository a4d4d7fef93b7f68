// ============================================================================
// hmr-runner - Glob & path semantics
//
// Asset include/exclude patterns: a pattern containing any of `* ? [` is a
// glob matched against the file's absolute-or-cwd-relative posix path
// (absolute iff the pattern itself starts absolute); otherwise it is a
// literal path. A literal ending in a path separator, or with no file
// suffix, denotes a directory root whose descendants all match.
//
// This is deliberately the single-segment `fnmatch` dialect the original
// tool uses (`*` and `?` do not treat `/` specially, `[...]` is a character
// class) rather than a full recursive-glob engine — `**/*.css` matches via
// plain `fnmatch` semantics against the full posix path, exactly as the
// Python implementation does it.
// ============================================================================

use std::path::{Path, PathBuf};

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// True if `pattern` contains any glob metacharacter.
pub fn is_glob(pattern: &str) -> bool {
    pattern.chars().any(|c| GLOB_CHARS.contains(&c))
}

#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    absolute: bool,
}

impl Glob {
    pub fn compile(raw: &str) -> Self {
        let expanded = shellexpand_home(raw);
        let absolute = Path::new(&expanded).is_absolute();
        let pattern = expanded.replace('\\', "/");
        Self { pattern, absolute }
    }

    /// Match against either the absolute or cwd-relative posix form of
    /// `path`, whichever this glob's own anchoring requires.
    pub fn matches(&self, path: &Path, cwd: &Path) -> bool {
        let candidate = if self.absolute {
            Some(path.to_string_lossy().replace('\\', "/"))
        } else {
            path.strip_prefix(cwd)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        };
        match candidate {
            Some(c) => fnmatch(&c, &self.pattern),
            None => false,
        }
    }
}

fn shellexpand_home(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest).to_string_lossy().into_owned();
        }
    }
    s.to_string()
}

/// A literal (non-glob) include/exclude entry: either a directory root
/// (descendants match) or an exact file.
#[derive(Debug, Clone)]
pub enum Literal {
    DirRoot(PathBuf),
    File(PathBuf),
}

impl Literal {
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Literal::DirRoot(root) => path.starts_with(root),
            Literal::File(file) => path == file,
        }
    }
}

/// Minimal `fnmatch`-style glob matcher: `*` matches any run of characters
/// (including `/`), `?` matches exactly one character, `[...]` is a
/// character class (no negation support, matching the original's use of
/// plain `fnmatch`).
pub fn fnmatch(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    fnmatch_rec(&t, &p)
}

fn fnmatch_rec(t: &[char], p: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => fnmatch_rec(t, &p[1..]) || (!t.is_empty() && fnmatch_rec(&t[1..], p)),
        Some('?') => !t.is_empty() && fnmatch_rec(&t[1..], &p[1..]),
        Some('[') => match parse_class(p) {
            Some((class, rest)) => {
                !t.is_empty() && class.contains(&t[0]) && fnmatch_rec(&t[1..], rest)
            }
            None => !t.is_empty() && t[0] == '[' && fnmatch_rec(&t[1..], &p[1..]),
        },
        Some(c) => !t.is_empty() && t[0] == *c && fnmatch_rec(&t[1..], &p[1..]),
    }
}

fn parse_class(p: &[char]) -> Option<(Vec<char>, &[char])> {
    let end = p.iter().skip(1).position(|&c| c == ']')?;
    let class: Vec<char> = p[1..=end].to_vec();
    Some((class, &p[end + 2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_glob_chars() {
        assert!(is_glob("static/**/*.css"));
        assert!(is_glob("file?.txt"));
        assert!(is_glob("file[abc].txt"));
        assert!(!is_glob("static/site.css"));
    }

    #[test]
    fn fnmatch_star_matches_any_run() {
        assert!(fnmatch("static/sub/site.css", "static/*/site.css"));
        assert!(fnmatch("static/a/b/site.css", "static/*site.css"));
        assert!(!fnmatch("static/site.js", "static/*.css"));
    }

    #[test]
    fn fnmatch_question_matches_one_char() {
        assert!(fnmatch("a.css", "?.css"));
        assert!(!fnmatch("ab.css", "?.css"));
    }

    #[test]
    fn fnmatch_character_class() {
        assert!(fnmatch("a.css", "[ab].css"));
        assert!(fnmatch("b.css", "[ab].css"));
        assert!(!fnmatch("c.css", "[ab].css"));
    }

    #[test]
    fn glob_absolute_matches_absolute_form_only() {
        let cwd = Path::new("/home/user/project");
        let g = Glob::compile("/home/user/project/static/*.css");
        assert!(g.matches(Path::new("/home/user/project/static/a.css"), cwd));

        let rel = Glob::compile("static/*.css");
        assert!(rel.matches(Path::new("/home/user/project/static/a.css"), cwd));
        assert!(!rel.matches(Path::new("/other/static/a.css"), cwd));
    }

    #[test]
    fn literal_dir_root_matches_descendants() {
        let lit = Literal::DirRoot(PathBuf::from("/proj/static"));
        assert!(lit.matches(Path::new("/proj/static/css/site.css")));
        assert!(!lit.matches(Path::new("/proj/templates/index.html")));
    }

    #[test]
    fn literal_file_matches_exact_path_only() {
        let lit = Literal::File(PathBuf::from("/proj/config.json"));
        assert!(lit.matches(Path::new("/proj/config.json")));
        assert!(!lit.matches(Path::new("/proj/config.json.bak")));
    }
}
