//! Value Classifier: pure, deterministic mapping from a literal to an
//! [`Arg`] suitable for `LOAD_CONST`.

use crate::types::{Arg, Category};
use regex::Regex;
use std::sync::LazyLock;

/// Strings shorter than this are emitted verbatim instead of bucketed.
pub const DEFAULT_SHORT_LITERAL_THRESHOLD: usize = 15;

const LARGE_INT_THRESHOLD: i64 = 1_000_000_000;

static RE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+){1,3}([-+][0-9A-Za-z.]+)?$").unwrap());
static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap());
static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static RE_IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])(\.(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])){3}$").unwrap()
});
static RE_HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{8,}$").unwrap());
static RE_BASE64: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/_-]{24,}={0,2}$").unwrap());

const INSECURE_SCHEMES: &[&str] = &["http", "ftp", "telnet", "ldap", "gopher"];
const BASH_SIGNALS: &[&str] = &[
    "rm -rf", "sudo ", "curl ", "wget ", "chmod ", "| sh", "&& ", ">/dev/null", "base64 -d",
];
const CODE_SIGNALS: &[&str] = &[
    "def ", "function", "=>", "import ", "require(", ";\n", "){", "var ", "let ", "const ", "#!/",
];
const SQL_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "union", "alter", "create table",
];
const SQL_CLAUSES: &[&str] = &["from", "where", "values"];
const ABS_PATH_PREFIXES: &[&str] = &["/etc", "/usr", "/var", "/bin", "/tmp", "~/"];

/// Classifies a string literal into the argument that `LOAD_CONST` should
/// carry. `threshold` is the short-literal verbatim cutoff.
pub fn classify_string(s: &str, threshold: usize) -> Arg {
    if let Some(category) = classify_structure(s) {
        return Arg::Category(category);
    }
    if s.chars().count() < threshold {
        return Arg::Str(s.to_lowercase());
    }
    Arg::Category(size_bucket(s))
}

/// Structure categories, first match wins, checked before size bucketing.
/// Match order is normative.
fn classify_structure(s: &str) -> Option<Category> {
    if RE_VERSION.is_match(s) {
        return Some(Category::StringVersion);
    }
    if let Some(scheme_end) = s.find("://") {
        if RE_URL.is_match(s) {
            let scheme = s[..scheme_end].to_ascii_lowercase();
            return Some(if INSECURE_SCHEMES.contains(&scheme.as_str()) {
                Category::StringUrlInsecure
            } else {
                Category::StringUrl
            });
        }
    }
    if is_bare_insecure_protocol(s) {
        return Some(Category::StringInsecureProtocol);
    }
    if RE_EMAIL.is_match(s) {
        return Some(Category::StringEmail);
    }
    if RE_IPV4.is_match(s) {
        return Some(Category::StringIp);
    }
    if looks_like_path(s) {
        return Some(Category::StringPath);
    }
    if looks_like_base64(s) {
        return Some(Category::StringBase64);
    }
    if RE_HEX.is_match(s) && s.len() % 2 == 0 {
        return Some(Category::StringHex);
    }
    if looks_like_bash(s) {
        return Some(Category::StringBash);
    }
    if looks_like_sql(s) {
        return Some(Category::StringSql);
    }
    if looks_like_code(s) {
        return Some(Category::StringCode);
    }
    None
}

fn is_bare_insecure_protocol(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    INSECURE_SCHEMES.contains(&lower.as_str()) || {
        if let Some(scheme) = lower.strip_suffix(':') {
            INSECURE_SCHEMES.contains(&scheme) && !lower.contains("//")
        } else {
            false
        }
    }
}

fn looks_like_path(s: &str) -> bool {
    if RE_URL.is_match(s) {
        return false;
    }
    if ABS_PATH_PREFIXES.iter().any(|p| s.starts_with(p)) {
        return true;
    }
    if s.len() >= 2 && s.as_bytes()[1] == b':' && (s.starts_with(|c: char| c.is_ascii_alphabetic())) {
        return true; // drive letter, e.g. C:\
    }
    let seps = s.chars().filter(|&c| c == '/' || c == '\\').count();
    seps >= 2 && !s.contains(' ')
}

fn looks_like_base64(s: &str) -> bool {
    if !RE_BASE64.is_match(s) {
        return false;
    }
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = s.chars().any(|c| c.is_ascii_digit());
    s.len() >= 64 || (has_upper && has_lower && has_digit)
}

fn looks_like_bash(s: &str) -> bool {
    s.starts_with("#!/") || BASH_SIGNALS.iter().any(|sig| s.contains(sig))
}

fn looks_like_sql(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    SQL_KEYWORDS.iter().any(|k| lower.contains(k)) && SQL_CLAUSES.iter().any(|c| lower.contains(c))
}

fn looks_like_code(s: &str) -> bool {
    CODE_SIGNALS.iter().filter(|sig| s.contains(*sig)).count() >= 2
}

fn size_bucket(s: &str) -> Category {
    match s.chars().count() {
        0..=4 => Category::StringXs,
        5..=15 => Category::StringS,
        16..=127 => Category::StringM,
        128..=4095 => Category::StringL,
        _ => Category::StringXl,
    }
}

/// Public size-bucket token, used by the token projector for long bare
/// identifiers that don't match a function-name category.
pub fn size_bucket_token(s: &str) -> &'static str {
    size_bucket(s).token()
}

pub fn classify_integer(v: i64) -> Arg {
    if v.abs() >= LARGE_INT_THRESHOLD {
        Arg::Category(Category::IntegerLarge)
    } else {
        Arg::Int(v)
    }
}

pub fn classify_float(_v: f64) -> Arg {
    Arg::Category(Category::Float)
}

pub fn classify_bool(v: bool) -> Arg {
    Arg::Bool(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_are_verbatim_and_lowercased() {
        assert_eq!(classify_string("Ls", 15), Arg::Str("ls".to_string()));
    }

    #[test]
    fn long_strings_never_appear_verbatim() {
        let long = "x".repeat(200);
        match classify_string(&long, 15) {
            Arg::Category(_) => {}
            other => panic!("expected a category, got {other:?}"),
        }
    }

    #[test]
    fn base64_blob_is_categorized_not_emitted() {
        let blob = "QWxhZGRpbjpvcGVuIHNlc2FtZQ==QWxhZGRpbjpvcGVuIHNlc2FtZQ==";
        assert_eq!(classify_string(blob, 15), Arg::Category(Category::StringBase64));
    }

    #[test]
    fn insecure_url_is_flagged() {
        assert_eq!(
            classify_string("http://example.com/payload", 15),
            Arg::Category(Category::StringUrlInsecure)
        );
        assert_eq!(
            classify_string("https://example.com/payload", 15),
            Arg::Category(Category::StringUrl)
        );
    }

    #[test]
    fn version_wins_over_size_bucket() {
        assert_eq!(
            classify_string("1.2.3-beta", 15),
            Arg::Category(Category::StringVersion)
        );
    }

    #[test]
    fn large_integers_are_bucketed() {
        assert_eq!(classify_integer(5), Arg::Int(5));
        assert!(matches!(
            classify_integer(5_000_000_000),
            Arg::Category(Category::IntegerLarge)
        ));
    }

    #[test]
    fn shell_command_is_flagged_bash() {
        assert_eq!(
            classify_string("rm -rf / --no-preserve-root", 15),
            Arg::Category(Category::StringBash)
        );
    }

    #[test]
    fn sql_statement_is_flagged() {
        assert_eq!(
            classify_string("SELECT * FROM users WHERE 1=1", 15),
            Arg::Category(Category::StringSql)
        );
    }
}
