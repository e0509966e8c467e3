// Per-language boundary detection for the code chunker. Each config carries
// the extensions it claims and a line-anchored regex matching lines which
// start a new logical block (function, class, impl, ...). These are
// intentionally shallow patterns: the chunker only needs split points, not a
// parse tree.

use once_cell::sync::Lazy;
use regex::Regex;

pub struct LanguageConfig {
    /// Extensions routed to this config, including the leading dot.
    pub file_extensions: &'static [&'static str],

    /// Matches at the start of a line which begins a new logical block.
    pub boundary: Regex,
}

static LANGUAGES: Lazy<Vec<LanguageConfig>> = Lazy::new(|| {
    vec![
        LanguageConfig {
            file_extensions: &[".py"],
            boundary: Regex::new(r"^(?:class |def |async def )").unwrap(),
        },
        LanguageConfig {
            file_extensions: &[".js"],
            boundary: Regex::new(
                r"^(?:function |class |const \w+ = (?:async )?\(|export (?:default )?(?:function|class))",
            )
            .unwrap(),
        },
        LanguageConfig {
            file_extensions: &[".ts", ".tsx"],
            boundary: Regex::new(
                r"^(?:function |class |const \w+ = (?:async )?\(|export (?:default )?(?:function|class)|interface |type )",
            )
            .unwrap(),
        },
        LanguageConfig {
            file_extensions: &[".go"],
            boundary: Regex::new(r"^(?:func |type \w+ struct)").unwrap(),
        },
        LanguageConfig {
            file_extensions: &[".rs"],
            boundary: Regex::new(r"^(?:fn |pub fn |impl |struct |enum |trait )").unwrap(),
        },
        LanguageConfig {
            file_extensions: &[".java"],
            boundary: Regex::new(
                r"^(?:\s*(?:public|private|protected)?\s*(?:static\s+)?(?:class |interface ))",
            )
            .unwrap(),
        },
    ]
});

/// The boundary regex for a (lowercased, dot-prefixed) extension, if we know
/// the language.
pub fn boundary_regex(ext: &str) -> Option<&'static Regex> {
    LANGUAGES
        .iter()
        .find(|config| config.file_extensions.contains(&ext))
        .map(|config| &config.boundary)
}

#[cfg(test)]
mod tests {
    use super::boundary_regex;

    #[test]
    fn known_extensions_have_boundaries() {
        for ext in [".py", ".js", ".ts", ".tsx", ".go", ".rs", ".java"] {
            assert!(boundary_regex(ext).is_some(), "{ext} should be known");
        }
        assert!(boundary_regex(".xyz").is_none());
        assert!(boundary_regex(".md").is_none());
    }

    #[test]
    fn python_boundaries() {
        let re = boundary_regex(".py").unwrap();
        assert!(re.is_match("def foo():"));
        assert!(re.is_match("async def bar():"));
        assert!(re.is_match("class Baz:"));
        assert!(!re.is_match("    def method(self):"));
        assert!(!re.is_match("x = 1"));
    }

    #[test]
    fn typescript_boundaries() {
        let re = boundary_regex(".ts").unwrap();
        assert!(re.is_match("function run() {"));
        assert!(re.is_match("const handler = async (req) => {"));
        assert!(re.is_match("export default class Widget {"));
        assert!(re.is_match("interface Options {"));
        assert!(re.is_match("type Result = string;"));
        assert!(!re.is_match("  return value;"));
    }

    #[test]
    fn go_and_rust_and_java_boundaries() {
        let go = boundary_regex(".go").unwrap();
        assert!(go.is_match("func main() {"));
        assert!(go.is_match("type Server struct {"));
        assert!(!go.is_match("\treturn nil"));

        let rs = boundary_regex(".rs").unwrap();
        assert!(rs.is_match("pub fn new() -> Self {"));
        assert!(rs.is_match("impl Display for Chunk {"));
        assert!(rs.is_match("enum Outcome {"));
        assert!(!rs.is_match("    let x = 1;"));

        let java = boundary_regex(".java").unwrap();
        assert!(java.is_match("public class Main {"));
        assert!(java.is_match("  private static class Inner {"));
        assert!(java.is_match("interface Visitor {"));
        assert!(!java.is_match("        int x = 0;"));
    }
}
