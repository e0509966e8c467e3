// Path and size based filtering for the ingestion pipeline. Everything that
// gets past this predicate is fetched, chunked and indexed, so the lists here
// are the single place where junk gets rejected.

/// Directory names which never contain indexable source.
const DENIED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".git",
    "vendor",
    "__pycache__",
    ".tox",
    ".venv",
    ".mypy_cache",
];

/// Basename suffixes for binary, media, archive, font, minified and
/// sourcemap files.
const DENIED_SUFFIXES: &[&str] = &[
    ".lock", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".pdf", ".woff",
    ".woff2", ".ttf", ".eot", ".mp3", ".mp4", ".zip", ".tar.gz", ".exe",
    ".dll", ".so", ".dylib", ".min.js", ".min.css", ".map",
];

/// Lockfiles, matched against the basename exactly.
const DENIED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "go.sum",
    "composer.lock",
];

/// Files larger than this many bytes are rejected outright.
pub const MAX_FILE_SIZE_BYTES: u64 = 500_000;

/// Decide whether a repository-relative path should be excluded from
/// indexing. `size_bytes` is only known after fetch, so callers check twice:
/// once by path alone and once more with the size.
pub fn is_denied(path: &str, size_bytes: Option<u64>) -> bool {
    let mut segments = path.split('/').collect::<Vec<_>>();
    // The final segment is the basename, everything before it is a directory.
    let basename = segments.pop().unwrap_or(path);

    if segments.iter().any(|dir| DENIED_DIRS.contains(dir)) {
        return true;
    }

    if DENIED_SUFFIXES
        .iter()
        .any(|suffix| basename.ends_with(suffix))
    {
        return true;
    }

    if DENIED_FILES.contains(&basename) {
        return true;
    }

    matches!(size_bytes, Some(size) if size > MAX_FILE_SIZE_BYTES)
}

#[cfg(test)]
mod tests {
    use super::{is_denied, MAX_FILE_SIZE_BYTES};

    #[test]
    fn denied_directories() {
        for path in [
            "node_modules/react/index.js",
            "dist/bundle.js",
            "build/output.css",
            ".git/config",
            "vendor/lib/foo.go",
            "__pycache__/mod.pyc",
            ".tox/py312/lib/site.py",
            ".venv/bin/activate",
            ".mypy_cache/3.12/app.json",
            "deep/nested/node_modules/pkg/file.js",
            "project/build/output.js",
        ] {
            assert!(is_denied(path, None), "{path} should be denied");
        }
    }

    #[test]
    fn basename_is_not_a_directory_match() {
        // A file literally called `build` is not inside a build directory.
        assert!(!is_denied("build", None));
        assert!(!is_denied("scripts/dist", None));
    }

    #[test]
    fn denied_extensions() {
        for path in [
            "logo.png",
            "photo.jpg",
            "icon.jpeg",
            "anim.gif",
            "icon.svg",
            "favicon.ico",
            "doc.pdf",
            "font.woff",
            "font.woff2",
            "font.ttf",
            "font.eot",
            "song.mp3",
            "video.mp4",
            "archive.zip",
            "archive.tar.gz",
            "program.exe",
            "library.dll",
            "library.so",
            "library.dylib",
            "bundle.min.js",
            "styles.min.css",
            "app.map",
        ] {
            assert!(is_denied(path, None), "{path} should be denied");
        }
    }

    #[test]
    fn denied_lockfiles() {
        for path in [
            "package-lock.json",
            "yarn.lock",
            "pnpm-lock.yaml",
            "Cargo.lock",
            "poetry.lock",
            "Pipfile.lock",
            "go.sum",
            "composer.lock",
            "subdir/package-lock.json",
        ] {
            assert!(is_denied(path, None), "{path} should be denied");
        }
    }

    #[test]
    fn size_threshold_is_strict() {
        assert!(is_denied("src/big.py", Some(600_000)));
        assert!(!is_denied("src/exact.py", Some(MAX_FILE_SIZE_BYTES)));
        assert!(is_denied("src/exact.py", Some(MAX_FILE_SIZE_BYTES + 1)));
        assert!(!is_denied("src/small.py", Some(1000)));
        assert!(!is_denied("src/any.py", None));
    }

    #[test]
    fn allowed_paths() {
        for path in [
            "src/main.py",
            "README.md",
            "src/utils.ts",
            "docs/guide.md",
            "app/config.py",
            "lib/helper.go",
            "src/Component.tsx",
        ] {
            assert!(!is_denied(path, None), "{path} should be allowed");
        }
    }

    #[test]
    fn denial_is_monotone_in_size() {
        // A path denied without a size stays denied with any size, and a
        // denied size stays denied for anything larger.
        assert!(is_denied("logo.png", None));
        assert!(is_denied("logo.png", Some(1)));
        assert!(is_denied("src/a.py", Some(500_001)));
        assert!(is_denied("src/a.py", Some(10_000_000)));
    }
}
