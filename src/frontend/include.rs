use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Limits;
use crate::error::{ErrorKind, ScriptError};
use crate::frontend::lexer::{Lexer, Span, Spanned};
use crate::frontend::token::Token;

const HEADER: &str = "#!botc";

/// Lexes a script and expands its `#include` directives into one token stream.
///
/// The files currently being expanded form a stack; including a file that is
/// already on it is an error, as is nesting deeper than the configured limit.
pub struct SourceLoader<'a> {
    limits: &'a Limits,
    stack: Vec<PathBuf>,
}

impl<'a> SourceLoader<'a> {
    pub fn new(limits: &'a Limits) -> Self {
        SourceLoader {
            limits,
            stack: Vec::new(),
        }
    }

    pub fn load_file(&mut self, path: &Path) -> Result<Vec<Spanned>, ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::new(
                ErrorKind::Include,
                Span::start_of(&path.display().to_string()),
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        self.load_source(&source, path)
    }

    /// Expands `source` as if it had been read from `path`.
    pub fn load_source(&mut self, source: &str, path: &Path) -> Result<Vec<Spanned>, ScriptError> {
        let mut tokens = self.expand(source, path, None)?;
        let eof = Spanned {
            token: Token::Eof,
            span: tokens
                .last()
                .map(|s| s.span.clone())
                .unwrap_or_else(|| Span::start_of(&path.display().to_string())),
        };
        tokens.push(eof);
        Ok(tokens)
    }

    /// Returns the expanded tokens of one file, without its trailing `Eof`.
    fn expand(
        &mut self,
        source: &str,
        path: &Path,
        directive: Option<&Span>,
    ) -> Result<Vec<Spanned>, ScriptError> {
        let name = path.display().to_string();
        let here = || directive.cloned().unwrap_or_else(|| Span::start_of(&name));

        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.stack.contains(&key) {
            return Err(ScriptError::new(
                ErrorKind::Include,
                here(),
                format!("attempted to #include {} recursively", name),
            ));
        }
        if self.stack.len() >= self.limits.max_include_depth {
            return Err(ScriptError::new(
                ErrorKind::LimitExceeded,
                here(),
                format!(
                    "#include nested too deeply (limit {})",
                    self.limits.max_include_depth
                ),
            ));
        }

        debug!(file = %name, depth = self.stack.len(), "lexing source");
        let text = strip_header(source, &name)?;
        let lexed = Lexer::new(&text, &name).tokenize()?;

        self.stack.push(key);
        let result = self.expand_directives(lexed, path);
        self.stack.pop();
        result
    }

    fn expand_directives(
        &mut self,
        lexed: Vec<Spanned>,
        path: &Path,
    ) -> Result<Vec<Spanned>, ScriptError> {
        let mut out = Vec::with_capacity(lexed.len());
        let mut iter = lexed.into_iter();

        while let Some(spanned) = iter.next() {
            match spanned.token {
                Token::Eof => break,
                Token::Hash => {
                    let directive = iter.next();
                    match directive.as_ref().map(|s| &s.token) {
                        Some(Token::Symbol(word)) if word == "include" => {}
                        _ => {
                            let got = directive
                                .map(|s| s.token.describe())
                                .unwrap_or_else(|| Token::Eof.describe());
                            return Err(ScriptError::new(
                                ErrorKind::Syntax,
                                spanned.span,
                                format!("unknown directive #{}", got.trim_matches('`')),
                            ));
                        }
                    }
                    let target = match iter.next() {
                        Some(Spanned {
                            token: Token::StringLit(target),
                            ..
                        }) => target,
                        _ => {
                            return Err(ScriptError::new(
                                ErrorKind::Syntax,
                                spanned.span,
                                "expected a file name after #include",
                            ));
                        }
                    };

                    let resolved = match path.parent() {
                        Some(dir) => dir.join(&target),
                        None => PathBuf::from(&target),
                    };
                    let source = std::fs::read_to_string(&resolved).map_err(|e| {
                        ScriptError::new(
                            ErrorKind::Include,
                            spanned.span.clone(),
                            format!("cannot #include {}: {}", target, e),
                        )
                    })?;
                    let included = self.expand(&source, &resolved, Some(&spanned.span))?;
                    out.extend(included);
                }
                _ => out.push(spanned),
            }
        }

        Ok(out)
    }
}

/// Blanks an optional `#!botc <version>` first line, keeping line numbers.
fn strip_header(source: &str, file: &str) -> Result<String, ScriptError> {
    let first = source.lines().next().unwrap_or("");
    let Some(rest) = first.trim_start().strip_prefix(HEADER) else {
        return Ok(source.to_string());
    };

    let span = Span::start_of(file);
    let wanted = parse_version(rest.trim()).ok_or_else(|| {
        ScriptError::new(ErrorKind::Syntax, span.clone(), "malformed #!botc header")
    })?;
    let ours = parse_version(env!("CARGO_PKG_VERSION")).unwrap_or((0, 0, 0));
    if wanted > ours {
        return Err(ScriptError::new(
            ErrorKind::Syntax,
            span,
            format!(
                "script requires botc {}.{}.{}, this is botc {}",
                wanted.0,
                wanted.1,
                wanted.2,
                env!("CARGO_PKG_VERSION")
            ),
        ));
    }

    Ok(source[first.len()..].to_string())
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Lexes an in-memory script with default limits. Includes resolve
/// relative to `name`.
pub fn lex_source(source: &str, name: &str) -> Result<Vec<Spanned>, ScriptError> {
    let limits = Limits::default();
    SourceLoader::new(&limits).load_source(source, Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn kinds(tokens: &[Spanned]) -> Vec<Token> {
        tokens.iter().map(|s| s.token.clone()).collect()
    }

    #[test]
    fn test_plain_source() {
        let tokens = lex_source("int x;", "bot.bts").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                Token::IntType,
                Token::Symbol("x".to_string()),
                Token::Semicolon,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_header_is_blanked() {
        let tokens = lex_source("#!botc 1.0\nint x;", "bot.bts").unwrap();
        assert_eq!(tokens[0].token, Token::IntType);
        assert_eq!(tokens[0].span.line, 2);
    }

    #[test]
    fn test_newer_header_rejected() {
        let err = lex_source("#!botc 99.0\n", "bot.bts").unwrap_err();
        assert!(err.message.contains("requires botc 99.0.0"));
        let err = lex_source("#!botc one\n", "bot.bts").unwrap_err();
        assert_eq!(err.message, "malformed #!botc header");
    }

    #[test]
    fn test_include_expands_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("common.bts"), "int shared;\n").unwrap();
        let main = dir.path().join("main.bts");
        fs::write(&main, "#include \"common.bts\"\nint mine;\n").unwrap();

        let limits = Limits::default();
        let tokens = SourceLoader::new(&limits).load_file(&main).unwrap();
        let names: Vec<_> = tokens
            .iter()
            .filter_map(|s| match &s.token {
                Token::Symbol(n) => Some((n.clone(), s.span.file.to_string())),
                _ => None,
            })
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].0, "shared");
        assert!(names[0].1.ends_with("common.bts"));
        assert_eq!(names[1].0, "mine");
        assert!(matches!(tokens.last().map(|s| &s.token), Some(Token::Eof)));
    }

    #[test]
    fn test_recursive_include_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bts"), "#include \"b.bts\"\n").unwrap();
        fs::write(dir.path().join("b.bts"), "#include \"a.bts\"\n").unwrap();

        let limits = Limits::default();
        let err = SourceLoader::new(&limits)
            .load_file(&dir.path().join("a.bts"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Include);
        assert!(err.message.contains("recursively"));
    }

    #[test]
    fn test_include_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("leaf.bts"), "int x;\n").unwrap();
        fs::write(dir.path().join("mid.bts"), "#include \"leaf.bts\"\n").unwrap();
        fs::write(dir.path().join("top.bts"), "#include \"mid.bts\"\n").unwrap();

        let limits = Limits {
            max_include_depth: 2,
            ..Limits::default()
        };
        let err = SourceLoader::new(&limits)
            .load_file(&dir.path().join("top.bts"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_missing_include_and_unknown_directive() {
        let err = lex_source("#include \"nope.bts\"", "/tmp/botc-missing/main.bts").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Include);

        let err = lex_source("#define X 1", "bot.bts").unwrap_err();
        assert_eq!(err.message, "unknown directive #define");
    }
}
