use super::query::{build_query, default_escape};
use super::{EscapeFn, PathArgs, UrlValue};
use crate::error::ConfigurationError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Named(String),
    Splat,
}

impl Token {
    fn is_capture(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }

    fn write_raw(&self, out: &mut String) {
        match self {
            Token::Literal(text) => out.push_str(text),
            Token::Named(name) => {
                out.push(':');
                out.push_str(name);
            }
            Token::Splat => out.push('*'),
        }
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek().is_some_and(|next| is_name_char(*next)) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                while let Some(next) = chars.next_if(|next| is_name_char(*next)) {
                    name.push(next);
                }
                tokens.push(Token::Named(name));
            }
            '*' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Splat);
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// A named, immutable url pattern.
#[derive(Clone)]
pub struct UrlTemplate {
    name: String,
    pattern: String,
    tokens: Vec<Token>,
    escape: EscapeFn,
}

impl UrlTemplate {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_escape(name, pattern, default_escape())
    }

    pub fn with_escape(name: impl Into<String>, pattern: impl Into<String>, escape: EscapeFn) -> Self {
        let pattern = pattern.into();
        let tokens = tokenize(&pattern);
        Self { name: name.into(), pattern, tokens, escape }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Generates a concrete path, query and fragment.
    ///
    /// * `captures` is always dropped from the trailing map.
    /// * `splat` fills `*` wildcards left to right.
    /// * other map keys fill `:name` captures with the same name, scalars only.
    /// * positional arguments fill whatever captures are still open, in pattern order.
    /// * leftover map entries become the query, `#` becomes the fragment.
    ///
    /// Captures left unfilled stay in the output as written in the pattern.
    ///
    /// ```
    /// use micro_dispatch::url::{PathArgs, UrlTemplate};
    ///
    /// let template = UrlTemplate::new("files", "/:a/:b/*/*");
    /// let args = PathArgs::new().param("a", "v1").param("b", "v2").splat(["mid"]);
    ///
    /// assert_eq!(template.path_for(args), "/v1/v2/mid/*");
    /// ```
    pub fn path_for(&self, args: PathArgs) -> String {
        let (positional, mut params) = args.into_parts();
        params.remove("captures");

        let splat = match params.remove("splat") {
            Some(UrlValue::Scalar(value)) => vec![value],
            Some(UrlValue::List(values)) => {
                values.into_iter().filter_map(|value| value.as_scalar().map(str::to_string)).collect()
            }
            Some(UrlValue::Map(_)) | None => vec![],
        };

        let mut filled: Vec<Option<String>> = vec![None; self.tokens.len()];

        let mut splat = splat.into_iter();
        for (slot, _) in filled.iter_mut().zip(&self.tokens).filter(|(_, token)| **token == Token::Splat) {
            match splat.next() {
                Some(value) => *slot = Some(value),
                None => break,
            }
        }

        for (slot, token) in filled.iter_mut().zip(&self.tokens) {
            if let Token::Named(name) = token
                && params.get(name).is_some_and(|value| value.as_scalar().is_some())
                && let Some(UrlValue::Scalar(value)) = params.remove(name)
            {
                *slot = Some(value);
            }
        }

        let mut positional = positional.into_iter();
        for (slot, _) in filled.iter_mut().zip(&self.tokens).filter(|(slot, token)| slot.is_none() && token.is_capture()) {
            match positional.next() {
                Some(value) => *slot = Some(value),
                None => break,
            }
        }

        let mut path = String::with_capacity(self.pattern.len());
        for (slot, token) in filled.iter().zip(&self.tokens) {
            match slot {
                Some(value) => path.push_str(value),
                None => token.write_raw(&mut path),
            }
        }
        let mut out = collapse_slashes(&path);

        let fragment = match params.remove("#") {
            Some(UrlValue::Scalar(fragment)) if !fragment.is_empty() => Some(fragment),
            _ => None,
        };

        let query = build_query(&params, &self.escape);
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query);
        }
        if let Some(fragment) = fragment {
            out.push('#');
            out.push_str(&fragment);
        }
        out
    }

    /// Matches `path` against the pattern token by token.
    ///
    /// A `:name` capture takes the longest run of non-`/` characters that lets the rest
    /// match, a `*` takes the shortest non-empty run, `/` included. Several wildcards therefore
    /// fill left to right, and the last one absorbs whatever remains.
    ///
    /// ```
    /// use micro_dispatch::url::UrlTemplate;
    ///
    /// let template = UrlTemplate::new("files", "/:a/:b/*/*");
    /// let captures = template.captures("/x/y/docs/guide/intro.md").unwrap();
    ///
    /// assert_eq!(captures.params, [("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]);
    /// assert_eq!(captures.wildcards, ["docs", "guide/intro.md"]);
    /// ```
    pub fn captures(&self, path: &str) -> Option<PathCaptures> {
        let mut values = Vec::with_capacity(self.tokens.len());
        if !match_tokens(&self.tokens, path, &mut values) {
            return None;
        }

        let mut captures = PathCaptures::default();
        for (token, value) in self.tokens.iter().filter(|token| token.is_capture()).zip(values) {
            match token {
                Token::Named(name) => captures.params.push((name.clone(), value.to_string())),
                Token::Splat => captures.wildcards.push(value.to_string()),
                Token::Literal(_) => {}
            }
        }
        Some(captures)
    }

    /// Converts the pattern to the router's tree syntax.
    ///
    /// `:name` becomes `{name}` and `*` becomes a trailing `{*splat}`; both must span a whole
    /// path segment. Routes of any other shape are matched with [`UrlTemplate::captures`].
    pub fn compile_matcher(&self) -> Result<String, ConfigurationError> {
        let segments = self.pattern.split('/').collect::<Vec<_>>();
        let last = segments.len() - 1;
        let mut compiled = Vec::with_capacity(segments.len());

        for (index, segment) in segments.into_iter().enumerate() {
            let tokens = tokenize(segment);
            let part = match tokens.as_slice() {
                [Token::Named(name)] => format!("{{{name}}}"),
                [Token::Splat] if index == last => "{*splat}".to_string(),
                [Token::Splat] => {
                    return Err(ConfigurationError::unsupported_pattern(
                        &self.pattern,
                        "a wildcard must be the last path segment",
                    ));
                }
                tokens if tokens.iter().any(Token::is_capture) => {
                    return Err(ConfigurationError::unsupported_pattern(
                        &self.pattern,
                        "a capture must span a whole path segment",
                    ));
                }
                _ => segment.replace('{', "{{").replace('}', "}}"),
            };
            compiled.push(part);
        }

        Ok(compiled.join("/"))
    }
}

/// Captures of a path matched by [`UrlTemplate::captures`], in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathCaptures {
    pub params: Vec<(String, String)>,
    pub wildcards: Vec<String>,
}

fn match_tokens<'p>(tokens: &[Token], path: &'p str, values: &mut Vec<&'p str>) -> bool {
    let Some((token, rest)) = tokens.split_first() else {
        return path.is_empty();
    };

    let ends: Box<dyn Iterator<Item = usize>> = match token {
        Token::Literal(text) => {
            return path.strip_prefix(text.as_str()).is_some_and(|tail| match_tokens(rest, tail, values));
        }
        Token::Named(_) => Box::new((1..=path.find('/').unwrap_or(path.len())).rev()),
        Token::Splat => Box::new(1..=path.len()),
    };

    for end in ends.filter(|end| path.is_char_boundary(*end)) {
        values.push(&path[..end]);
        if match_tokens(rest, &path[end..], values) {
            return true;
        }
        values.pop();
    }
    false
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

impl fmt::Debug for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlTemplate").field("name", &self.name).field("pattern", &self.pattern).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::UrlTemplate;
    use crate::error::ConfigurationError;
    use crate::url::{PathArgs, UrlParams};
    use std::sync::Arc;

    fn template() -> UrlTemplate {
        UrlTemplate::new("x", "/:a/:b/*/*")
    }

    fn named() -> PathArgs {
        PathArgs::new().param("a", "v1").param("b", "v2")
    }

    #[test]
    fn test_unfilled_wildcards_stay_literal() {
        assert_eq!(template().path_for(named()), "/v1/v2/*/*");
    }

    #[test]
    fn test_splat_fills_wildcards_left_to_right() {
        assert_eq!(template().path_for(named().splat(["mid"])), "/v1/v2/mid/*");
        assert_eq!(template().path_for(named().splat(["mid", "end"])), "/v1/v2/mid/end");
    }

    #[test]
    fn test_leftovers_become_sorted_query() {
        let args = named().splat(["mid", "end"]).param("extra", "q").param("captures", vec!["ignored"]);
        assert_eq!(template().path_for(args), "/v1/v2/mid/end?extra=q");

        let args = named().param("zeta", "1").param("alpha", "a b");
        assert_eq!(template().path_for(args), "/v1/v2/*/*?alpha=a%20b&zeta=1");
    }

    #[test]
    fn test_positional_args_fill_open_captures_in_order() {
        let args = PathArgs::new().param("b", "v2").arg("first").arg("second").arg("third").arg("unused");
        assert_eq!(template().path_for(args), "/first/v2/second/third");
    }

    #[test]
    fn test_only_scalars_fill_named_captures() {
        let args = PathArgs::new().param("a", vec!["x", "y"]).param("b", "v2");
        assert_eq!(template().path_for(args), "/:a/v2/*/*?a[]=x&a[]=y");
    }

    #[test]
    fn test_double_slashes_collapse() {
        let template = UrlTemplate::new("nested", "/files/:dir/:name");
        let args = PathArgs::new().param("dir", "").param("name", "/readme.md");
        assert_eq!(template.path_for(args), "/files/readme.md");
    }

    #[test]
    fn test_fragment() {
        let template = UrlTemplate::new("doc", "/doc/:page");
        assert_eq!(template.path_for(PathArgs::new().arg("intro").fragment("setup").param("v", "2")), "/doc/intro?v=2#setup");
        assert_eq!(template.path_for(PathArgs::new().arg("intro").fragment("")), "/doc/intro");
    }

    #[test]
    fn test_custom_escape() {
        let template = UrlTemplate::with_escape("search", "/search", Arc::new(|value: &str| value.replace(' ', "+")));
        let mut params = UrlParams::new();
        params.insert("q".into(), "rust http".into());
        assert_eq!(template.path_for(params.into()), "/search?q=rust+http");
    }

    #[test]
    fn test_compile_matcher() {
        assert_eq!(UrlTemplate::new("a", "/users/:id/files/*").compile_matcher().unwrap(), "/users/{id}/files/{*splat}");
        assert_eq!(UrlTemplate::new("b", "/literal/{raw}").compile_matcher().unwrap(), "/literal/{{raw}}");
        assert_eq!(UrlTemplate::new("c", "/").compile_matcher().unwrap(), "/");
    }

    #[test]
    fn test_captures_fill_wildcards_left_to_right() {
        let captures = template().captures("/x/y/p/q/r").unwrap();
        assert_eq!(captures.params, [("a".to_string(), "x".to_string()), ("b".to_string(), "y".to_string())]);
        assert_eq!(captures.wildcards, ["p", "q/r"]);

        assert!(template().captures("/x/y/p").is_none());
        assert!(template().captures("/x/y/p/").is_none());
    }

    #[test]
    fn test_captures_mid_path_wildcard() {
        let template = UrlTemplate::new("download", "/files/*/download");

        let captures = template.captures("/files/a/b.txt/download").unwrap();
        assert!(captures.params.is_empty());
        assert_eq!(captures.wildcards, ["a/b.txt"]);

        assert!(template.captures("/files/download").is_none());
        assert!(template.captures("/files/a/download/more").is_none());
    }

    #[test]
    fn test_captures_partial_segments() {
        let template = UrlTemplate::new("post", "/posts/:id.json");

        let captures = template.captures("/posts/v1.2.json").unwrap();
        assert_eq!(captures.params, [("id".to_string(), "v1.2".to_string())]);

        assert!(template.captures("/posts/7.xml").is_none());
        assert!(template.captures("/posts/a/b.json").is_none());
    }

    #[test]
    fn test_compile_matcher_rejects_partial_segments() {
        let err = UrlTemplate::new("a", "/files/*/tail").compile_matcher().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedPattern { .. }));

        let err = UrlTemplate::new("b", "/posts/:id.json").compile_matcher().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedPattern { .. }));

        // still usable for generation
        assert_eq!(UrlTemplate::new("b", "/posts/:id.json").path_for(PathArgs::new().arg(7)), "/posts/7.json");
    }
}
