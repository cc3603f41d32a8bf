//! Glob to matcher compilation.
//!
//! Globs use `*` (zero or more characters) and `?` (exactly one character);
//! everything else is literal. Adjacent wildcards are collapsed before the
//! expression is built, so `?**?**?` becomes `.{3,}` instead of a chain of
//! nested repetitions that would backtrack badly.
//!
//! Matching is case-insensitive and anchored to the whole candidate unless
//! word-boundary mode is requested.

use regex::{Regex, RegexBuilder};

/// Upper bound for the compiled regex program. Globs that need more than this
/// (a few thousand `?` in a row) use the token matcher instead.
const REGEX_SIZE_LIMIT: usize = 16 * (1 << 20);

/// One collapsed piece of a glob.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// A run of wildcards: at least `min` characters, exactly `min` when not
    /// `unbounded`.
    Wild { min: usize, unbounded: bool },
}

/// Split a glob into maximal literal runs and collapsed wildcard runs.
fn tokenize(glob: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut literal = String::new();
    let mut wild: Option<(usize, bool)> = None;

    for ch in glob.chars() {
        match ch {
            '?' | '*' => {
                if !literal.is_empty() {
                    out.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let (min, unbounded) = wild.get_or_insert((0, false));
                if ch == '?' {
                    *min += 1;
                } else {
                    *unbounded = true;
                }
            }
            _ => {
                if let Some((min, unbounded)) = wild.take() {
                    out.push(Token::Wild { min, unbounded });
                }
                literal.push(ch);
            }
        }
    }

    if let Some((min, unbounded)) = wild {
        out.push(Token::Wild { min, unbounded });
    }
    if !literal.is_empty() {
        out.push(Token::Literal(literal));
    }
    out
}

fn to_expression(tokens: &[Token], word_boundary: bool) -> String {
    let mut body = String::new();
    for t in tokens {
        match t {
            Token::Literal(s) => body.push_str(&regex::escape(s)),
            Token::Wild { min, unbounded: true } => body.push_str(&format!(".{{{min},}}")),
            Token::Wild { min, unbounded: false } => body.push_str(&format!(".{{{min}}}")),
        }
    }

    if word_boundary {
        // `\b` treats a candidate that starts or ends with a non-word
        // character differently, so bound on `\W` or the string edges.
        format!(r"(^|\W){body}(\W|$)")
    } else {
        format!(r"\A{body}\z")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Char(char),
    One,
    Many,
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Steps { steps: Vec<Step>, word_boundary: bool },
}

/// An immutable matcher produced from one glob.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    glob: String,
    expression: String,
    matcher: Matcher,
}

/// Compile `glob` into a case-insensitive matcher.
///
/// Total for every input: an empty glob matches only the empty string, and a
/// glob made of `*` alone matches everything.
pub fn compile(glob: &str, word_boundary: bool) -> CompiledPattern {
    let tokens = tokenize(glob);
    let expression = to_expression(&tokens, word_boundary);

    let built = RegexBuilder::new(&expression)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build();

    let matcher = match built {
        Ok(re) => Matcher::Regex(re),
        Err(e) => {
            tracing::warn!(glob = %glob, error = %e, "glob too large for regex backend; using token matcher");
            Matcher::Steps {
                steps: to_steps(&tokens),
                word_boundary,
            }
        }
    };

    CompiledPattern {
        glob: glob.to_string(),
        expression,
        matcher,
    }
}

impl CompiledPattern {
    /// The glob this pattern was compiled from.
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// The regular expression the glob collapsed into.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(candidate),
            Matcher::Steps {
                steps,
                word_boundary,
            } => {
                let text: Vec<char> = candidate.chars().map(fold).collect();
                if *word_boundary {
                    match_word(steps, &text)
                } else {
                    match_steps(steps, &text)
                }
            }
        }
    }
}

fn single(mut it: impl Iterator<Item = char>) -> Option<char> {
    let c = it.next()?;
    it.next().is_none().then_some(c)
}

/// One-to-one case fold, so `?` counts the same characters the regex backend
/// does. Characters whose case mapping expands stay as they are.
fn fold(c: char) -> char {
    let upper = single(c.to_uppercase()).unwrap_or(c);
    single(upper.to_lowercase())
        .or_else(|| single(c.to_lowercase()))
        .unwrap_or(c)
}

fn to_steps(tokens: &[Token]) -> Vec<Step> {
    let mut steps = Vec::new();
    for t in tokens {
        match t {
            Token::Literal(s) => steps.extend(s.chars().map(fold).map(Step::Char)),
            Token::Wild { min, unbounded } => {
                steps.extend(std::iter::repeat(Step::One).take(*min));
                if *unbounded {
                    steps.push(Step::Many);
                }
            }
        }
    }
    steps
}

/// Anchored glob match with single-star backtracking.
fn match_steps(steps: &[Step], text: &[char]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match steps.get(p) {
            Some(Step::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            Some(Step::One) => {
                p += 1;
                t += 1;
            }
            Some(Step::Many) => {
                star = Some((p, t));
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }

    steps[p..].iter().all(|s| *s == Step::Many)
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn match_word(steps: &[Step], text: &[char]) -> bool {
    let n = text.len();
    (0..=n)
        .filter(|&s| s == 0 || !is_word(text[s - 1]))
        .any(|s| {
            (s..=n)
                .filter(|&e| e == n || !is_word(text[e]))
                .any(|e| match_steps(steps, &text[s..e]))
        })
}
